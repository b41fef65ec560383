//! Context Window Management.
//!
//! The context window is the scarce resource here. [`TokenBudget`] holds the
//! limits read from configuration and decides whether a candidate context
//! file fits before it is accepted into a session.

use super::tokens::TokenEstimator;
use thiserror::Error;

/// Limits applied to the conversation, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget {
    /// Maximum estimated tokens the history may occupy.
    pub hard_limit: usize,
    /// Advisory threshold, never blocks.
    pub warning_limit: usize,
    /// Tokens kept free for the model's answer.
    pub reserved_output_tokens: usize,
}

impl TokenBudget {
    pub fn new(hard_limit: usize, warning_limit: usize, reserved_output_tokens: usize) -> Self {
        Self {
            hard_limit,
            warning_limit,
            reserved_output_tokens,
        }
    }

    /// Check a candidate context before it enters the session.
    ///
    /// Fails when `estimate(candidate) + reserved_output_tokens > hard_limit`.
    /// Stateless; retrying with another candidate is up to the caller.
    pub fn validate_context(
        &self,
        estimator: &dyn TokenEstimator,
        candidate: &str,
    ) -> Result<ContextCheck, BudgetError> {
        let estimated_tokens = estimator.estimate(candidate);
        let needed = estimated_tokens.saturating_add(self.reserved_output_tokens);

        if needed > self.hard_limit {
            return Err(BudgetError::ContextTooLarge {
                estimated_tokens,
                reserved_output_tokens: self.reserved_output_tokens,
                hard_limit: self.hard_limit,
            });
        }

        Ok(ContextCheck {
            estimated_tokens,
            over_warning: needed > self.warning_limit,
        })
    }

    pub fn exceeds_warning(&self, total_tokens: usize) -> bool {
        total_tokens > self.warning_limit
    }
}

/// Outcome of a successful context validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextCheck {
    pub estimated_tokens: usize,
    /// The context plus reserved output is past the warning limit.
    pub over_warning: bool,
}

/// Recoverable budget failures. Neither is ever fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BudgetError {
    #[error("context is too large: ~{estimated_tokens} tokens plus {reserved_output_tokens} reserved for output exceeds the limit of {hard_limit}")]
    ContextTooLarge {
        estimated_tokens: usize,
        reserved_output_tokens: usize,
        hard_limit: usize,
    },

    #[error("conversation history is ~{total} tokens, over the limit of {hard_limit}")]
    BudgetExceeded { total: usize, hard_limit: usize },
}

/// Shorthand for validating with a bare set of limits.
pub fn validate_context(
    hard_limit: usize,
    warning_limit: usize,
    reserved_output_tokens: usize,
    estimator: &dyn TokenEstimator,
    candidate: &str,
) -> Result<ContextCheck, BudgetError> {
    TokenBudget::new(hard_limit, warning_limit, reserved_output_tokens)
        .validate_context(estimator, candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::tokens::WordHeuristic;

    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    #[test]
    fn test_context_over_limit_fails() {
        let estimator = WordHeuristic::new(1.0);
        let err = validate_context(100, 80, 10, &estimator, &words(95)).unwrap_err();
        assert_eq!(
            err,
            BudgetError::ContextTooLarge {
                estimated_tokens: 95,
                reserved_output_tokens: 10,
                hard_limit: 100,
            }
        );
    }

    #[test]
    fn test_context_under_limit_passes() {
        let estimator = WordHeuristic::new(1.0);
        let check = validate_context(100, 80, 10, &estimator, &words(50)).unwrap();
        assert_eq!(check.estimated_tokens, 50);
        assert!(!check.over_warning);
    }

    #[test]
    fn test_context_exactly_at_limit_passes() {
        let estimator = WordHeuristic::new(1.0);
        assert!(validate_context(100, 100, 10, &estimator, &words(90)).is_ok());
        assert!(validate_context(100, 100, 10, &estimator, &words(91)).is_err());
    }

    #[test]
    fn test_warning_limit_never_blocks() {
        let estimator = WordHeuristic::new(1.0);
        let check = validate_context(100, 20, 10, &estimator, &words(50)).unwrap();
        assert!(check.over_warning);
    }

    #[test]
    fn test_empty_context_passes() {
        let budget = TokenBudget::new(30720, 25000, 2048);
        let check = budget
            .validate_context(&WordHeuristic::default(), "")
            .unwrap();
        assert_eq!(check.estimated_tokens, 0);
    }

    #[test]
    fn test_reserved_output_alone_can_exceed() {
        let budget = TokenBudget::new(100, 100, 200);
        assert!(budget
            .validate_context(&WordHeuristic::default(), "")
            .is_err());
    }
}
