//! Conversation history with a token ceiling.
//!
//! Turns are kept oldest first. Nothing enforces user/model alternation; the
//! only rule is the token budget, and overflow is resolved by dropping turns
//! from the front.

use crate::llm::context::{BudgetError, TokenBudget};
use crate::llm::tokens::TokenEstimator;
use crate::llm::types::{Role, Turn};
use std::fmt;
use std::str::FromStr;

/// What to evict when the history is over budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    /// Drop exactly the two oldest turns per overflow. The history may still
    /// be over budget afterwards; it is re-checked after the next exchange.
    #[default]
    OldestPair,
    /// Drop oldest pairs until the budget check passes.
    UntilUnderBudget,
}

impl EvictionPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::OldestPair => "pair",
            Self::UntilUnderBudget => "until-under-budget",
        }
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EvictionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pair" | "oldest-pair" => Ok(Self::OldestPair),
            "until-under-budget" | "until_under_budget" => Ok(Self::UntilUnderBudget),
            other => Err(format!("unknown eviction policy '{}'", other)),
        }
    }
}

/// Result of one budget enforcement pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eviction {
    /// The failed check that triggered eviction.
    pub exceeded: BudgetError,
    /// Number of turns removed from the front.
    pub removed: usize,
    /// Estimated total after eviction.
    pub remaining_tokens: usize,
}

/// Owns the ordered turns and the budget they must fit in.
pub struct ConversationHistory {
    turns: Vec<Turn>,
    budget: TokenBudget,
    estimator: Box<dyn TokenEstimator>,
    policy: EvictionPolicy,
}

impl ConversationHistory {
    pub fn new(budget: TokenBudget, estimator: Box<dyn TokenEstimator>) -> Self {
        Self {
            turns: Vec::new(),
            budget,
            estimator,
            policy: EvictionPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: EvictionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Append a user turn. No validation happens here.
    pub fn append_user_turn(&mut self, text: impl Into<String>) -> &Turn {
        self.push(Turn::new(Role::User, text))
    }

    pub fn append_model_turn(&mut self, text: impl Into<String>) -> &Turn {
        self.push(Turn::new(Role::Model, text))
    }

    fn push(&mut self, turn: Turn) -> &Turn {
        self.turns.push(turn);
        &self.turns[self.turns.len() - 1]
    }

    /// Sum of the estimates of every turn, saturating at `usize::MAX`.
    pub fn total_tokens(&self) -> usize {
        self.turns
            .iter()
            .map(|turn| self.estimator.estimate(turn.text()))
            .fold(0, usize::saturating_add)
    }

    /// Fails with `BudgetExceeded` when the total is over the hard limit.
    pub fn check_budget(&self) -> Result<(), BudgetError> {
        let total = self.total_tokens();
        if total > self.budget.hard_limit {
            return Err(BudgetError::BudgetExceeded {
                total,
                hard_limit: self.budget.hard_limit,
            });
        }
        Ok(())
    }

    /// Remove the `count` oldest turns, keeping the rest in order.
    /// Returns how many were actually removed.
    pub fn truncate_oldest(&mut self, count: usize) -> usize {
        let count = count.min(self.turns.len());
        self.turns.drain(..count);
        count
    }

    /// Check the budget and evict according to the policy.
    ///
    /// Returns `None` when the history already fits.
    pub fn enforce_budget(&mut self) -> Option<Eviction> {
        let exceeded = self.check_budget().err()?;

        let removed = match self.policy {
            EvictionPolicy::OldestPair => self.truncate_oldest(2),
            EvictionPolicy::UntilUnderBudget => {
                let mut removed = 0;
                while !self.turns.is_empty() && self.check_budget().is_err() {
                    removed += self.truncate_oldest(2);
                }
                removed
            }
        };

        Some(Eviction {
            exceeded,
            removed,
            remaining_tokens: self.total_tokens(),
        })
    }

    /// Take back the newest turn, e.g. a user message whose request failed.
    pub fn pop_latest(&mut self) -> Option<Turn> {
        self.turns.pop()
    }

    pub fn reset(&mut self) {
        self.turns.clear();
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn budget(&self) -> &TokenBudget {
        &self.budget
    }

    pub fn estimator(&self) -> &dyn TokenEstimator {
        self.estimator.as_ref()
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }
}

impl fmt::Debug for ConversationHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversationHistory")
            .field("turns", &self.turns)
            .field("budget", &self.budget)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
