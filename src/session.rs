//! Session state.
//!
//! One [`Session`] owns everything that changes while chatting: the history,
//! the context text and whether it still has to be sent, and the transcript.
//! History is only mutated between request cycles.

use crate::history::{ConversationHistory, Eviction, EvictionPolicy};
use crate::llm::context::{BudgetError, ContextCheck};
use crate::llm::provider::{ChatRequest, FinishReason, ModelReply};
use crate::llm::tokens::EstimatorKind;
use crate::llm::types::{GenerationSettings, SafetySettings, Turn};
use crate::transcript::TranscriptLog;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Read a context file. Surrounding whitespace is dropped.
pub fn load_context_file(path: &Path) -> Result<String> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot load context file {}", path.display()))?;
    Ok(text.trim().to_string())
}

/// What happened when an exchange was recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeOutcome {
    pub user: Turn,
    pub model: Turn,
    pub finish_reason: FinishReason,
    /// Set when the history went over budget and turns were dropped.
    pub eviction: Option<Eviction>,
    pub total_tokens: usize,
    pub over_warning: bool,
    /// False if the transcript could not be written.
    pub logged: bool,
}

/// Snapshot for `/status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub turns: usize,
    pub total_tokens: usize,
    pub warning_limit: usize,
    pub hard_limit: usize,
    pub reserved_output_tokens: usize,
    pub policy: EvictionPolicy,
    pub has_context: bool,
}

pub struct Session {
    history: ConversationHistory,
    generation: GenerationSettings,
    safety: SafetySettings,
    estimator_kind: EstimatorKind,
    context: String,
    /// Context still has to be prepended to the next user message.
    context_armed: bool,
    /// The in-flight user turn consumed the context.
    pending_took_context: bool,
    pending: Option<Turn>,
    transcript: TranscriptLog,
    output_dir: PathBuf,
}

impl Session {
    pub fn new(
        history: ConversationHistory,
        generation: GenerationSettings,
        safety: SafetySettings,
        estimator_kind: EstimatorKind,
        transcript: TranscriptLog,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            history,
            generation,
            safety,
            estimator_kind,
            context: String::new(),
            context_armed: true,
            pending_took_context: false,
            pending: None,
            transcript,
            output_dir,
        }
    }

    /// Check a candidate context against the budget.
    pub fn validate_context(&self, candidate: &str) -> Result<ContextCheck, BudgetError> {
        self.history
            .budget()
            .validate_context(self.history.estimator(), candidate)
    }

    /// Install a new context and start over. Callers validate first.
    pub fn change_context(&mut self, context: String) {
        self.context = context;
        self.history.reset();
        self.context_armed = true;
        self.pending = None;
    }

    /// Clear the history and roll over to a fresh transcript.
    pub fn reset_chat(&mut self) -> Result<()> {
        let transcript = TranscriptLog::create_timestamped(&self.output_dir)?;
        self.history.reset();
        self.context_armed = true;
        self.pending = None;
        self.transcript = transcript;
        Ok(())
    }

    /// Append the user's message and build the request for it.
    ///
    /// The context is prepended to the first message after start, reset or
    /// context change.
    pub fn begin_exchange(&mut self, input: &str) -> ChatRequest<'_> {
        let take_context = self.context_armed && !self.context.is_empty();
        let text = if take_context {
            format!("{}\n{}", self.context, input)
        } else {
            input.to_string()
        };
        self.context_armed = false;
        self.pending_took_context = take_context;

        let turn = self.history.append_user_turn(text).clone();
        self.pending = Some(turn);
        debug!(turns = self.history.len(), "user turn appended");

        self.request()
    }

    /// Drop the in-flight user turn after a failed request.
    pub fn abort_exchange(&mut self) {
        if self.pending.take().is_some() {
            self.history.pop_latest();
            if self.pending_took_context {
                self.context_armed = true;
            }
        }
    }

    /// Record the model's reply, log the exchange and enforce the budget.
    pub fn complete_exchange(&mut self, reply: ModelReply) -> ExchangeOutcome {
        let user = self
            .pending
            .take()
            .unwrap_or_else(|| Turn::user(String::new()));
        let model = self.history.append_model_turn(reply.turn.text()).clone();

        let logged = match self.transcript.append_exchange(&user, &model) {
            Ok(()) => true,
            Err(e) => {
                warn!("{:#}", e);
                false
            }
        };

        let eviction = self.history.enforce_budget();
        if let Some(ref ev) = eviction {
            debug!(removed = ev.removed, remaining = ev.remaining_tokens, "history truncated");
        }
        let total_tokens = self.history.total_tokens();

        ExchangeOutcome {
            user,
            model,
            finish_reason: reply.finish_reason,
            eviction,
            total_tokens,
            over_warning: self.history.budget().exceeds_warning(total_tokens),
            logged,
        }
    }

    pub fn request(&self) -> ChatRequest<'_> {
        ChatRequest {
            turns: self.history.turns(),
            generation: &self.generation,
            safety: &self.safety,
        }
    }

    pub fn status(&self) -> SessionStatus {
        let budget = self.history.budget();
        SessionStatus {
            turns: self.history.len(),
            total_tokens: self.history.total_tokens(),
            warning_limit: budget.warning_limit,
            hard_limit: budget.hard_limit,
            reserved_output_tokens: budget.reserved_output_tokens,
            policy: self.history.policy(),
            has_context: !self.context.is_empty(),
        }
    }

    /// Approximate words that fit in the hard limit, for prompts.
    pub fn word_allowance(&self) -> usize {
        let budget = self.history.budget();
        self.estimator_kind
            .words_for(budget.hard_limit.saturating_sub(budget.reserved_output_tokens))
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn transcript(&self) -> &TranscriptLog {
        &self.transcript
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::context::TokenBudget;
    use crate::llm::tokens::WordHeuristic;
    use crate::llm::types::Role;
    use tempfile::{tempdir, TempDir};

    fn words(n: usize) -> String {
        vec!["w"; n].join(" ")
    }

    fn session(hard_limit: usize) -> (Session, TempDir) {
        let dir = tempdir().unwrap();
        let history = ConversationHistory::new(
            TokenBudget::new(hard_limit, hard_limit / 2, 10),
            Box::new(WordHeuristic::new(1.0)),
        );
        let transcript = TranscriptLog::create_timestamped(dir.path()).unwrap();
        let session = Session::new(
            history,
            GenerationSettings::default(),
            SafetySettings::default(),
            EstimatorKind::Words { tokens_per_word: 1.0 },
            transcript,
            dir.path().to_path_buf(),
        );
        (session, dir)
    }

    fn reply(text: &str) -> ModelReply {
        ModelReply {
            turn: Turn::model(text),
            finish_reason: FinishReason::Stop,
        }
    }

    #[test]
    fn test_context_prepended_once() {
        let (mut s, _dir) = session(1000);
        s.change_context("Be brief.".to_string());

        let request = s.begin_exchange("hello");
        assert_eq!(request.turns.len(), 1);
        assert_eq!(request.turns[0].text(), "Be brief.\nhello");
        s.complete_exchange(reply("hi"));

        let request = s.begin_exchange("again");
        assert_eq!(request.turns.len(), 3);
        assert_eq!(request.turns[2].text(), "again");
    }

    #[test]
    fn test_no_context_sends_input_verbatim() {
        let (mut s, _dir) = session(1000);
        let request = s.begin_exchange("plain");
        assert_eq!(request.turns[0].text(), "plain");
    }

    #[test]
    fn test_complete_exchange_logs_and_counts() {
        let (mut s, _dir) = session(1000);
        s.begin_exchange("one two");
        let outcome = s.complete_exchange(reply("three"));

        assert_eq!(outcome.user, Turn::user("one two"));
        assert_eq!(outcome.model.role(), Role::Model);
        assert_eq!(outcome.total_tokens, 3);
        assert!(outcome.eviction.is_none());
        assert!(outcome.logged);

        let log = std::fs::read_to_string(s.transcript().path()).unwrap();
        assert_eq!(log, "**User:** one two\n**Model:** three\n\n");
    }

    #[test]
    fn test_overflow_evicts_oldest_pair() {
        let (mut s, _dir) = session(100);
        s.begin_exchange(&words(30));
        s.complete_exchange(reply(&words(30)));
        s.begin_exchange(&words(30));
        let outcome = s.complete_exchange(reply(&words(30)));

        let eviction = outcome.eviction.expect("over budget");
        assert_eq!(
            eviction.exceeded,
            BudgetError::BudgetExceeded {
                total: 120,
                hard_limit: 100
            }
        );
        assert_eq!(eviction.removed, 2);
        assert_eq!(outcome.total_tokens, 60);
        assert_eq!(s.history().len(), 2);
        assert!(outcome.over_warning);
    }

    #[test]
    fn test_abort_rolls_back_and_rearms_context() {
        let (mut s, _dir) = session(1000);
        s.change_context("ctx".to_string());
        s.begin_exchange("first");
        s.abort_exchange();
        assert!(s.history().is_empty());

        let request = s.begin_exchange("retry");
        assert_eq!(request.turns[0].text(), "ctx\nretry");
    }

    #[test]
    fn test_abort_without_pending_is_noop() {
        let (mut s, _dir) = session(1000);
        s.begin_exchange("a");
        s.complete_exchange(reply("b"));
        s.abort_exchange();
        assert_eq!(s.history().len(), 2);
    }

    #[test]
    fn test_reset_chat_rolls_transcript_and_rearms() {
        let (mut s, _dir) = session(1000);
        s.change_context("ctx".to_string());
        s.begin_exchange("a");
        s.complete_exchange(reply("b"));

        s.reset_chat().unwrap();
        assert!(s.history().is_empty());
        assert!(s.transcript().path().exists());

        let request = s.begin_exchange("c");
        assert_eq!(request.turns[0].text(), "ctx\nc");
    }

    #[test]
    fn test_reset_starts_empty_transcript() {
        let (mut s, _dir) = session(1000);
        s.begin_exchange("before reset");
        s.complete_exchange(reply("r1"));
        let old_path = s.transcript().path().to_path_buf();

        s.reset_chat().unwrap();
        s.begin_exchange("after reset");
        s.complete_exchange(reply("r2"));

        assert_ne!(s.transcript().path(), old_path.as_path());
        assert_eq!(
            std::fs::read_to_string(s.transcript().path()).unwrap(),
            "**User:** after reset\n**Model:** r2\n\n"
        );
        assert_eq!(
            std::fs::read_to_string(&old_path).unwrap(),
            "**User:** before reset\n**Model:** r1\n\n"
        );
    }

    #[test]
    fn test_validate_context_uses_budget() {
        let (s, _dir) = session(100);
        assert!(s.validate_context(&words(95)).is_err());
        assert!(s.validate_context(&words(50)).is_ok());
    }

    #[test]
    fn test_status_and_allowance() {
        let (mut s, _dir) = session(100);
        s.begin_exchange(&words(4));
        s.complete_exchange(reply(&words(6)));

        let status = s.status();
        assert_eq!(status.turns, 2);
        assert_eq!(status.total_tokens, 10);
        assert_eq!(status.hard_limit, 100);
        assert_eq!(status.warning_limit, 50);
        assert!(!status.has_context);
        assert_eq!(s.word_allowance(), 90);
    }

    #[test]
    fn test_load_context_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ctx.txt");
        std::fs::write(&path, "  You are terse.\n\n").unwrap();
        assert_eq!(load_context_file(&path).unwrap(), "You are terse.");
        assert!(load_context_file(&dir.path().join("missing.txt")).is_err());
    }
}
