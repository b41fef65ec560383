//! geminicli - chat with Gemini from the terminal
//!
//! The interesting part is the conversation bookkeeping: a token-budgeted
//! history that drops its oldest turns on overflow, and a pre-flight check
//! that keeps oversized context files out of the session.

pub mod command;
pub mod config;
pub mod history;
pub mod llm;
pub mod repl;
pub mod session;
pub mod transcript;

pub use command::{Command, Input};
pub use config::{Config, ConfigFile, ConfigWarning};
pub use history::{ConversationHistory, Eviction, EvictionPolicy};
pub use llm::{
    BudgetError, ChatRequest, ChatTransport, ContextCheck, EstimatorKind, FinishReason,
    GeminiClient, GenerationSettings, ModelReply, Role, SafetySettings, SafetyThreshold,
    TokenBudget, TokenEstimator, TransportError, Turn,
};
pub use repl::{acquire_context, print_banner, run_repl, ReplOptions};
pub use session::{load_context_file, ExchangeOutcome, Session};
pub use transcript::TranscriptLog;
