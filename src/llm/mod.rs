//! LLM Layer
//!
//! Everything between the session and the remote model:
//! - Message model and generation/safety settings
//! - Token estimation and context budget checks
//! - The transport abstraction and its Gemini implementation

pub mod context;
pub mod gemini;
pub mod provider;
pub mod tokens;
pub mod types;

// Re-export key types
pub use context::{BudgetError, ContextCheck, TokenBudget};
pub use gemini::GeminiClient;
pub use provider::{ChatRequest, ChatTransport, FinishReason, ModelReply, TransportError};
pub use tokens::{CharHeuristic, EstimatorKind, TokenEstimator, WordHeuristic};
pub use types::{GenerationSettings, HarmCategory, Role, SafetySettings, SafetyThreshold, Turn};
