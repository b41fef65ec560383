//! The Transport Abstraction.
//!
//! This trait is the only thing the session knows about the remote API:
//! hand it the history and settings, get back a model turn or an error.

use super::types::{GenerationSettings, SafetySettings, Turn};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Everything one request carries, borrowed from the session.
#[derive(Debug, Clone, Copy)]
pub struct ChatRequest<'a> {
    pub turns: &'a [Turn],
    pub generation: &'a GenerationSettings,
    pub safety: &'a SafetySettings,
}

/// Why the model stopped generating.
///
/// See <https://ai.google.dev/api/rest/v1beta/Candidate#finishreason>.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinishReason {
    FinishReasonUnspecified,
    /// Natural stop point or a stop sequence.
    Stop,
    MaxTokens,
    Safety,
    Recitation,
    #[serde(other)]
    Other,
}

impl FinishReason {
    /// User-facing explanation for anything but a natural stop.
    pub fn notice(&self) -> Option<&'static str> {
        match self {
            Self::Stop => None,
            Self::MaxTokens => Some("reply was cut off at the maximum output token limit"),
            Self::Safety => Some("reply was flagged by the safety filters"),
            Self::Recitation => Some("reply was flagged for recitation"),
            Self::FinishReasonUnspecified => Some("model did not report why it stopped"),
            Self::Other => Some("model stopped for an unknown reason"),
        }
    }
}

/// A model turn plus the metadata the session cares about.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelReply {
    pub turn: Turn,
    pub finish_reason: FinishReason,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("prompt was blocked: {0}")]
    Blocked(String),

    #[error("response contained no candidates")]
    NoCandidates,

    #[error("response candidate contained no text")]
    EmptyReply,
}

/// The core trait for talking to a model.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Model identifier, for display.
    fn model(&self) -> &str;

    /// Replace the credential used for subsequent requests.
    fn set_api_key(&mut self, api_key: String);

    /// Send the whole history and wait for one reply.
    async fn generate(&self, request: ChatRequest<'_>) -> Result<ModelReply, TransportError>;
}
