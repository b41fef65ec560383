//! Universal types for chat interactions.
//!
//! These types isolate the conversation logic from the wire format of the
//! generateContent API. `GenerationSettings` and the safety types serialize
//! directly into the request body.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

/// A single message in a conversation.
///
/// Fields are private: a turn never changes after it has been created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    role: Role,
    text: String,
}

impl Turn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self::new(Role::Model, text)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Sampling parameters sent with every request.
///
/// Set once from configuration and never mutated during a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSettings {
    pub temperature: f64,
    pub top_k: u32,
    pub top_p: f64,
    pub max_output_tokens: u32,
    #[serde(default)]
    pub stop_sequences: Vec<String>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.9,
            top_k: 1,
            top_p: 1.0,
            max_output_tokens: 2048,
            stop_sequences: Vec::new(),
        }
    }
}

/// How aggressively the API filters generated content.
///
/// See <https://ai.google.dev/api/rest/v1beta/SafetySetting#HarmBlockThreshold>.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SafetyThreshold {
    HarmBlockThresholdUnspecified,
    BlockLowAndAbove,
    BlockMediumAndAbove,
    BlockOnlyHigh,
    #[default]
    BlockNone,
}

impl SafetyThreshold {
    /// Wire name
    pub fn name(&self) -> &'static str {
        match self {
            Self::HarmBlockThresholdUnspecified => "HARM_BLOCK_THRESHOLD_UNSPECIFIED",
            Self::BlockLowAndAbove => "BLOCK_LOW_AND_ABOVE",
            Self::BlockMediumAndAbove => "BLOCK_MEDIUM_AND_ABOVE",
            Self::BlockOnlyHigh => "BLOCK_ONLY_HIGH",
            Self::BlockNone => "BLOCK_NONE",
        }
    }

    /// Get all thresholds
    pub fn all() -> Vec<Self> {
        vec![
            Self::HarmBlockThresholdUnspecified,
            Self::BlockLowAndAbove,
            Self::BlockMediumAndAbove,
            Self::BlockOnlyHigh,
            Self::BlockNone,
        ]
    }
}

impl fmt::Display for SafetyThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown safety threshold '{0}'")]
pub struct UnknownThreshold(pub String);

impl FromStr for SafetyThreshold {
    type Err = UnknownThreshold;

    /// Case-insensitive match against the wire names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_uppercase();
        Self::all()
            .into_iter()
            .find(|t| t.name() == wanted)
            .ok_or_else(|| UnknownThreshold(s.to_string()))
    }
}

/// Harm categories the client configures a threshold for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HarmCategory {
    #[serde(rename = "HARM_CATEGORY_HARASSMENT")]
    Harassment,
    #[serde(rename = "HARM_CATEGORY_HATE_SPEECH")]
    HateSpeech,
    #[serde(rename = "HARM_CATEGORY_SEXUALLY_EXPLICIT")]
    SexuallyExplicit,
    #[serde(rename = "HARM_CATEGORY_DANGEROUS_CONTENT")]
    DangerousContent,
}

impl HarmCategory {
    /// Configuration key holding this category's threshold
    pub fn config_key(&self) -> &'static str {
        match self {
            Self::Harassment => "HARASSMENT",
            Self::HateSpeech => "HATE_SPEECH",
            Self::SexuallyExplicit => "SEXUALLY_EXPLICIT",
            Self::DangerousContent => "DANGEROUS_CONTENT",
        }
    }

    pub fn all() -> [Self; 4] {
        [
            Self::Harassment,
            Self::HateSpeech,
            Self::SexuallyExplicit,
            Self::DangerousContent,
        ]
    }
}

/// One `{category, threshold}` entry of the request's `safetySettings`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetySetting {
    pub category: HarmCategory,
    pub threshold: SafetyThreshold,
}

/// Thresholds for the four configurable harm categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SafetySettings {
    pub harassment: SafetyThreshold,
    pub hate_speech: SafetyThreshold,
    pub sexually_explicit: SafetyThreshold,
    pub dangerous_content: SafetyThreshold,
}

impl SafetySettings {
    pub fn threshold(&self, category: HarmCategory) -> SafetyThreshold {
        match category {
            HarmCategory::Harassment => self.harassment,
            HarmCategory::HateSpeech => self.hate_speech,
            HarmCategory::SexuallyExplicit => self.sexually_explicit,
            HarmCategory::DangerousContent => self.dangerous_content,
        }
    }

    pub fn set(&mut self, category: HarmCategory, threshold: SafetyThreshold) {
        match category {
            HarmCategory::Harassment => self.harassment = threshold,
            HarmCategory::HateSpeech => self.hate_speech = threshold,
            HarmCategory::SexuallyExplicit => self.sexually_explicit = threshold,
            HarmCategory::DangerousContent => self.dangerous_content = threshold,
        }
    }

    /// Request form, one entry per category
    pub fn to_wire(&self) -> Vec<SafetySetting> {
        HarmCategory::all()
            .into_iter()
            .map(|category| SafetySetting {
                category,
                threshold: self.threshold(category),
            })
            .collect()
    }
}
