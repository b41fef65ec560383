//! Gemini generateContent Provider.
//!
//! Implements [`ChatTransport`] over the REST API: one blocking POST per turn,
//! the whole history in the body, the API key in the query string.

use super::provider::{ChatRequest, ChatTransport, FinishReason, ModelReply, TransportError};
use super::types::{GenerationSettings, Role, SafetySetting, Turn};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Gemini client configuration and state.
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    api_version: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_version: "v1beta".to_string(),
            model: "gemini-1.0-pro".to_string(),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Endpoint without the key; the key goes in as a query parameter.
    pub fn endpoint(&self) -> String {
        format!(
            "{}/{}/models/{}:generateContent",
            self.base_url, self.api_version, self.model
        )
    }
}

#[async_trait]
impl ChatTransport for GeminiClient {
    fn model(&self) -> &str {
        &self.model
    }

    fn set_api_key(&mut self, api_key: String) {
        self.api_key = api_key;
    }

    async fn generate(&self, request: ChatRequest<'_>) -> Result<ModelReply, TransportError> {
        let body = GenerateContentRequest::from(request);
        debug!(
            turns = body.contents.len(),
            model = %self.model,
            "sending generateContent request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&text)?;
        parsed.into_reply()
    }
}

// -----------------------------------------------------------------------------
// Gemini DTOs (Data Transfer Objects)
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationSettings,
    pub safety_settings: Vec<SafetySetting>,
}

impl From<ChatRequest<'_>> for GenerateContentRequest {
    fn from(request: ChatRequest<'_>) -> Self {
        Self {
            contents: request.turns.iter().map(Content::from).collect(),
            generation_config: request.generation.clone(),
            safety_settings: request.safety.to_wire(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub parts: Vec<Part>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

impl Content {
    /// Concatenated text of every part.
    pub fn text(&self) -> String {
        self.parts.iter().map(|p| p.text.as_str()).collect()
    }
}

impl From<&Turn> for Content {
    fn from(turn: &Turn) -> Self {
        Self {
            parts: vec![Part {
                text: turn.text().to_string(),
            }],
            role: Some(turn.role()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_feedback: Option<PromptFeedback>,
}

impl GenerateContentResponse {
    /// First candidate as a model turn.
    pub fn into_reply(self) -> Result<ModelReply, TransportError> {
        let Some(candidate) = self.candidates.into_iter().next() else {
            return Err(match self.prompt_feedback.and_then(|f| f.block_reason) {
                Some(reason) => TransportError::Blocked(reason),
                None => TransportError::NoCandidates,
            });
        };

        let finish_reason = candidate
            .finish_reason
            .unwrap_or(FinishReason::FinishReasonUnspecified);
        let text = candidate.content.map(|c| c.text()).unwrap_or_default();
        if text.is_empty() {
            return Err(TransportError::EmptyReply);
        }

        Ok(ModelReply {
            turn: Turn::model(text),
            finish_reason,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub safety_ratings: Vec<SafetyRating>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,
    #[serde(default)]
    pub safety_ratings: Vec<SafetyRating>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyRating {
    pub category: String,
    pub probability: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::{HarmCategory, SafetySettings, SafetyThreshold};

    const SAMPLE_RESPONSE: &str = r#"{
        "candidates": [{
            "content": {"parts": [{"text": "Hello"}, {"text": ", world"}], "role": "model"},
            "finishReason": "STOP",
            "index": 0,
            "safetyRatings": [
                {"category": "HARM_CATEGORY_HARASSMENT", "probability": "NEGLIGIBLE"}
            ]
        }],
        "promptFeedback": {
            "safetyRatings": [
                {"category": "HARM_CATEGORY_HATE_SPEECH", "probability": "NEGLIGIBLE"}
            ]
        }
    }"#;

    fn client() -> GeminiClient {
        GeminiClient::new("test_key", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_endpoint_construction() {
        let client = client()
            .with_base_url("https://test.api.com/")
            .with_api_version("v1")
            .with_model("gemini-custom");
        assert_eq!(
            client.endpoint(),
            "https://test.api.com/v1/models/gemini-custom:generateContent"
        );
        assert_eq!(client.model(), "gemini-custom");
    }

    #[test]
    fn test_default_endpoint() {
        assert_eq!(
            client().endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.0-pro:generateContent"
        );
    }

    #[test]
    fn test_request_body_shape() {
        let turns = vec![Turn::user("hi"), Turn::model("hello")];
        let generation = GenerationSettings::default();
        let mut safety = SafetySettings::default();
        safety.set(HarmCategory::DangerousContent, SafetyThreshold::BlockOnlyHigh);

        let body = GenerateContentRequest::from(ChatRequest {
            turns: &turns,
            generation: &generation,
            safety: &safety,
        });
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hi");
        assert_eq!(json["contents"][1]["role"], "model");
        assert_eq!(json["generationConfig"]["temperature"], 0.9);
        assert_eq!(json["generationConfig"]["topP"], 1.0);
        assert_eq!(json["safetySettings"].as_array().unwrap().len(), 4);
        assert_eq!(
            json["safetySettings"][3]["category"],
            "HARM_CATEGORY_DANGEROUS_CONTENT"
        );
        assert_eq!(json["safetySettings"][3]["threshold"], "BLOCK_ONLY_HIGH");
    }

    #[test]
    fn test_request_reserializes_identically() {
        let turns = vec![Turn::user("a"), Turn::model("b"), Turn::user("c")];
        let generation = GenerationSettings {
            stop_sequences: vec!["END".to_string()],
            ..GenerationSettings::default()
        };
        let safety = SafetySettings::default();
        let body = GenerateContentRequest::from(ChatRequest {
            turns: &turns,
            generation: &generation,
            safety: &safety,
        });

        let first = serde_json::to_string(&body).unwrap();
        let parsed: GenerateContentRequest = serde_json::from_str(&first).unwrap();
        assert_eq!(parsed, body);
        assert_eq!(serde_json::to_string(&parsed).unwrap(), first);
    }

    #[test]
    fn test_response_reserializes_identically() {
        let parsed: GenerateContentResponse = serde_json::from_str(SAMPLE_RESPONSE).unwrap();
        let again: GenerateContentResponse =
            serde_json::from_str(&serde_json::to_string(&parsed).unwrap()).unwrap();
        assert_eq!(parsed, again);
    }

    #[test]
    fn test_response_into_reply_joins_parts() {
        let parsed: GenerateContentResponse = serde_json::from_str(SAMPLE_RESPONSE).unwrap();
        let reply = parsed.into_reply().unwrap();
        assert_eq!(reply.turn, Turn::model("Hello, world"));
        assert_eq!(reply.finish_reason, FinishReason::Stop);
    }

    #[test]
    fn test_blocked_prompt() {
        let parsed: GenerateContentResponse = serde_json::from_str(
            r#"{"promptFeedback": {"blockReason": "SAFETY", "safetyRatings": []}}"#,
        )
        .unwrap();
        match parsed.into_reply() {
            Err(TransportError::Blocked(reason)) => assert_eq!(reason, "SAFETY"),
            other => panic!("expected Blocked, got {:?}", other),
        }
    }

    #[test]
    fn test_no_candidates() {
        let parsed: GenerateContentResponse = serde_json::from_str("{}").unwrap();
        assert!(matches!(
            parsed.into_reply(),
            Err(TransportError::NoCandidates)
        ));
    }

    #[test]
    fn test_candidate_without_text() {
        let parsed: GenerateContentResponse =
            serde_json::from_str(r#"{"candidates": [{"finishReason": "SAFETY", "index": 0}]}"#)
                .unwrap();
        assert!(matches!(parsed.into_reply(), Err(TransportError::EmptyReply)));
    }

    #[test]
    fn test_missing_finish_reason_is_unspecified() {
        let parsed: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [{"text": "x"}]}}]}"#,
        )
        .unwrap();
        let reply = parsed.into_reply().unwrap();
        assert_eq!(reply.finish_reason, FinishReason::FinishReasonUnspecified);
    }
}
