//! Text-generation backends.
//!
//! The orchestrator only sees `GenerationBackend`. `GeminiBackend` talks to a
//! Gemini-style `generateContent` endpoint and reports HTTP status, timeout
//! and connect failures as structured fields of `GenerationError`.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use cardrag_core::config::GenerationConfig;
use cardrag_core::GenerationError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub system_instruction: String,
    pub user_prompt: String,
}

#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Produce free text for `request`.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

pub struct GeminiBackend {
    client: Client,
    config: GenerationConfig,
}

impl GeminiBackend {
    pub fn new(config: GenerationConfig, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, config })
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.config.endpoint.trim_end_matches('/'), self.config.model)
    }
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GeminiResponse {
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.iter().filter_map(|p| p.text.as_deref()).collect::<String>())
            .unwrap_or_default()
    }
}

fn from_reqwest(err: reqwest::Error) -> GenerationError {
    let err = err.without_url();
    if err.is_timeout() {
        GenerationError::timeout(err.to_string())
    } else if err.is_connect() {
        GenerationError::connect(err.to_string())
    } else if let Some(status) = err.status() {
        GenerationError::with_status(status.as_u16(), err.to_string())
    } else {
        GenerationError::new(err.to_string())
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        if self.config.api_key.trim().is_empty() {
            return Err(GenerationError::new("API key is not configured (generation.api_key)"));
        }
        let body = json!({
            "systemInstruction": { "parts": [{ "text": request.system_instruction }] },
            "contents": [{ "role": "user", "parts": [{ "text": request.user_prompt }] }],
            "generationConfig": { "temperature": self.config.temperature },
        });
        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let reason = status.canonical_reason().unwrap_or("error");
            return Err(GenerationError::with_status(status.as_u16(), format!("{} {}: {}", status.as_u16(), reason, detail.trim())));
        }
        let payload: GeminiResponse = response.json().await.map_err(from_reqwest)?;
        let text = payload.text();
        debug!(model = %self.config.model, chars = text.chars().count(), "generation complete");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_text_joins_parts_of_first_candidate() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"推薦"},{"text":"中油卡"}]}},{"content":{"parts":[{"text":"ignored"}]}}]}"#;
        let payload: GeminiResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(payload.text(), "推薦中油卡");
    }

    #[test]
    fn empty_response_has_no_text() {
        let payload: GeminiResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(payload.text(), "");
    }

    #[tokio::test]
    async fn missing_api_key_is_reported_before_any_request() {
        let backend = GeminiBackend::new(GenerationConfig::default(), Duration::from_secs(1)).unwrap();
        let req = GenerationRequest { system_instruction: "s".into(), user_prompt: "u".into() };
        let err = backend.generate(&req).await.unwrap_err();
        assert!(err.message.contains("API key"));
        assert_eq!(err.status, None);
    }
}
