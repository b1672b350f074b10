//! Google Generative Language API responder.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ClassificationError, Responder};
use crate::error::AnalysisError;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Model used when neither the CLI nor the config file names one.
pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";

/// Sends each prompt as a single-turn `generateContent` request.
pub struct GeminiResponder {
    client: reqwest::Client,
    model: String,
    api_key: String,
    base_url: String,
}

impl GeminiResponder {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            model: model.into(),
            api_key: api_key.into(),
            base_url: GEMINI_API_BASE.to_string(),
        }
    }

    /// Read the API key from the environment, loading `.env` first if present.
    pub fn from_env(model: impl Into<String>) -> Result<Self, AnalysisError> {
        // A missing .env file is fine; the variable may already be set.
        let _ = dotenvy::dotenv();
        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                AnalysisError::Config(format!(
                    "{API_KEY_ENV} is not set (export it or add it to a .env file)"
                ))
            })?;
        Ok(Self::new(model, api_key))
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn generate_url(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    /// List every model visible to this key, following pagination.
    pub async fn list_models(&self) -> anyhow::Result<Vec<ModelInfo>> {
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self
                .client
                .get(format!("{}/models", self.base_url))
                .header("x-goog-api-key", &self.api_key)
                .query(&[("pageSize", "1000")]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                anyhow::bail!("Gemini API error (HTTP {status}): {body}");
            }
            let page: ModelList = response.json().await?;
            models.extend(page.models);
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(models)
    }
}

impl Responder for GeminiResponder {
    async fn respond(&mut self, prompt: &str) -> Result<String, ClassificationError> {
        debug!(model = %self.model, prompt_len = prompt.len(), "sending generateContent request");
        let response = self
            .client
            .post(self.generate_url())
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body(prompt))
            .send()
            .await
            .map_err(|e| ClassificationError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ClassificationError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(ClassificationError::Transport(format!(
                "Gemini API error (HTTP {status}): {body}"
            )));
        }

        let parsed: GenerateContentResponse =
            serde_json::from_str(&body).map_err(|e| ClassificationError::Malformed {
                reason: format!("unexpected response shape: {e}"),
                raw: body.clone(),
            })?;
        response_text(parsed).ok_or_else(|| ClassificationError::Malformed {
            reason: "response contained no candidate text".to_string(),
            raw: body,
        })
    }
}

// ── Wire types ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

/// A model entry from the `models` listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

impl ModelInfo {
    pub fn supports(&self, method: &str) -> bool {
        self.supported_generation_methods.iter().any(|m| m == method)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelInfo>,
    #[serde(default)]
    next_page_token: Option<String>,
}

fn request_body(prompt: &str) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts: vec![Part {
                text: Some(prompt.to_string()),
            }],
        }],
    }
}

/// Concatenated text parts of the first candidate.
fn response_text(response: GenerateContentResponse) -> Option<String> {
    let content = response.candidates.into_iter().next()?.content?;
    let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_body_shape() {
        let body = serde_json::to_value(request_body("classify this")).unwrap();
        assert_eq!(
            body,
            json!({"contents": [{"role": "user", "parts": [{"text": "classify this"}]}]})
        );
    }

    #[test]
    fn generate_url_uses_model() {
        let r = GeminiResponder::new("gemini-2.5-flash", "k").with_base_url("http://localhost:1");
        assert_eq!(
            r.generate_url(),
            "http://localhost:1/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn response_text_joins_parts() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "{\"is_"}, {"text": "debugging\": false}"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"totalTokenCount": 12}
        }))
        .unwrap();
        assert_eq!(
            response_text(response).as_deref(),
            Some("{\"is_debugging\": false}")
        );
    }

    #[test]
    fn response_without_candidates_has_no_text() {
        let response: GenerateContentResponse =
            serde_json::from_value(json!({"promptFeedback": {"blockReason": "SAFETY"}})).unwrap();
        assert_eq!(response_text(response), None);
    }

    #[test]
    fn model_listing_parses() {
        let list: ModelList = serde_json::from_value(json!({
            "models": [
                {"name": "models/gemini-2.5-pro", "displayName": "Gemini 2.5 Pro",
                 "supportedGenerationMethods": ["generateContent", "countTokens"]},
                {"name": "models/embedding-001", "supportedGenerationMethods": ["embedContent"]}
            ],
            "nextPageToken": ""
        }))
        .unwrap();
        assert!(list.models[0].supports("generateContent"));
        assert!(!list.models[1].supports("generateContent"));
        assert_eq!(list.models[0].display_name.as_deref(), Some("Gemini 2.5 Pro"));
    }

    #[tokio::test]
    async fn unreachable_host_is_transport_error() {
        // Port 1 on localhost refuses connections.
        let mut r = GeminiResponder::new(DEFAULT_MODEL, "k").with_base_url("http://127.0.0.1:1");
        let err = r.respond("hi").await.unwrap_err();
        assert!(matches!(err, ClassificationError::Transport(_)), "{err}");
    }
}
