//! Google Gemini `generateContent` backend

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

use super::{LanguageModel, Role, Turn};
use crate::{Error, Result};

/// Client for the Gemini REST API
pub struct GeminiChat {
    client: reqwest::Client,
    endpoint: String,
    api_key: SecretString,
}

impl GeminiChat {
    /// Create a client for `{base_url}/models/{model}:generateContent`
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(
        base_url: &str,
        api_key: SecretString,
        model: String,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: super::http_client(timeout)?,
            endpoint: format!(
                "{}/models/{model}:generateContent",
                base_url.trim_end_matches('/')
            ),
            api_key,
        })
    }
}

#[async_trait]
impl LanguageModel for GeminiChat {
    async fn complete(&self, turns: &[Turn]) -> Result<String> {
        let body = build_request(turns);

        tracing::debug!(turns = turns.len(), "sending gemini request");

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "gemini request failed");
                Error::LanguageModel(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "gemini API error");
            return Err(Error::LanguageModel(format!("API error {status}: {body}")));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::LanguageModel(format!("unreadable response: {e}")))?;

        extract_text(&body)
    }
}

/// System turns become `system_instruction`; the rest become `contents`
fn build_request(turns: &[Turn]) -> Value {
    let system: Vec<Value> = turns
        .iter()
        .filter(|t| t.role == Role::System)
        .map(|t| json!({ "text": t.content }))
        .collect();

    let contents: Vec<Value> = turns
        .iter()
        .filter_map(|t| {
            let role = match t.role {
                Role::System => return None,
                Role::User => "user",
                Role::Assistant => "model",
            };
            Some(json!({ "role": role, "parts": [{ "text": t.content }] }))
        })
        .collect();

    json!({
        "system_instruction": { "parts": system },
        "contents": contents,
        "generationConfig": { "temperature": 0 },
    })
}

fn extract_text(body: &Value) -> Result<String> {
    let parts = body
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::LanguageModel("response has no candidates".to_string()))?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();

    if text.is_empty() {
        return Err(Error::LanguageModel("response has no text".to_string()));
    }
    Ok(text)
}
