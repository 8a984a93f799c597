//! OpenAI-compatible chat completions (`OpenAI`, xAI Grok)

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;

use super::{LanguageModel, Turn};
use crate::{Error, Result};

/// Chat completions request body
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Turn],
    temperature: f32,
}

/// Client for any endpoint speaking the `/chat/completions` protocol
pub struct OpenAiChat {
    client: reqwest::Client,
    endpoint: String,
    api_key: SecretString,
    model: String,
}

impl OpenAiChat {
    /// Create a client for `{base_url}/chat/completions`
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
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            model,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiChat {
    async fn complete(&self, turns: &[Turn]) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: turns,
            temperature: 0.0,
        };

        tracing::debug!(turns = turns.len(), model = %self.model, "sending chat completion");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "chat completion request failed");
                Error::LanguageModel(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "chat completion API error");
            return Err(Error::LanguageModel(format!("API error {status}: {body}")));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::LanguageModel(format!("unreadable response: {e}")))?;

        extract_answer(&body)
    }
}

/// Pull the assistant text out of a chat completions response
///
/// Content may be a plain string or a list of text parts.
pub(crate) fn extract_answer(body: &Value) -> Result<String> {
    let message = body
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| Error::LanguageModel("response has no choices".to_string()))?;

    match message.get("content") {
        Some(Value::String(text)) => return Ok(text.clone()),
        Some(Value::Array(parts)) => {
            let text: String = parts
                .iter()
                .filter_map(|part| match part {
                    Value::String(s) => Some(s.as_str()),
                    Value::Object(_) => part
                        .get("text")
                        .or_else(|| part.get("output_text"))
                        .and_then(Value::as_str),
                    _ => None,
                })
                .collect();
            if !text.is_empty() {
                return Ok(text);
            }
        }
        _ => {}
    }

    message
        .get("output_text")
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .ok_or_else(|| Error::LanguageModel("response has no assistant content".to_string()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn extracts_string_content() {
        let body = json!({"choices": [{"message": {"role": "assistant", "content": "{\"answer\":\"ok\"}"}}]});
        assert_eq!(extract_answer(&body).unwrap(), "{\"answer\":\"ok\"}");
    }

    #[test]
    fn joins_text_parts() {
        let body = json!({"choices": [{"message": {"content": [
            {"type": "text", "text": "{\"answer\":"},
            {"type": "output_text", "output_text": "\"ok\"}"}
        ]}}]});
        assert_eq!(extract_answer(&body).unwrap(), "{\"answer\":\"ok\"}");
    }

    #[test]
    fn missing_choices_is_a_service_error() {
        assert!(matches!(
            extract_answer(&json!({"error": "overloaded"})),
            Err(Error::LanguageModel(_))
        ));
        assert!(extract_answer(&json!({"choices": [{"message": {"content": null}}]})).is_err());
    }

    #[test]
    fn request_uses_lowercase_roles() {
        let turns = [Turn::system("rules"), Turn::user("hello")];
        let request = ChatRequest {
            model: "gpt-4.1-nano",
            messages: &turns,
            temperature: 0.0,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "hello");
    }

    #[test]
    fn endpoint_joins_base_url() {
        let chat = OpenAiChat::new(
            "https://api.x.ai/v1/",
            SecretString::from("key".to_string()),
            "grok-2-mini".to_string(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(chat.endpoint, "https://api.x.ai/v1/chat/completions");
    }
}
