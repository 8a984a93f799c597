//! Language model service
//!
//! The intent session talks to the model through [`LanguageModel`]: an
//! ordered list of role-tagged turns goes in, free text comes out.

mod gemini;
mod openai;

pub use gemini::GeminiChat;
pub use openai::OpenAiChat;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{LlmConfig, LlmProvider};
use crate::{Error, Result};

/// Author of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A chat-style language model
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Send the full turn history and return the model's raw reply
    ///
    /// # Errors
    ///
    /// Returns `Error::LanguageModel` on network, HTTP or empty-reply failures
    async fn complete(&self, turns: &[Turn]) -> Result<String>;
}

#[async_trait]
impl<M: LanguageModel + ?Sized> LanguageModel for Box<M> {
    async fn complete(&self, turns: &[Turn]) -> Result<String> {
        (**self).complete(turns).await
    }
}

/// Build the configured backend
///
/// # Errors
///
/// Returns `Error::Config` if the provider's API key is missing
pub fn from_config(config: &LlmConfig) -> Result<Box<dyn LanguageModel>> {
    let timeout = Duration::from_secs(config.timeout_secs);
    let api_key = config.api_key.clone().ok_or_else(|| {
        Error::Config(format!(
            "{} API key required (set {})",
            config.provider.as_str(),
            config.provider.api_key_env()
        ))
    })?;

    let model: Box<dyn LanguageModel> = match config.provider {
        LlmProvider::OpenAi | LlmProvider::Grok => Box::new(OpenAiChat::new(
            config.base_url(),
            api_key,
            config.model.clone(),
            timeout,
        )?),
        LlmProvider::Gemini => Box::new(GeminiChat::new(
            config.base_url(),
            api_key,
            config.model.clone(),
            timeout,
        )?),
    };

    tracing::info!(
        provider = config.provider.as_str(),
        model = %config.model,
        timeout_secs = config.timeout_secs,
        "language model client initialized"
    );

    Ok(model)
}

/// Build the shared HTTP client with a bounded wait
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(5).min(timeout))
        .build()
        .map_err(|e| Error::LanguageModel(format!("failed to build HTTP client: {e}")))
}
