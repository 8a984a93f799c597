//! Intent response wire format and sanitation

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Opening Markdown fence with an optional language tag (```json)
static OPENING_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\A```[A-Za-z0-9_-]*")
        .unwrap_or_else(|e| unreachable!("opening fence pattern is valid: {e}"))
});

/// Closing Markdown fence
static CLOSING_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```\z").unwrap_or_else(|e| unreachable!("closing fence pattern is valid: {e}"))
});

/// One structured instruction extracted from a model reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Registered name of the capability provider
    #[serde(rename = "manager_name")]
    pub target: String,

    /// Operation to invoke on the provider
    #[serde(rename = "command_name")]
    pub operation: String,

    /// Positional parameters, possibly nested lists
    #[serde(default)]
    pub params: Vec<Value>,
}

impl Command {
    /// Build a command
    pub fn new(target: impl Into<String>, operation: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            target: target.into(),
            operation: operation.into(),
            params,
        }
    }
}

/// The structured reply the model must produce for one utterance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentResponse {
    /// Short spoken acknowledgment (or apology)
    pub answer: String,

    /// Commands to execute, in order
    #[serde(default)]
    pub commands: Vec<Command>,
}

impl IntentResponse {
    /// Reply that acknowledges without doing anything
    pub fn apology(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            commands: Vec::new(),
        }
    }
}

/// Remove surrounding code fence markers, if any
///
/// Each marker is stripped independently, so a reply that only opens or only
/// closes a fence is still cleaned up.
#[must_use]
pub fn strip_code_fence(raw: &str) -> &str {
    let mut body = raw.trim();
    if let Some(m) = OPENING_FENCE.find(body) {
        body = body[m.end()..].trim_start();
    }
    if let Some(m) = CLOSING_FENCE.find(body) {
        body = body[..m.start()].trim_end();
    }
    body
}

/// Sanitize and parse a raw model reply
///
/// # Errors
///
/// Returns `Error::Interpretation` when the text is not a JSON object with an
/// `answer` string and well-formed `commands`
pub fn parse_intent(raw: &str) -> Result<IntentResponse> {
    let body = strip_code_fence(raw);
    serde_json::from_str(body).map_err(|e| {
        tracing::warn!(error = %e, reply = body, "model reply is not a valid intent response");
        Error::Interpretation(format!("{e}: {}", truncate(body, 200)))
    })
}

fn truncate(text: &str, max_chars: usize) -> &str {
    text.char_indices()
        .nth(max_chars)
        .map_or(text, |(i, _)| &text[..i])
}
