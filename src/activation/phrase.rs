//! Phrase-matching activation
//!
//! Records short utterances and looks for the assistant's name in each
//! transcript. Matching is a case-insensitive substring search everywhere.

use std::time::Duration;

use regex::{Regex, RegexBuilder};

use super::ActivationResult;
use crate::voice::SpeechInput;
use crate::{Error, Result};

/// Characters trimmed around the text left after removing the name
const SEPARATORS: &[char] = &[',', '.', '!', '?', ';', ':', '-'];

/// Outcome of looking for the assistant's name in a transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameMatch {
    /// The name does not occur
    Absent,
    /// The transcript is only the name
    Alone,
    /// The name occurs and other words remain
    WithCommand(String),
}

/// Case-insensitive matcher for the assistant's name
#[derive(Debug, Clone)]
pub struct NameMatcher {
    name: String,
    pattern: Regex,
}

impl NameMatcher {
    /// Build a matcher for `name`
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the name is empty
    pub fn new(name: &str) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Config("assistant name is empty".to_string()));
        }

        let pattern = RegexBuilder::new(&regex::escape(name))
            .case_insensitive(true)
            .build()
            .map_err(|e| Error::Config(format!("invalid assistant name: {e}")))?;

        Ok(Self {
            name: name.to_string(),
            pattern,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the name occurs anywhere in `text`
    #[must_use]
    pub fn is_mentioned(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }

    /// Remove the first occurrence of the name and classify what remains
    #[must_use]
    pub fn strip(&self, text: &str) -> NameMatch {
        let Some(m) = self.pattern.find(text) else {
            return NameMatch::Absent;
        };

        let before = clean(&text[..m.start()]);
        let after = clean(&text[m.end()..]);
        let remainder = match (before.is_empty(), after.is_empty()) {
            (true, true) => return NameMatch::Alone,
            (true, false) => after.to_string(),
            (false, true) => before.to_string(),
            (false, false) => format!("{before} {after}"),
        };

        NameMatch::WithCommand(remainder)
    }
}

fn clean(text: &str) -> &str {
    text.trim_matches(|c: char| c.is_whitespace() || SEPARATORS.contains(&c))
}

/// Fallback activation strategy
#[derive(Debug, Clone)]
pub struct PhraseStrategy {
    matcher: NameMatcher,
    language: String,
    listen_timeout: Duration,
    phrase_time_limit: Duration,
}

impl PhraseStrategy {
    /// Listen in rounds of at most `phrase_time_limit`, each waiting up to
    /// `listen_timeout` for speech to start
    #[must_use]
    pub fn new(
        matcher: NameMatcher,
        language: impl Into<String>,
        listen_timeout: Duration,
        phrase_time_limit: Duration,
    ) -> Self {
        Self {
            matcher,
            language: language.into(),
            listen_timeout,
            phrase_time_limit,
        }
    }

    /// Block until the name is heard
    ///
    /// Transcription failures of any kind are logged and the next round
    /// starts; only audio device errors end the wait.
    ///
    /// # Errors
    ///
    /// Returns error if the audio device fails
    pub async fn wait_for_activation(
        &mut self,
        input: &mut dyn SpeechInput,
    ) -> Result<ActivationResult> {
        tracing::info!(name = self.matcher.name(), "listening for the assistant's name");

        loop {
            let transcript = match input
                .hear(self.listen_timeout, self.phrase_time_limit, &self.language)
                .await
            {
                Ok(text) => text,
                Err(Error::Transcription(e)) => {
                    tracing::debug!(error = %e, "activation round produced no transcript");
                    continue;
                }
                Err(e) => return Err(e),
            };

            tracing::debug!(transcript = %transcript, "activation round transcript");

            match self.matcher.strip(&transcript) {
                NameMatch::Absent => {}
                NameMatch::Alone => {
                    tracing::info!("assistant name heard alone");
                    return Ok(ActivationResult::cue_only());
                }
                NameMatch::WithCommand(command) => {
                    tracing::info!(command = %command, "assistant name heard with command");
                    return Ok(ActivationResult::with_command(command));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jarvis() -> NameMatcher {
        NameMatcher::new("Jarvis").unwrap()
    }

    #[test]
    fn strips_name_case_insensitively() {
        assert_eq!(
            jarvis().strip("jarvis, turn on the lights."),
            NameMatch::WithCommand("turn on the lights".to_string())
        );
        assert_eq!(
            jarvis().strip("Turn on the lights JARVIS"),
            NameMatch::WithCommand("Turn on the lights".to_string())
        );
        assert_eq!(
            jarvis().strip("Dim, Jarvis, the lamp"),
            NameMatch::WithCommand("Dim the lamp".to_string())
        );
    }

    #[test]
    fn name_alone_and_absent() {
        assert_eq!(jarvis().strip("  Jarvis ? "), NameMatch::Alone);
        assert_eq!(jarvis().strip("turn on the lights"), NameMatch::Absent);
        assert!(!jarvis().is_mentioned(""));
    }

    #[test]
    fn name_with_regex_characters_is_literal() {
        let matcher = NameMatcher::new("R2.D2").unwrap();
        assert!(matcher.is_mentioned("hey r2.d2"));
        assert!(!matcher.is_mentioned("hey r2xd2"));
    }

    #[test]
    fn empty_name_is_rejected() {
        assert!(NameMatcher::new("  ").is_err());
    }
}
