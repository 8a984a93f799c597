//! Activation detection
//!
//! Decides when the user is addressing the assistant. Two strategies sit
//! behind one [`ActivationDetector`]:
//!
//! - **keyword**: a keyword spotter fed from a dedicated input stream; returns
//!   a bare cue and the caller records the command separately
//! - **phrase**: short recordings transcribed and searched for the assistant's
//!   name; words spoken along with the name come back as the command
//!
//! The keyword strategy is tried once at startup. If it cannot be built the
//! detector falls back to the phrase strategy for the rest of the process.

mod keyword;
mod phrase;

pub use keyword::{FrameSource, KeywordSpotter, KeywordStrategy, MicrophoneFrames};
pub use phrase::{NameMatch, NameMatcher, PhraseStrategy};

use crate::config::Config;
use crate::voice::SpeechInput;
use crate::Result;

/// Outcome of one activation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationResult {
    /// Command spoken together with the cue, if any
    pub command_text: Option<String>,
}

impl ActivationResult {
    /// A cue with nothing after it; the command must be recorded next
    #[must_use]
    pub const fn cue_only() -> Self {
        Self { command_text: None }
    }

    /// A cue bundled with its command
    pub fn with_command(text: impl Into<String>) -> Self {
        Self {
            command_text: Some(text.into()),
        }
    }

    /// Whether a separate recording must follow
    #[must_use]
    pub const fn requires_follow_up(&self) -> bool {
        self.command_text.is_none()
    }
}

/// Detector state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// Listening for a cue
    Idle,
    /// A cue was recognized and not yet consumed
    Detected,
}

/// Active strategy
pub enum Strategy {
    Keyword(KeywordStrategy),
    Phrase(PhraseStrategy),
}

impl Strategy {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Keyword(_) => "keyword",
            Self::Phrase(_) => "phrase",
        }
    }
}

/// Activation state machine over the selected strategy
pub struct ActivationDetector {
    strategy: Strategy,
    state: DetectorState,
}

impl ActivationDetector {
    #[must_use]
    pub const fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            state: DetectorState::Idle,
        }
    }

    /// Use `primary` if it was built, otherwise fall back to `fallback` for good
    #[must_use]
    pub fn with_fallback(primary: Result<KeywordStrategy>, fallback: PhraseStrategy) -> Self {
        match primary {
            Ok(keyword) => Self::new(Strategy::Keyword(keyword)),
            Err(e) => {
                tracing::warn!(error = %e, "keyword activation unavailable, using phrase matching");
                Self::new(Strategy::Phrase(fallback))
            }
        }
    }

    /// Select the strategy from configuration
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the assistant name is empty
    pub fn from_config(config: &Config) -> Result<Self> {
        let fallback = PhraseStrategy::new(
            NameMatcher::new(&config.assistant_name)?,
            config.language.clone(),
            config.voice.listen_timeout,
            config.wake_word.fallback_listen_timeout,
        );

        let detector = match &config.wake_word.keyword_model_path {
            Some(path) => Self::with_fallback(
                KeywordStrategy::open(path, config.wake_word.sensitivity),
                fallback,
            ),
            None => Self::new(Strategy::Phrase(fallback)),
        };

        tracing::info!(strategy = detector.strategy.name(), "activation detector ready");
        Ok(detector)
    }

    /// Block until the user addresses the assistant
    ///
    /// A detection left unconsumed is discarded first.
    ///
    /// # Errors
    ///
    /// Returns error if the audio source fails; transcription failures are
    /// retried internally
    pub async fn wait_for_activation(
        &mut self,
        input: &mut dyn SpeechInput,
    ) -> Result<ActivationResult> {
        self.state = DetectorState::Idle;

        let result = match &mut self.strategy {
            Strategy::Keyword(keyword) => keyword.wait_for_activation().await?,
            Strategy::Phrase(phrase) => phrase.wait_for_activation(input).await?,
        };

        self.state = DetectorState::Detected;
        Ok(result)
    }

    /// Mark the last detection as consumed
    pub fn acknowledge(&mut self) {
        self.state = DetectorState::Idle;
    }

    #[must_use]
    pub const fn state(&self) -> DetectorState {
        self.state
    }

    #[must_use]
    pub const fn strategy(&self) -> &Strategy {
        &self.strategy
    }
}
