//! Error types for Hearth

use thiserror::Error;

/// Result type alias for Hearth operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Hearth
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (fatal at startup)
    #[error("configuration error: {0}")]
    Config(String),

    /// Capability priming data missing or unreadable (fatal at startup)
    #[error("priming error: {0}")]
    Priming(String),

    /// Invalid capability registration (duplicate names, bad operation table)
    #[error("capability error: {0}")]
    Capability(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("transcription error: {0}")]
    Transcription(#[from] TranscriptionError),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Keyword spotting engine could not be constructed
    #[error("keyword spotter unavailable: {0}")]
    SpotterUnavailable(String),

    /// Wake word detection failed while running
    #[error("wake word error: {0}")]
    WakeWord(String),

    /// Language model service failure (network, HTTP status, empty reply)
    #[error("language model error: {0}")]
    LanguageModel(String),

    /// Model output could not be parsed as an intent response
    #[error("interpretation error: {0}")]
    Interpretation(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether the main loop should simply resume listening after this error
    ///
    /// Startup errors (`Config`, `Priming`, `Capability`) are the only ones
    /// that are never transient.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        !matches!(
            self,
            Self::Config(_) | Self::Priming(_) | Self::Capability(_)
        )
    }
}

/// Failure modes of the audio/transcription collaborator
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TranscriptionError {
    /// Nothing was said before the listen timeout
    #[error("no speech before timeout")]
    NoSpeech,

    /// Audio was captured but the service could not make sense of it
    #[error("speech was unintelligible")]
    Unintelligible,

    /// The transcription service could not be reached or returned an error
    #[error("transcription service unreachable: {0}")]
    Unreachable(String),
}
