//! TOML configuration file schema
//!
//! Read from `--config <path>` or `~/.config/hearth/config.toml`. Everything
//! except `assistant_name` has a default.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Error, Result};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct HearthConfigFile {
    /// Name the assistant answers to (e.g. "Jarvis")
    pub assistant_name: Option<String>,

    /// Transcription language tag (e.g. "fr-FR")
    pub language: Option<String>,

    /// Language model configuration
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Activation configuration
    #[serde(default)]
    pub wake_word: WakeWordFileConfig,

    /// Audio capture, STT and TTS configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Capability providers keyed by registered name
    #[serde(default)]
    pub capabilities: BTreeMap<String, CapabilityFileConfig>,
}

/// LLM-related configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// "openai", "grok" or "gemini"
    pub provider: Option<String>,

    /// Model identifier
    pub model: Option<String>,

    /// Override of the provider's API base URL
    pub base_url: Option<String>,

    /// Network timeout per request
    pub timeout_secs: Option<u64>,

    /// Conversation lifetime before it is re-primed
    pub session_ttl_hours: Option<u32>,

    /// Whole-turn retries after a service failure
    pub max_retries: Option<u32>,

    /// Speaking style appended to the instructions
    pub persona: Option<String>,
}

/// Activation configuration
#[derive(Debug, Default, Deserialize)]
pub struct WakeWordFileConfig {
    /// Keyword model file; enables the keyword strategy when set
    pub keyword_model_path: Option<PathBuf>,

    /// Keyword detection threshold in `[0, 1]`
    pub sensitivity: Option<f32>,

    /// Phrase cap for each fallback listening round
    pub fallback_listen_timeout_secs: Option<f64>,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// How long to wait for speech to start
    pub listen_timeout_secs: Option<f64>,

    /// Maximum utterance length
    pub phrase_time_limit_secs: Option<f64>,

    /// "whisper" or "deepgram"
    pub stt_provider: Option<String>,

    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// "openai" or "elevenlabs"
    pub tts_provider: Option<String>,

    /// TTS model (e.g. "tts-1")
    pub tts_model: Option<String>,

    /// TTS voice identifier (e.g. "alloy")
    pub tts_voice: Option<String>,

    /// TTS speed multiplier
    pub tts_speed: Option<f32>,
}

/// Per-capability configuration
#[derive(Debug, Deserialize)]
pub struct CapabilityFileConfig {
    /// Disabled capabilities are neither registered nor primed
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// JSON configuration blob shared with the provider and the model
    pub configuration: Option<PathBuf>,
}

const fn default_enabled() -> bool {
    true
}

/// Read and parse a configuration file
///
/// # Errors
///
/// Returns `Error::Config` if the file is missing and `Error::Toml` if it
/// cannot be parsed
pub fn load_config_file(path: &Path) -> Result<HearthConfigFile> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("cannot read config file {}: {e}", path.display()))
    })?;

    let config = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Return the default config file path: `~/.config/hearth/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "hearth").map(|d| d.config_dir().join("config.toml"))
}
