//! Configuration management for Hearth
//!
//! The TOML file is the single source of settings; API keys come from the
//! environment only. Anything missing or invalid is a startup error so the
//! assistant never listens in a partially configured state.

pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;

use crate::{Error, Result};
use file::HearthConfigFile;

/// Default transcription language
const DEFAULT_LANGUAGE: &str = "fr-FR";

/// Hearth configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Name the assistant answers to
    pub assistant_name: String,

    /// Transcription language tag
    pub language: String,

    /// Language model configuration
    pub llm: LlmConfig,

    /// Activation configuration
    pub wake_word: WakeWordConfig,

    /// Voice configuration
    pub voice: VoiceConfig,

    /// Enabled capabilities, sorted by name
    pub capabilities: Vec<CapabilityConfig>,

    /// API keys
    pub api_keys: ApiKeys,
}

/// Language model backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAi,
    Grok,
    Gemini,
}

impl LlmProvider {
    /// Parse a provider name
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for unknown names
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "grok" | "xai" => Ok(Self::Grok),
            "gemini" => Ok(Self::Gemini),
            other => Err(Error::Config(format!("unknown llm provider: {other}"))),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Grok => "grok",
            Self::Gemini => "gemini",
        }
    }

    /// Environment variable holding the API key
    #[must_use]
    pub const fn api_key_env(self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Grok => "XAI_API_KEY",
            Self::Gemini => "GEMINI_API_KEY",
        }
    }

    #[must_use]
    pub const fn default_model(self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4.1-nano",
            Self::Grok => "grok-2-mini",
            Self::Gemini => "gemini-2.0-flash",
        }
    }

    #[must_use]
    pub const fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Grok => "https://api.x.ai/v1",
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta",
        }
    }
}

/// Language model configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub model: String,
    /// Base URL override
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    /// Conversation lifetime
    pub session_ttl: chrono::Duration,
    /// Whole-turn retries after a service failure
    pub max_retries: u32,
    /// Speaking style appended to the instructions
    pub persona: Option<String>,
    pub api_key: Option<SecretString>,
}

impl LlmConfig {
    /// Effective API base URL
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_base_url())
    }
}

/// Activation configuration
#[derive(Debug, Clone)]
pub struct WakeWordConfig {
    /// Keyword model file; the keyword strategy is attempted only when set
    pub keyword_model_path: Option<PathBuf>,
    /// Detection threshold in `[0, 1]`
    pub sensitivity: f32,
    /// Phrase cap for each fallback listening round
    pub fallback_listen_timeout: Duration,
}

/// STT backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SttProvider {
    Whisper,
    Deepgram,
}

/// TTS backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsProvider {
    OpenAi,
    ElevenLabs,
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// How long to wait for speech to start
    pub listen_timeout: Duration,
    /// Maximum utterance length
    pub phrase_time_limit: Duration,
    pub stt_provider: SttProvider,
    pub stt_model: String,
    pub tts_provider: TtsProvider,
    pub tts_model: String,
    pub tts_voice: String,
    pub tts_speed: f32,
}

/// An enabled capability
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityConfig {
    /// Registered name
    pub name: String,
    /// JSON configuration blob
    pub configuration_path: PathBuf,
}

/// API keys for external services
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (Whisper, TTS)
    pub openai: Option<SecretString>,
    /// `Deepgram` API key (optional STT)
    pub deepgram: Option<SecretString>,
    /// `ElevenLabs` API key (optional TTS)
    pub elevenlabs: Option<SecretString>,
    /// Home Assistant long-lived access token
    pub home_assistant: Option<SecretString>,
    /// Hue bridge username
    pub hue_username: Option<SecretString>,
}

impl Config {
    /// Load configuration from `path`, or the default location
    ///
    /// # Errors
    ///
    /// Returns error if the file is missing, unparsable or invalid
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => file::config_file_path()
                .ok_or_else(|| Error::Config("cannot determine config directory".to_string()))?,
        };

        let parsed = file::load_config_file(&path)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_file(parsed, base_dir, &|key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file
    ///
    /// Relative paths are resolved against `base_dir`; `env` looks up API keys.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for missing or invalid settings
    pub fn from_file(
        file: HearthConfigFile,
        base_dir: &Path,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let secret = |key: &str| env(key).filter(|v| !v.is_empty()).map(SecretString::from);

        let assistant_name = file
            .assistant_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::Config("assistant_name is required".to_string()))?;

        let provider = file
            .llm
            .provider
            .as_deref()
            .map_or(Ok(LlmProvider::OpenAi), LlmProvider::parse)?;

        let timeout_secs = file.llm.timeout_secs.unwrap_or(30);
        if timeout_secs == 0 {
            return Err(Error::Config("llm.timeout_secs must be positive".to_string()));
        }

        let ttl_hours = file.llm.session_ttl_hours.unwrap_or(24);
        if ttl_hours == 0 {
            return Err(Error::Config(
                "llm.session_ttl_hours must be positive".to_string(),
            ));
        }

        let llm = LlmConfig {
            provider,
            model: file
                .llm
                .model
                .unwrap_or_else(|| provider.default_model().to_string()),
            base_url: file.llm.base_url,
            timeout_secs,
            session_ttl: chrono::Duration::hours(i64::from(ttl_hours)),
            max_retries: file.llm.max_retries.unwrap_or(1),
            persona: file.llm.persona,
            api_key: secret(provider.api_key_env()),
        };

        let sensitivity = file.wake_word.sensitivity.unwrap_or(0.6);
        if !(0.0..=1.0).contains(&sensitivity) {
            return Err(Error::Config(format!(
                "wake_word.sensitivity must be within [0, 1], got {sensitivity}"
            )));
        }

        let wake_word = WakeWordConfig {
            keyword_model_path: file
                .wake_word
                .keyword_model_path
                .map(|p| base_dir.join(p)),
            sensitivity,
            fallback_listen_timeout: seconds(
                "wake_word.fallback_listen_timeout_secs",
                file.wake_word.fallback_listen_timeout_secs.unwrap_or(3.0),
            )?,
        };

        let voice = VoiceConfig {
            listen_timeout: seconds(
                "voice.listen_timeout_secs",
                file.voice.listen_timeout_secs.unwrap_or(5.0),
            )?,
            phrase_time_limit: seconds(
                "voice.phrase_time_limit_secs",
                file.voice.phrase_time_limit_secs.unwrap_or(10.0),
            )?,
            stt_provider: match file.voice.stt_provider.as_deref() {
                None | Some("whisper") => SttProvider::Whisper,
                Some("deepgram") => SttProvider::Deepgram,
                Some(other) => {
                    return Err(Error::Config(format!("unknown stt provider: {other}")));
                }
            },
            stt_model: file
                .voice
                .stt_model
                .unwrap_or_else(|| "whisper-1".to_string()),
            tts_provider: match file.voice.tts_provider.as_deref() {
                None | Some("openai") => TtsProvider::OpenAi,
                Some("elevenlabs") => TtsProvider::ElevenLabs,
                Some(other) => {
                    return Err(Error::Config(format!("unknown tts provider: {other}")));
                }
            },
            tts_model: file.voice.tts_model.unwrap_or_else(|| "tts-1".to_string()),
            tts_voice: file.voice.tts_voice.unwrap_or_else(|| "alloy".to_string()),
            tts_speed: file.voice.tts_speed.unwrap_or(1.0),
        };

        let mut capabilities = Vec::new();
        for (name, cap) in file.capabilities {
            if !crate::capabilities::is_known(&name) {
                return Err(Error::Config(format!(
                    "unknown capability `{name}` (known: {})",
                    crate::capabilities::KNOWN.join(", ")
                )));
            }
            if !cap.enabled {
                tracing::debug!(capability = %name, "capability disabled");
                continue;
            }
            let configuration = cap.configuration.ok_or_else(|| {
                Error::Config(format!("capabilities.{name}.configuration is required"))
            })?;
            capabilities.push(CapabilityConfig {
                name,
                configuration_path: base_dir.join(configuration),
            });
        }

        let api_keys = ApiKeys {
            openai: secret("OPENAI_API_KEY"),
            deepgram: secret("DEEPGRAM_API_KEY"),
            elevenlabs: secret("ELEVENLABS_API_KEY"),
            home_assistant: secret("HOME_ASSISTANT_TOKEN"),
            hue_username: secret("HUE_USERNAME"),
        };

        Ok(Self {
            assistant_name,
            language: file
                .language
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            llm,
            wake_word,
            voice,
            capabilities,
            api_keys,
        })
    }
}

fn seconds(key: &str, value: f64) -> Result<Duration> {
    if value <= 0.0 {
        return Err(Error::Config(format!("{key} must be positive, got {value}")));
    }
    Duration::try_from_secs_f64(value).map_err(|e| Error::Config(format!("{key}: {e}")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn parse(toml_text: &str, env: &HashMap<&str, &str>) -> Result<Config> {
        let file: HearthConfigFile = toml::from_str(toml_text)?;
        Config::from_file(file, Path::new("/etc/hearth"), &|key| {
            env.get(key).map(ToString::to_string)
        })
    }

    #[test]
    fn defaults_apply() {
        let config = parse("assistant_name = \"Jarvis\"", &HashMap::new()).unwrap();
        assert_eq!(config.assistant_name, "Jarvis");
        assert_eq!(config.language, "fr-FR");
        assert_eq!(config.llm.provider, LlmProvider::OpenAi);
        assert_eq!(config.llm.model, "gpt-4.1-nano");
        assert_eq!(config.llm.session_ttl, chrono::Duration::hours(24));
        assert_eq!(config.llm.base_url(), "https://api.openai.com/v1");
        assert!(config.llm.api_key.is_none());
        assert_eq!(config.voice.phrase_time_limit, Duration::from_secs(10));
        assert!(config.wake_word.keyword_model_path.is_none());
        assert!(config.capabilities.is_empty());
    }

    #[test]
    fn assistant_name_is_required() {
        assert!(matches!(
            parse("language = \"fr-FR\"", &HashMap::new()),
            Err(Error::Config(_))
        ));
        assert!(parse("assistant_name = \"  \"", &HashMap::new()).is_err());
    }

    #[test]
    fn api_key_follows_provider() {
        let env = HashMap::from([("XAI_API_KEY", "xai-secret")]);
        let config = parse(
            "assistant_name = \"Jarvis\"\n[llm]\nprovider = \"grok\"",
            &env,
        )
        .unwrap();
        assert_eq!(config.llm.provider, LlmProvider::Grok);
        assert!(config.llm.api_key.is_some());
        assert!(!format!("{config:?}").contains("xai-secret"));
    }

    #[test]
    fn capability_paths_resolve_against_config_dir() {
        let config = parse(
            r#"
            assistant_name = "Jarvis"
            [capabilities.hue]
            configuration = "hue.json"
            [capabilities.home_assistant]
            enabled = false
            "#,
            &HashMap::new(),
        )
        .unwrap();
        assert_eq!(
            config.capabilities,
            vec![CapabilityConfig {
                name: "hue".to_string(),
                configuration_path: PathBuf::from("/etc/hearth/hue.json"),
            }]
        );
    }

    #[test]
    fn unknown_capability_is_rejected() {
        let err = parse(
            "assistant_name = \"Jarvis\"\n[capabilities.toaster]\nconfiguration = \"t.json\"",
            &HashMap::new(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("toaster"));
    }

    #[test]
    fn enabled_capability_needs_configuration() {
        assert!(parse(
            "assistant_name = \"Jarvis\"\n[capabilities.hue]\nenabled = true",
            &HashMap::new()
        )
        .is_err());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let env = HashMap::new();
        assert!(parse("assistant_name = \"J\"\n[wake_word]\nsensitivity = 1.5", &env).is_err());
        assert!(parse("assistant_name = \"J\"\n[llm]\ntimeout_secs = 0", &env).is_err());
        assert!(parse("assistant_name = \"J\"\n[llm]\nprovider = \"llama\"", &env).is_err());
        assert!(parse("assistant_name = \"J\"\n[voice]\nlisten_timeout_secs = 0", &env).is_err());
    }
}
