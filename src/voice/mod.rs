//! Voice collaborators
//!
//! [`SpeechInput`] records one utterance and transcribes it; [`SpeechOutput`]
//! speaks an answer. The microphone and speaker implementations use cpal for
//! audio I/O and HTTP services for STT and TTS.

mod capture;
mod playback;
mod segmenter;
mod stt;
mod tts;

pub use capture::{AudioCapture, SAMPLE_RATE, samples_to_wav};
pub use playback::{AudioPlayback, DecodedAudio, decode_mp3};
pub use segmenter::{Segment, SegmenterState, SpeechSegmenter, calculate_energy};
pub use stt::SpeechToText;
pub use tts::TextToSpeech;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::time::Instant;

use crate::config::{Config, SttProvider, TtsProvider};
use crate::error::TranscriptionError;
use crate::{Error, Result};

/// How often the capture buffer is drained while listening
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Network bound for STT requests
const STT_TIMEOUT: Duration = Duration::from_secs(30);

/// One recorded utterance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioClip {
    /// Clip length
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }
}

/// Audio capture plus transcription
#[async_trait(?Send)]
pub trait SpeechInput {
    /// Record one utterance
    ///
    /// # Errors
    ///
    /// Returns `TranscriptionError::NoSpeech` if nothing is said within
    /// `timeout`, or `Error::Audio` if the device fails
    async fn listen(&mut self, timeout: Duration, phrase_time_limit: Duration)
    -> Result<AudioClip>;

    /// Transcribe a recorded utterance
    ///
    /// # Errors
    ///
    /// Returns `Error::Transcription` when the audio cannot be turned into text
    async fn transcribe(&self, audio: &AudioClip, language: &str) -> Result<String>;

    /// Record and transcribe in one step
    ///
    /// # Errors
    ///
    /// Propagates errors from [`listen`](Self::listen) and
    /// [`transcribe`](Self::transcribe)
    async fn hear(
        &mut self,
        timeout: Duration,
        phrase_time_limit: Duration,
        language: &str,
    ) -> Result<String> {
        let clip = self.listen(timeout, phrase_time_limit).await?;
        self.transcribe(&clip, language).await
    }
}

/// Spoken acknowledgment channel
#[async_trait(?Send)]
pub trait SpeechOutput {
    /// Speak `text`
    ///
    /// # Errors
    ///
    /// Returns error if synthesis or playback fails; callers log and move on
    async fn say(&self, text: &str) -> Result<()>;
}

/// Microphone capture with cloud transcription
pub struct MicrophoneInput {
    capture: AudioCapture,
    stt: SpeechToText,
}

impl MicrophoneInput {
    #[must_use]
    pub const fn new(capture: AudioCapture, stt: SpeechToText) -> Self {
        Self { capture, stt }
    }

    /// Open the default microphone and the configured STT backend
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the STT API key is missing and
    /// `Error::Audio` if no input device fits
    pub fn from_config(config: &Config) -> Result<Self> {
        let voice = &config.voice;
        let api_key = match voice.stt_provider {
            SttProvider::Whisper => require_key(config.api_keys.openai.as_ref(), "OPENAI_API_KEY")?,
            SttProvider::Deepgram => {
                require_key(config.api_keys.deepgram.as_ref(), "DEEPGRAM_API_KEY")?
            }
        };

        let stt = SpeechToText::new(voice.stt_provider, api_key, voice.stt_model.clone(), STT_TIMEOUT)?;
        Ok(Self::new(AudioCapture::new()?, stt))
    }
}

#[async_trait(?Send)]
impl SpeechInput for MicrophoneInput {
    async fn listen(
        &mut self,
        timeout: Duration,
        phrase_time_limit: Duration,
    ) -> Result<AudioClip> {
        let mut segmenter = SpeechSegmenter::new(SAMPLE_RATE, timeout, phrase_time_limit);
        // Wall-clock bound in case the device stops delivering samples
        let deadline = Instant::now() + timeout + phrase_time_limit + Duration::from_secs(1);

        self.capture.start()?;
        let outcome = loop {
            tokio::time::sleep(POLL_INTERVAL).await;

            let chunk = self.capture.take_buffer();
            if !chunk.is_empty() {
                match segmenter.push(&chunk) {
                    Segment::Complete(samples) => {
                        break Ok(AudioClip {
                            samples,
                            sample_rate: SAMPLE_RATE,
                        });
                    }
                    Segment::NoSpeech => break Err(TranscriptionError::NoSpeech.into()),
                    Segment::Pending => {}
                }
            }

            if Instant::now() >= deadline {
                tracing::warn!("audio device delivered no complete utterance before deadline");
                break Err(TranscriptionError::NoSpeech.into());
            }
        };
        self.capture.stop();

        if let Ok(clip) = &outcome {
            tracing::debug!(duration_ms = clip.duration().as_millis(), "utterance recorded");
        }
        outcome
    }

    async fn transcribe(&self, audio: &AudioClip, language: &str) -> Result<String> {
        let wav = samples_to_wav(&audio.samples, audio.sample_rate)?;
        Ok(self.stt.transcribe(&wav, language).await?)
    }
}

/// TTS synthesis played on the default output device
pub struct Speaker {
    tts: TextToSpeech,
    playback: AudioPlayback,
}

impl Speaker {
    #[must_use]
    pub const fn new(tts: TextToSpeech) -> Self {
        Self {
            tts,
            playback: AudioPlayback::new(),
        }
    }

    /// Build the configured TTS backend
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the TTS API key is missing
    pub fn from_config(config: &Config) -> Result<Self> {
        let voice = &config.voice;
        let api_key = match voice.tts_provider {
            TtsProvider::OpenAi => require_key(config.api_keys.openai.as_ref(), "OPENAI_API_KEY")?,
            TtsProvider::ElevenLabs => {
                require_key(config.api_keys.elevenlabs.as_ref(), "ELEVENLABS_API_KEY")?
            }
        };

        Ok(Self::new(TextToSpeech::new(
            voice.tts_provider,
            api_key,
            voice.tts_model.clone(),
            voice.tts_voice.clone(),
            voice.tts_speed,
        )?))
    }
}

#[async_trait(?Send)]
impl SpeechOutput for Speaker {
    async fn say(&self, text: &str) -> Result<()> {
        let mp3 = self.tts.synthesize(text).await?;
        tracing::debug!(bytes = mp3.len(), "speech synthesized");
        self.playback.play_mp3(mp3).await
    }
}

/// Prints answers to stdout (interactive text mode)
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleOutput;

#[async_trait(?Send)]
impl SpeechOutput for ConsoleOutput {
    async fn say(&self, text: &str) -> Result<()> {
        println!("{text}");
        Ok(())
    }
}

fn require_key(key: Option<&SecretString>, env: &str) -> Result<SecretString> {
    key.cloned()
        .ok_or_else(|| Error::Config(format!("{env} must be set for voice mode")))
}
