//! Speech-to-text (STT) processing

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::config::SttProvider;
use crate::error::TranscriptionError;
use crate::{Error, Result};

const WHISPER_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
const DEEPGRAM_URL: &str = "https://api.deepgram.com/v1/listen";

/// Response from OpenAI Whisper transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Response from Deepgram transcription API
#[derive(serde::Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(serde::Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(serde::Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(serde::Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

/// Transcribes WAV audio to text
pub struct SpeechToText {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    provider: SttProvider,
}

impl SpeechToText {
    /// Create a transcriber for `provider`
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(
        provider: SttProvider,
        api_key: SecretString,
        model: String,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build STT client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            model,
            provider,
        })
    }

    /// Transcribe WAV audio spoken in `language` (e.g. "fr-FR")
    ///
    /// # Errors
    ///
    /// Returns `Unintelligible` for an empty transcript and `Unreachable` for
    /// network or API failures
    pub async fn transcribe(
        &self,
        audio: &[u8],
        language: &str,
    ) -> std::result::Result<String, TranscriptionError> {
        let transcript = match self.provider {
            SttProvider::Whisper => self.transcribe_whisper(audio, language).await?,
            SttProvider::Deepgram => self.transcribe_deepgram(audio, language).await?,
        };

        let transcript = transcript.trim();
        if transcript.is_empty() {
            return Err(TranscriptionError::Unintelligible);
        }

        tracing::info!(transcript = %transcript, "transcription complete");
        Ok(transcript.to_string())
    }

    /// Transcribe using OpenAI Whisper
    async fn transcribe_whisper(
        &self,
        audio: &[u8],
        language: &str,
    ) -> std::result::Result<String, TranscriptionError> {
        tracing::debug!(audio_bytes = audio.len(), "starting Whisper transcription");

        let file = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(unreachable)?;

        let form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("model", self.model.clone())
            .text("language", primary_subtag(language).to_string());

        let response = self
            .client
            .post(WHISPER_URL)
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Whisper request failed");
                unreachable(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Whisper API error");
            return Err(TranscriptionError::Unreachable(format!(
                "Whisper API error {status}: {body}"
            )));
        }

        let result: WhisperResponse = response.json().await.map_err(unreachable)?;
        Ok(result.text)
    }

    /// Transcribe using Deepgram
    async fn transcribe_deepgram(
        &self,
        audio: &[u8],
        language: &str,
    ) -> std::result::Result<String, TranscriptionError> {
        tracing::debug!(audio_bytes = audio.len(), "starting Deepgram transcription");

        let response = self
            .client
            .post(DEEPGRAM_URL)
            .query(&[
                ("model", self.model.as_str()),
                ("language", language),
                ("punctuate", "true"),
            ])
            .header(
                "Authorization",
                format!("Token {}", self.api_key.expose_secret()),
            )
            .header("Content-Type", "audio/wav")
            .body(audio.to_vec())
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Deepgram request failed");
                unreachable(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Deepgram API error");
            return Err(TranscriptionError::Unreachable(format!(
                "Deepgram API error {status}: {body}"
            )));
        }

        let result: DeepgramResponse = response.json().await.map_err(unreachable)?;

        Ok(result
            .results
            .channels
            .first()
            .and_then(|c| c.alternatives.first())
            .map(|a| a.transcript.clone())
            .unwrap_or_default())
    }
}

fn unreachable(e: impl std::fmt::Display) -> TranscriptionError {
    TranscriptionError::Unreachable(e.to_string())
}

/// "fr-FR" → "fr"
fn primary_subtag(language: &str) -> &str {
    language.split(['-', '_']).next().unwrap_or(language)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_tag_is_reduced_for_whisper() {
        assert_eq!(primary_subtag("fr-FR"), "fr");
        assert_eq!(primary_subtag("en_US"), "en");
        assert_eq!(primary_subtag("de"), "de");
    }
}
