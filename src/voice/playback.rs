//! Audio playback to speakers

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use crate::{Error, Result};

/// Decoded mono audio
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Plays audio to the default output device
#[derive(Debug, Default, Clone, Copy)]
pub struct AudioPlayback;

impl AudioPlayback {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode MP3 bytes and play them, returning when playback ends
    ///
    /// # Errors
    ///
    /// Returns error if decoding fails or no output device fits
    pub async fn play_mp3(&self, mp3_data: Vec<u8>) -> Result<()> {
        let audio = decode_mp3(&mp3_data)?;
        tokio::task::spawn_blocking(move || play_blocking(&audio))
            .await
            .map_err(|e| Error::Audio(format!("playback task failed: {e}")))?
    }
}

/// Play samples on a dedicated thread; cpal streams are not `Send`
#[allow(clippy::cast_possible_truncation)]
fn play_blocking(audio: &DecodedAudio) -> Result<()> {
    if audio.samples.is_empty() {
        return Ok(());
    }

    let device = cpal::default_host()
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

    let rate = SampleRate(audio.sample_rate);
    let supported = device
        .supported_output_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .filter(|c| c.min_sample_rate() <= rate && c.max_sample_rate() >= rate)
        .min_by_key(|c| c.channels())
        .ok_or_else(|| {
            Error::Audio(format!("no output config at {} Hz", audio.sample_rate))
        })?;
    let config: StreamConfig = supported.with_sample_rate(rate).config();
    let channels = usize::from(config.channels);

    let samples: Arc<[f32]> = audio.samples.clone().into();
    let position = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicBool::new(false));

    let stream = {
        let samples = Arc::clone(&samples);
        let position = Arc::clone(&position);
        let finished = Arc::clone(&finished);
        device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut pos = position.load(Ordering::Relaxed);
                    for frame in data.chunks_mut(channels) {
                        let sample = samples.get(pos).copied().unwrap_or(0.0);
                        frame.fill(sample);
                        if pos < samples.len() {
                            pos += 1;
                        }
                    }
                    position.store(pos, Ordering::Relaxed);
                    if pos >= samples.len() {
                        finished.store(true, Ordering::Release);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?
    };

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    let duration_ms = (samples.len() as u64 * 1000) / u64::from(audio.sample_rate);
    let deadline = Instant::now() + Duration::from_millis(duration_ms + 500);

    while !finished.load(Ordering::Acquire) && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(50));
    }

    // Let the device drain its last buffer
    std::thread::sleep(Duration::from_millis(100));
    drop(stream);

    tracing::debug!(samples = samples.len(), "playback complete");
    Ok(())
}

/// Decode MP3 bytes to mono f32 samples
///
/// # Errors
///
/// Returns `Error::Audio` on malformed input
pub fn decode_mp3(mp3_data: &[u8]) -> Result<DecodedAudio> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = 0;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                sample_rate = u32::try_from(frame.sample_rate).unwrap_or(0);
                let channels = frame.channels.max(1);
                samples.extend(frame.data.chunks(channels).map(|chunk| {
                    let sum: f32 = chunk.iter().map(|&s| f32::from(s) / 32768.0).sum();
                    #[allow(clippy::cast_precision_loss)]
                    let mean = sum / chunk.len() as f32;
                    mean
                }));
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    if sample_rate == 0 && !samples.is_empty() {
        return Err(Error::Audio("MP3 stream has no sample rate".to_string()));
    }

    Ok(DecodedAudio {
        samples,
        sample_rate: sample_rate.max(1),
    })
}
