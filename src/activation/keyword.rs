//! Low-latency keyword activation
//!
//! Fixed-size frames from a dedicated input stream are fed to a keyword
//! spotting engine until it reports a match. The engine is
//! [rustpotter](https://github.com/GiviMAD/rustpotter), compiled in with the
//! `keyword-spotter` feature.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use super::ActivationResult;
use crate::voice::AudioCapture;
use crate::{Error, Result};

/// How long a frame source may go without delivering audio
const STALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll interval while waiting for a full frame
const FRAME_POLL: Duration = Duration::from_millis(10);

/// A keyword spotting engine
pub trait KeywordSpotter {
    /// Frame length the engine expects
    fn samples_per_frame(&self) -> usize;

    /// Feed one frame; true when the keyword was spotted
    fn process(&mut self, frame: &[f32]) -> bool;
}

/// A stream of fixed-size audio frames
#[async_trait(?Send)]
pub trait FrameSource {
    /// Wait for the next `len` samples
    ///
    /// # Errors
    ///
    /// Returns `Error::WakeWord` if the stream fails or stalls
    async fn next_frame(&mut self, len: usize) -> Result<Vec<f32>>;

    /// Release the underlying stream until the next frame is requested
    fn pause(&mut self);
}

/// Frames read from the default microphone
pub struct MicrophoneFrames {
    capture: AudioCapture,
}

impl MicrophoneFrames {
    /// Open the default input device
    ///
    /// # Errors
    ///
    /// Returns `Error::Audio` if no suitable input device exists
    pub fn new() -> Result<Self> {
        Ok(Self {
            capture: AudioCapture::new()?,
        })
    }
}

#[async_trait(?Send)]
impl FrameSource for MicrophoneFrames {
    async fn next_frame(&mut self, len: usize) -> Result<Vec<f32>> {
        if !self.capture.is_capturing() {
            self.capture
                .start()
                .map_err(|e| Error::WakeWord(format!("cannot open input stream: {e}")))?;
        }

        let deadline = tokio::time::Instant::now() + STALL_TIMEOUT;
        loop {
            if let Some(frame) = self.capture.take_frame(len) {
                return Ok(frame);
            }
            if tokio::time::Instant::now() >= deadline {
                self.capture.stop();
                return Err(Error::WakeWord("input stream stalled".to_string()));
            }
            tokio::time::sleep(FRAME_POLL).await;
        }
    }

    fn pause(&mut self) {
        self.capture.stop();
    }
}

/// Keyword activation strategy
pub struct KeywordStrategy {
    spotter: Box<dyn KeywordSpotter>,
    frames: Box<dyn FrameSource>,
}

impl KeywordStrategy {
    #[must_use]
    pub fn new(spotter: Box<dyn KeywordSpotter>, frames: Box<dyn FrameSource>) -> Self {
        Self { spotter, frames }
    }

    /// Load the keyword model and open the microphone
    ///
    /// # Errors
    ///
    /// Returns `Error::SpotterUnavailable` if the engine or the input stream
    /// cannot be set up
    pub fn open(model_path: &Path, sensitivity: f32) -> Result<Self> {
        let spotter = spotter::open(model_path, sensitivity)?;
        let frames = MicrophoneFrames::new()
            .map_err(|e| Error::SpotterUnavailable(format!("no input stream: {e}")))?;
        Ok(Self::new(spotter, Box::new(frames)))
    }

    /// Block until the keyword is spotted
    ///
    /// # Errors
    ///
    /// Returns `Error::WakeWord` if the frame source fails
    pub async fn wait_for_activation(&mut self) -> Result<ActivationResult> {
        let len = self.spotter.samples_per_frame();
        tracing::info!(frame = len, "listening for keyword");

        let outcome = loop {
            let frame = match self.frames.next_frame(len).await {
                Ok(frame) => frame,
                Err(e) => break Err(e),
            };
            if self.spotter.process(&frame) {
                tracing::info!("keyword spotted");
                break Ok(ActivationResult::cue_only());
            }
        };

        // Free the device for the follow-up recording
        self.frames.pause();
        outcome
    }
}

#[cfg(feature = "keyword-spotter")]
mod spotter {
    use std::path::Path;

    use rustpotter::{Rustpotter, RustpotterConfig, SampleFormat};

    use super::KeywordSpotter;
    use crate::voice::SAMPLE_RATE;
    use crate::{Error, Result};

    /// rustpotter-backed spotter
    pub struct RustpotterSpotter {
        detector: Rustpotter,
    }

    impl KeywordSpotter for RustpotterSpotter {
        fn samples_per_frame(&self) -> usize {
            self.detector.get_samples_per_frame()
        }

        fn process(&mut self, frame: &[f32]) -> bool {
            self.detector.process_f32(frame).is_some()
        }
    }

    pub fn open(model_path: &Path, sensitivity: f32) -> Result<Box<dyn KeywordSpotter>> {
        let mut config = RustpotterConfig::default();
        config.fmt.sample_rate = SAMPLE_RATE as usize;
        config.fmt.channels = 1;
        config.fmt.sample_format = SampleFormat::F32;
        config.detector.threshold = sensitivity;

        let mut detector = Rustpotter::new(&config)
            .map_err(|e| Error::SpotterUnavailable(format!("cannot create detector: {e}")))?;
        detector
            .add_wakeword_from_file("hearth", &model_path.to_string_lossy())
            .map_err(|e| {
                Error::SpotterUnavailable(format!(
                    "cannot load keyword model {}: {e}",
                    model_path.display()
                ))
            })?;

        tracing::info!(model = %model_path.display(), sensitivity, "keyword spotter loaded");
        Ok(Box::new(RustpotterSpotter { detector }))
    }
}

#[cfg(not(feature = "keyword-spotter"))]
mod spotter {
    use std::path::Path;

    use super::KeywordSpotter;
    use crate::{Error, Result};

    pub fn open(model_path: &Path, _sensitivity: f32) -> Result<Box<dyn KeywordSpotter>> {
        Err(Error::SpotterUnavailable(format!(
            "built without the `keyword-spotter` feature; ignoring {}",
            model_path.display()
        )))
    }
}
