//! Energy-based utterance segmentation
//!
//! Splits a live sample stream into one utterance: waits for speech to start,
//! accumulates until enough trailing silence, and enforces both the
//! "no speech starts" timeout and the phrase length cap.

use std::time::Duration;

/// Minimum RMS energy to consider a chunk speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum speech duration for a segment to count (0.3 s at 16 kHz)
const MIN_SPEECH_SAMPLES: usize = 4800;

/// Trailing silence that ends an utterance (0.5 s at 16 kHz)
const SILENCE_SAMPLES: usize = 8000;

/// Segmenter state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmenterState {
    /// Waiting for speech to start
    Waiting,
    /// Speech started, accumulating
    Speaking,
}

/// Outcome of feeding one chunk
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Keep feeding
    Pending,
    /// An utterance is complete
    Complete(Vec<f32>),
    /// Nothing was said before the listen timeout
    NoSpeech,
}

/// Turns a stream of chunks into a single utterance
#[derive(Debug)]
pub struct SpeechSegmenter {
    state: SegmenterState,
    speech: Vec<f32>,
    voiced: usize,
    silence: usize,
    waited: usize,
    start_timeout: usize,
    phrase_limit: usize,
}

impl SpeechSegmenter {
    /// Create a segmenter for `sample_rate` audio
    #[must_use]
    pub fn new(sample_rate: u32, start_timeout: Duration, phrase_limit: Duration) -> Self {
        Self {
            state: SegmenterState::Waiting,
            speech: Vec::new(),
            voiced: 0,
            silence: 0,
            waited: 0,
            start_timeout: samples_for(sample_rate, start_timeout),
            phrase_limit: samples_for(sample_rate, phrase_limit),
        }
    }

    /// Feed the next chunk of samples
    pub fn push(&mut self, samples: &[f32]) -> Segment {
        let energy = calculate_energy(samples);
        let is_speech = energy > ENERGY_THRESHOLD;

        match self.state {
            SegmenterState::Waiting => {
                if is_speech {
                    self.state = SegmenterState::Speaking;
                    self.speech.clear();
                    self.speech.extend_from_slice(samples);
                    self.voiced = samples.len();
                    self.silence = 0;
                    tracing::trace!(energy, "speech started");
                } else {
                    self.waited += samples.len();
                    if self.waited >= self.start_timeout {
                        tracing::debug!(waited = self.waited, "no speech before timeout");
                        self.reset();
                        return Segment::NoSpeech;
                    }
                }
            }
            SegmenterState::Speaking => {
                self.speech.extend_from_slice(samples);

                if is_speech {
                    self.voiced += samples.len();
                    self.silence = 0;
                } else {
                    self.silence += samples.len();
                }

                if self.speech.len() >= self.phrase_limit {
                    tracing::debug!(samples = self.speech.len(), "phrase limit reached");
                    return Segment::Complete(self.take());
                }

                if self.silence > SILENCE_SAMPLES {
                    if self.voiced >= MIN_SPEECH_SAMPLES {
                        tracing::debug!(samples = self.speech.len(), "utterance complete");
                        return Segment::Complete(self.take());
                    }

                    // A blip too short to be speech: go back to waiting
                    tracing::trace!(voiced = self.voiced, "discarding short noise");
                    self.waited += self.speech.len();
                    self.state = SegmenterState::Waiting;
                    self.speech.clear();
                    self.voiced = 0;
                    self.silence = 0;
                    if self.waited >= self.start_timeout {
                        self.reset();
                        return Segment::NoSpeech;
                    }
                }
            }
        }

        Segment::Pending
    }

    #[must_use]
    pub const fn state(&self) -> SegmenterState {
        self.state
    }

    /// Return to the initial state
    pub fn reset(&mut self) {
        self.state = SegmenterState::Waiting;
        self.speech.clear();
        self.voiced = 0;
        self.silence = 0;
        self.waited = 0;
    }

    fn take(&mut self) -> Vec<f32> {
        let speech = std::mem::take(&mut self.speech);
        self.reset();
        speech
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn samples_for(sample_rate: u32, duration: Duration) -> usize {
    (duration.as_secs_f64() * f64::from(sample_rate)).ceil() as usize
}

/// RMS energy of a chunk
#[allow(clippy::cast_precision_loss)]
pub fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
