//! Voice pipeline integration tests
//!
//! Tests voice components without requiring audio hardware

use std::io::Cursor;
use std::time::Duration;

use hearth::voice::{SAMPLE_RATE, Segment, SegmenterState, SpeechSegmenter, samples_to_wav};

/// Generate sine wave audio samples
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn generate_sine_samples(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// Generate silence
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn generate_silence(duration_secs: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    vec![0.0; num_samples]
}

fn segmenter() -> SpeechSegmenter {
    SpeechSegmenter::new(SAMPLE_RATE, Duration::from_secs(5), Duration::from_secs(10))
}

#[test]
fn test_silence_keeps_waiting() {
    let mut segmenter = segmenter();

    assert_eq!(segmenter.push(&generate_silence(0.5)), Segment::Pending);
    assert_eq!(segmenter.state(), SegmenterState::Waiting);
}

#[test]
fn test_speech_then_silence_completes_utterance() {
    let mut segmenter = segmenter();

    let speech = generate_sine_samples(440.0, 0.5, 0.3);
    assert_eq!(segmenter.push(&speech), Segment::Pending);
    assert_eq!(segmenter.state(), SegmenterState::Speaking);

    let more_speech = generate_sine_samples(440.0, 0.3, 0.3);
    assert_eq!(segmenter.push(&more_speech), Segment::Pending);

    let silence = generate_silence(0.6);
    match segmenter.push(&silence) {
        Segment::Complete(samples) => {
            assert_eq!(samples.len(), speech.len() + more_speech.len() + silence.len());
        }
        other => panic!("expected a complete utterance, got {other:?}"),
    }
    assert_eq!(segmenter.state(), SegmenterState::Waiting);
}

#[test]
fn test_no_speech_before_timeout() {
    let mut segmenter =
        SpeechSegmenter::new(SAMPLE_RATE, Duration::from_secs(1), Duration::from_secs(10));

    assert_eq!(segmenter.push(&generate_silence(0.6)), Segment::Pending);
    assert_eq!(segmenter.push(&generate_silence(0.6)), Segment::NoSpeech);
}

#[test]
fn test_phrase_limit_cuts_long_speech() {
    let mut segmenter =
        SpeechSegmenter::new(SAMPLE_RATE, Duration::from_secs(5), Duration::from_secs(2));

    let chunk = generate_sine_samples(440.0, 0.5, 0.3);
    for _ in 0..3 {
        assert_eq!(segmenter.push(&chunk), Segment::Pending);
    }
    match segmenter.push(&chunk) {
        Segment::Complete(samples) => assert_eq!(samples.len(), chunk.len() * 4),
        other => panic!("expected the phrase limit to end the utterance, got {other:?}"),
    }
}

#[test]
fn test_short_noise_is_discarded() {
    let mut segmenter = segmenter();

    segmenter.push(&generate_sine_samples(440.0, 0.1, 0.3));
    assert_eq!(segmenter.state(), SegmenterState::Speaking);

    assert_eq!(segmenter.push(&generate_silence(0.6)), Segment::Pending);
    assert_eq!(segmenter.state(), SegmenterState::Waiting);
}

#[test]
fn test_reset_discards_partial_speech() {
    let mut segmenter = segmenter();

    segmenter.push(&generate_sine_samples(440.0, 0.5, 0.3));
    segmenter.reset();
    assert_eq!(segmenter.state(), SegmenterState::Waiting);

    // Silence alone cannot complete anything after a reset
    assert_eq!(segmenter.push(&generate_silence(0.6)), Segment::Pending);
}

#[test]
fn test_samples_to_wav() {
    let samples = generate_sine_samples(440.0, 0.1, 0.5);
    let wav_data = samples_to_wav(&samples, SAMPLE_RATE).unwrap();

    // Check WAV header magic
    assert_eq!(&wav_data[0..4], b"RIFF");
    assert_eq!(&wav_data[8..12], b"WAVE");

    // WAV should have reasonable size
    assert!(wav_data.len() > 44); // WAV header is 44 bytes
}

#[test]
fn test_wav_roundtrip() {
    let original_samples: Vec<f32> = vec![0.0, 0.5, -0.5, 1.0, -1.0, 0.25];
    let wav_data = samples_to_wav(&original_samples, SAMPLE_RATE).unwrap();

    let cursor = Cursor::new(wav_data);
    let mut reader = hound::WavReader::new(cursor).unwrap();

    let spec = reader.spec();
    assert_eq!(spec.sample_rate, SAMPLE_RATE);
    assert_eq!(spec.channels, 1);

    let read_samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(read_samples.len(), original_samples.len());
    assert_eq!(read_samples[3], i16::MAX);
}
