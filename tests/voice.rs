//! Voice pipeline integration tests
//!
//! Tests voice components without requiring audio hardware

use std::io::Cursor;

use sottovoce::voice::{
    AudioFrame, DeviceFramer, EarshotClassifier, FrameChunker, FrameClassifier, Utterance,
    VadConfig, decode_audio,
};
use sottovoce::Error;

mod common;

const SAMPLE_RATE: u32 = 16000;

/// Generate sine wave audio samples
fn generate_sine_samples(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    generate_sine_at(SAMPLE_RATE, frequency, duration_secs, amplitude)
}

fn generate_sine_at(rate: u32, frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (rate as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / rate as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

fn to_i16(samples: &[f32]) -> Vec<i16> {
    samples.iter().map(|s| (s * 32767.0) as i16).collect()
}

#[test]
fn test_chunker_feeds_exact_frames() {
    let config = VadConfig::default();
    let mut chunker = FrameChunker::new(config.frame_samples(), 1);
    let mut frames = Vec::new();

    // Device buffers rarely line up with frame boundaries
    let samples = to_i16(&generate_sine_samples(440.0, 0.1, 0.5));
    for buffer in samples.chunks(512) {
        chunker.push(buffer, |s| s, |frame| frames.push(frame));
    }

    // 1600 samples -> three 480-sample frames, 160 left over
    assert_eq!(frames.len(), 3);
    assert!(frames.iter().all(|f| f.len() == config.frame_bytes()));
    assert_eq!(chunker.pending(), 160);

    let rejoined: Vec<i16> = frames.iter().flat_map(AudioFrame::samples).collect();
    assert_eq!(rejoined, samples[..1440]);
}

#[test]
fn test_chunked_frames_pass_classifier_size_check() {
    let config = VadConfig::default();
    let mut classifier = EarshotClassifier::new(&config).unwrap();
    let mut chunker = FrameChunker::new(config.frame_samples(), 2);
    let mut frames = Vec::new();

    let stereo = vec![0.0_f32; config.frame_samples() * 2 * 4];
    chunker.push(&stereo, |s: f32| (s * 32767.0) as i16, |frame| frames.push(frame));

    assert_eq!(frames.len(), 4);
    for frame in &frames {
        assert!(!classifier.classify(frame, config.sample_rate).unwrap());
    }
}

#[test]
fn test_48khz_stereo_device_is_resampled_into_vad_frames() {
    let config = VadConfig::default();
    let mut framer = DeviceFramer::new(&config, 48000, 2).unwrap();
    let mut classifier = EarshotClassifier::new(&config).unwrap();
    let mut frames = Vec::new();

    // One second of a 440 Hz tone on both channels
    let mono = generate_sine_at(48000, 440.0, 1.0, 0.5);
    let stereo: Vec<f32> = mono.iter().flat_map(|&s| [s, s]).collect();
    for buffer in stereo.chunks(1024) {
        framer
            .push(buffer, |s: f32| (s * 32767.0) as i16, |frame| frames.push(frame))
            .unwrap();
    }

    // ~33 frames of 30 ms, minus what the resampler still holds
    assert!((28..=33).contains(&frames.len()), "got {} frames", frames.len());
    for frame in &frames {
        assert_eq!(frame.len(), config.frame_bytes());
        classifier.classify(frame, config.sample_rate).unwrap();
    }

    // The tone keeps its level through resampling
    let peak = frames[10].samples().map(i16::unsigned_abs).max().unwrap();
    assert!((14000..=18000).contains(&peak), "peak {peak}");
}

#[test]
fn test_44khz_mono_device_is_resampled_into_vad_frames() {
    let config = VadConfig::default();
    let mut framer = DeviceFramer::new(&config, 44100, 1).unwrap();
    let mut frames = Vec::new();

    let samples = to_i16(&generate_sine_at(44100, 300.0, 1.0, 0.3));
    for buffer in samples.chunks(441) {
        framer.push(buffer, |s| s, |frame| frames.push(frame)).unwrap();
    }

    assert!((28..=33).contains(&frames.len()), "got {} frames", frames.len());
    assert!(frames.iter().all(|f| f.len() == config.frame_bytes()));
}

#[test]
fn test_earshot_rejects_wrong_frame_size() {
    let config = VadConfig::default();
    let mut classifier = EarshotClassifier::new(&config).unwrap();

    let frame = AudioFrame::from_samples(&[0; 100]);
    let err = classifier.classify(&frame, config.sample_rate).unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidFrame {
            expected: 960,
            actual: 200
        }
    ));
}

#[test]
fn test_earshot_is_deterministic() {
    let config = VadConfig {
        aggressiveness: 0,
        ..VadConfig::default()
    };
    let samples = to_i16(&generate_sine_samples(220.0, 0.03, 0.6));
    let frame = AudioFrame::from_samples(&samples);

    let mut first = EarshotClassifier::new(&config).unwrap();
    let mut second = EarshotClassifier::new(&config).unwrap();
    assert_eq!(
        first.classify(&frame, config.sample_rate).unwrap(),
        second.classify(&frame, config.sample_rate).unwrap()
    );
}

#[test]
fn test_earshot_supports_8khz() {
    let config = VadConfig {
        sample_rate: 8000,
        frame_duration_ms: 20,
        ..VadConfig::default()
    };
    let mut classifier = EarshotClassifier::new(&config).unwrap();

    let frame = AudioFrame::from_samples(&vec![0; config.frame_samples()]);
    assert_eq!(frame.len(), 320);
    assert!(!classifier.classify(&frame, 8000).unwrap());
}

#[test]
fn test_utterance_wav_round_trip() {
    let samples = to_i16(&generate_sine_samples(440.0, 0.1, 0.5));
    let utterance = Utterance::assemble(vec![AudioFrame::from_samples(&samples)], SAMPLE_RATE)
        .unwrap();

    let wav = utterance.to_wav().unwrap();
    let reader = hound::WavReader::new(Cursor::new(&wav)).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, SAMPLE_RATE);
    assert_eq!(spec.bits_per_sample, 16);

    let (decoded, rate) = decode_audio(&wav).unwrap();
    assert_eq!(rate, SAMPLE_RATE);
    assert_eq!(decoded.len(), samples.len());
    assert_eq!(decoded, utterance.samples_f32());
}

#[test]
fn test_utterance_duration_matches_frames() {
    let config = common::test_config();
    let frames = vec![common::silence_frame(&config); 10];
    let utterance = Utterance::assemble(frames, config.sample_rate).unwrap();

    assert_eq!(utterance.len(), 10 * config.frame_bytes());
    assert_eq!(utterance.duration().as_millis(), 300);
}
