//! Capture session integration tests
//!
//! Drives the state machine and full recording sessions with scripted
//! frames, so no audio hardware is needed.

use std::time::Duration;

use sottovoce::voice::{AudioFrame, CaptureOutcome, CapturePhase, CaptureState, Recorder};
use sottovoce::Error;

mod common;

use common::{
    EnergyClassifier, Script, ScriptedInput, config_with_threshold, silence_frame, speech_frame,
    test_config,
};

/// Feed frames one by one, returning the phase after each
fn run_frames(state: &mut CaptureState, frames: Vec<AudioFrame>) -> Vec<CapturePhase> {
    let config = test_config();
    let mut classifier = EnergyClassifier::new(&config);
    frames
        .into_iter()
        .map(|frame| state.process(frame, &mut classifier).unwrap())
        .collect()
}

fn concat(frames: &[AudioFrame]) -> Vec<u8> {
    frames.iter().flat_map(|f| f.as_bytes().to_vec()).collect()
}

// ── State machine properties ────────────────────────────────────────────

#[test]
fn test_no_speech_yields_no_utterance() {
    let config = test_config();
    let mut state = CaptureState::new(&config);

    let phases = run_frames(&mut state, vec![silence_frame(&config); 100]);

    assert!(phases.iter().all(|p| *p == CapturePhase::Idle));
    assert!(!state.started());
    assert!(!state.should_stop());
    assert!(state.frames().is_empty());
    assert!(state.into_utterance().is_none());
}

#[test]
fn test_onset_frame_and_earlier_frames_excluded() {
    let config = test_config();
    for onset in 0..4_usize {
        let mut state = CaptureState::new(&config);
        let mut frames = vec![silence_frame(&config); onset];
        // Distinct levels so each frame is identifiable
        let speech: Vec<AudioFrame> = (1..=3).map(|level| speech_frame(&config, level)).collect();
        frames.extend(speech.iter().cloned());

        run_frames(&mut state, frames);

        assert_eq!(state.frames(), &speech[1..], "onset at {onset}");
    }
}

#[test]
fn test_silence_count_resets_on_speech() {
    let config = test_config();
    let mut state = CaptureState::new(&config);

    run_frames(
        &mut state,
        vec![
            speech_frame(&config, 100),
            silence_frame(&config),
            silence_frame(&config),
            silence_frame(&config),
        ],
    );
    assert_eq!(state.silence_count(), 3);
    assert!(!state.should_stop());

    run_frames(&mut state, vec![speech_frame(&config, 100)]);
    assert_eq!(state.silence_count(), 0);

    run_frames(&mut state, vec![silence_frame(&config); 3]);
    assert_eq!(state.silence_count(), 3);
    assert!(!state.should_stop());
}

#[test]
fn test_stop_boundary_for_each_threshold() {
    for threshold in 0..=6_u32 {
        let config = config_with_threshold(threshold);
        let mut classifier = EnergyClassifier::new(&config);
        let mut state = CaptureState::new(&config);

        state
            .process(speech_frame(&config, 500), &mut classifier)
            .unwrap();

        for silent in 1..=threshold + 1 {
            let phase = state
                .process(silence_frame(&config), &mut classifier)
                .unwrap();
            if silent <= threshold {
                assert_eq!(
                    phase,
                    CapturePhase::Listening,
                    "threshold {threshold}, silent frame {silent}"
                );
            } else {
                assert_eq!(
                    phase,
                    CapturePhase::Stopped,
                    "threshold {threshold}, silent frame {silent}"
                );
            }
        }

        assert_eq!(state.silence_count(), threshold as usize + 1);
        assert_eq!(state.frames().len(), threshold as usize + 1);
    }
}

#[test]
fn test_utterance_preserves_arrival_order() {
    let config = test_config();
    let mut state = CaptureState::new(&config);

    let body: Vec<AudioFrame> = vec![
        speech_frame(&config, 10),
        speech_frame(&config, 20),
        silence_frame(&config),
        speech_frame(&config, 30),
    ];
    let mut frames = vec![speech_frame(&config, 1)];
    frames.extend(body.iter().cloned());
    run_frames(&mut state, frames);

    let utterance = state.into_utterance().unwrap();
    assert_eq!(utterance.as_bytes(), concat(&body).as_slice());
    assert_eq!(utterance.sample_rate(), 16000);
}

#[test]
fn test_scenario_a_state_machine() {
    let config = test_config();
    let mut state = CaptureState::new(&config);

    let phases = run_frames(
        &mut state,
        vec![
            silence_frame(&config),
            silence_frame(&config),
            speech_frame(&config, 800),
            silence_frame(&config),
            silence_frame(&config),
            silence_frame(&config),
            silence_frame(&config),
        ],
    );

    assert_eq!(
        phases,
        vec![
            CapturePhase::Idle,
            CapturePhase::Idle,
            CapturePhase::Listening,
            CapturePhase::Listening,
            CapturePhase::Listening,
            CapturePhase::Listening,
            CapturePhase::Stopped,
        ]
    );
    assert_eq!(state.frames().len(), 4);
    assert!(state.frames().iter().all(|f| *f == silence_frame(&config)));
}

#[test]
fn test_frames_after_stop_are_not_classified() {
    let config = config_with_threshold(0);
    let mut classifier = EnergyClassifier::new(&config);
    let mut state = CaptureState::new(&config);

    for frame in [
        speech_frame(&config, 1),
        silence_frame(&config),
        speech_frame(&config, 2),
        speech_frame(&config, 3),
    ] {
        state.process(frame, &mut classifier).unwrap();
    }

    assert_eq!(classifier.calls(), 2);
    assert_eq!(state.frames().len(), 1);
    assert_eq!(state.phase(), CapturePhase::Stopped);
}

// ── Recording sessions ──────────────────────────────────────────────────

#[tokio::test]
async fn test_scenario_a_session() {
    let config = test_config();
    let mut frames = vec![
        silence_frame(&config),
        silence_frame(&config),
        speech_frame(&config, 800),
    ];
    frames.extend(vec![silence_frame(&config); 4]);
    // Delivered after the stop; must not reach the utterance
    frames.push(speech_frame(&config, 900));

    let input = ScriptedInput::new(Script::Frames(frames));
    let device = input.device();
    let classifier = EnergyClassifier::new(&config);
    let recorder = Recorder::new(input, config).unwrap();

    let outcome = recorder.record_with(classifier.clone()).await.unwrap();

    let utterance = outcome.into_utterance().unwrap();
    assert_eq!(utterance.len(), 4 * config.frame_bytes());
    assert!(utterance.as_bytes().iter().all(|b| *b == 0));
    assert_eq!(classifier.calls(), 7);
    assert_eq!(device.delivered(), 8);
    assert!(device.released());
}

#[tokio::test]
async fn test_scenario_b_session_runs_until_timeout() {
    let config = test_config();
    let input = ScriptedInput::new(Script::Frames(vec![silence_frame(&config); 50]));
    let device = input.device();
    let classifier = EnergyClassifier::new(&config);
    let recorder = Recorder::new(input, config)
        .unwrap()
        .with_listen_timeout(Some(Duration::from_millis(50)));

    let outcome = recorder.record_with(classifier.clone()).await.unwrap();

    assert!(matches!(outcome, CaptureOutcome::NoSpeech));
    assert_eq!(classifier.calls(), 50);
    assert!(device.released());
}

#[tokio::test]
async fn test_scenario_b_session_is_unbounded_by_default() {
    let config = test_config();
    let input = ScriptedInput::new(Script::Frames(vec![silence_frame(&config); 10]));
    let device = input.device();
    let recorder = Recorder::new(input, config).unwrap();

    let session = recorder.record_with(EnergyClassifier::new(&config));
    let result = tokio::time::timeout(Duration::from_millis(100), session).await;

    assert!(result.is_err(), "session should still be listening");
    // Cancelling the session drops the device guard
    assert!(device.released());
}

#[tokio::test]
async fn test_scenario_c_open_failure() {
    let config = test_config();
    let input = ScriptedInput::new(Script::OpenFails("no microphone".to_string()));
    let device = input.device();
    let classifier = EnergyClassifier::new(&config);
    let recorder = Recorder::new(input, config).unwrap();

    let outcome = recorder.record_with(classifier.clone()).await.unwrap();

    match outcome {
        CaptureOutcome::DeviceUnavailable(reason) => assert!(reason.contains("no microphone")),
        other => panic!("expected DeviceUnavailable, got {other:?}"),
    }
    assert_eq!(device.opened(), 0);
    assert_eq!(classifier.calls(), 0);
}

#[tokio::test]
async fn test_device_failure_mid_stream() {
    let config = test_config();
    let frames = vec![speech_frame(&config, 400), speech_frame(&config, 400)];
    let input = ScriptedInput::new(Script::FramesThenFail(frames, "unplugged".to_string()));
    let device = input.device();
    let recorder = Recorder::new(input, config).unwrap();

    let outcome = recorder
        .record_with(EnergyClassifier::new(&config))
        .await
        .unwrap();

    assert!(matches!(outcome, CaptureOutcome::DeviceUnavailable(ref r) if r == "unplugged"));
    assert!(outcome.into_utterance().is_none());
    assert!(device.released());
}

#[tokio::test]
async fn test_scenario_d_invalid_frame() {
    let config = test_config();
    let frames = vec![
        speech_frame(&config, 300),
        speech_frame(&config, 300),
        AudioFrame::from_bytes(vec![0; 100]),
        silence_frame(&config),
    ];
    let input = ScriptedInput::new(Script::Frames(frames));
    let device = input.device();
    let recorder = Recorder::new(input, config).unwrap();

    let err = recorder
        .record_with(EnergyClassifier::new(&config))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::InvalidFrame {
            expected: 960,
            actual: 100
        }
    ));
    assert!(device.released());
}

#[test]
fn test_recorder_rejects_invalid_config() {
    let mut config = test_config();
    config.sample_rate = 44100;

    let result = Recorder::new(ScriptedInput::new(Script::Frames(Vec::new())), config);
    assert!(matches!(result, Err(Error::Config(_))));
}
