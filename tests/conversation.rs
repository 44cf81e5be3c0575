//! Conversation loop tests
//!
//! Runs the full loop over scripted recording sessions with in-process
//! transcriber and model stand-ins.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use sottovoce::app::run_with;
use sottovoce::db::{self, MemoryManager};
use sottovoce::llm::{ChatModel, Completion};
use sottovoce::voice::{AudioFrame, Recorder, Transcriber, Utterance};
use sottovoce::{Conversation, Error, Result, SessionLogger};

mod common;

use common::{EnergyClassifier, Script, ScriptedInput, silence_frame, speech_frame, test_config};

#[derive(Clone, Default)]
struct CountingTranscriber {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Transcriber for CountingTranscriber {
    async fn transcribe(&self, _utterance: &Utterance) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("hello".to_string())
    }
}

struct FixedModel;

#[async_trait]
impl ChatModel for FixedModel {
    async fn complete(&self, _prompt: &str) -> Result<Completion> {
        Ok(Completion {
            content: "hi there".to_string(),
            usage: None,
        })
    }
}

fn conversation(dir: &std::path::Path, transcriber: CountingTranscriber) -> Conversation {
    let log = SessionLogger::with_filename(dir, "session_test.log").unwrap();
    let memory = MemoryManager::new(db::init_memory().unwrap(), log.session_id(), 12);
    Conversation::new(
        Box::new(transcriber),
        Box::new(FixedModel),
        memory,
        log,
        4096,
        "Summarise.",
    )
}

#[tokio::test]
async fn test_loop_survives_bad_frame_and_device_loss() {
    let config = test_config();
    let utterance_frames = {
        let mut frames = vec![speech_frame(&config, 300), speech_frame(&config, 300)];
        frames.extend(vec![silence_frame(&config); 4]);
        frames
    };
    let input = ScriptedInput::sessions(vec![
        Script::Frames(vec![
            speech_frame(&config, 300),
            speech_frame(&config, 300),
            AudioFrame::from_bytes(vec![0; 100]),
        ]),
        Script::Frames(utterance_frames),
        Script::OpenFails("no microphone".to_string()),
    ]);
    let device = input.device();
    let recorder = Recorder::new(input, config).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let transcriber = CountingTranscriber::default();
    let mut conv = conversation(dir.path(), transcriber.clone());

    // Three sessions, then the classifier can no longer be built
    let mut sessions = 0;
    let retry = Duration::from_millis(50);
    let started = Instant::now();
    let result = run_with(&recorder, &mut conv, retry, || {
        sessions += 1;
        if sessions > 3 {
            Err(Error::Vad("classifier unavailable".to_string()))
        } else {
            Ok(EnergyClassifier::new(&config))
        }
    })
    .await;

    assert!(matches!(result, Err(Error::Vad(ref msg)) if msg == "classifier unavailable"));
    assert_eq!(sessions, 4);
    assert_eq!(device.opened(), 2);
    assert!(device.released());
    assert!(started.elapsed() >= retry);

    // Only the middle session produced a turn
    assert_eq!(transcriber.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        conv.memory().build_context_prompt("bye").unwrap(),
        "User: hello\nAssistant: hi there\nUser: bye"
    );
}

#[tokio::test]
async fn test_loop_stops_when_classifier_cannot_be_built() {
    let config = test_config();
    let input = ScriptedInput::new(Script::Frames(vec![speech_frame(&config, 300)]));
    let device = input.device();
    let recorder = Recorder::new(input, config).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let transcriber = CountingTranscriber::default();
    let mut conv = conversation(dir.path(), transcriber.clone());

    let result = run_with(&recorder, &mut conv, Duration::ZERO, || {
        Err::<EnergyClassifier, _>(Error::Config("bad aggressiveness".to_string()))
    })
    .await;

    assert!(matches!(result, Err(Error::Config(_))));
    assert_eq!(device.opened(), 0);
    assert_eq!(transcriber.calls.load(Ordering::SeqCst), 0);
}
