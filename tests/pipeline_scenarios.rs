//! End-to-end pipeline scenarios against scripted services.

use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use subweave::audio::WavSource;
use subweave::config::Config;
use subweave::error::SubweaveError;
use subweave::llm::LanguageModel;
use subweave::pipeline::Pipeline;
use subweave::srt;
use subweave::stt::TranscriptionService;
use subweave::Result;

/// Language model that replays a fixed response script.
struct ScriptedLlm {
    responses: Mutex<VecDeque<Result<String>>>,
}

impl ScriptedLlm {
    fn new(script: Vec<Result<String>>) -> Self {
        Self {
            responses: Mutex::new(script.into_iter().collect()),
        }
    }
}

#[async_trait]
impl LanguageModel for ScriptedLlm {
    async fn complete(&self, _system: &str, _user: &str, _temperature: f32) -> Result<String> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(String::new()))
    }
}

/// Transcription service that replays fixed provider payloads.
struct ScriptedStt {
    responses: Mutex<VecDeque<Result<serde_json::Value>>>,
}

impl ScriptedStt {
    fn new(script: Vec<Result<serde_json::Value>>) -> Self {
        Self {
            responses: Mutex::new(script.into_iter().collect()),
        }
    }
}

#[async_trait]
impl TranscriptionService for ScriptedStt {
    async fn transcribe(&self, _audio: Vec<u8>) -> Result<serde_json::Value> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(json!({ "words": [] })))
    }
}

fn timeout() -> SubweaveError {
    SubweaveError::ServiceTimeout {
        service: "llm".to_string(),
        seconds: 1,
    }
}

/// 16kHz mono source: speech with one silent second in the middle.
fn two_part_source() -> WavSource {
    const RATE: u32 = 16_000;
    let tone = |secs: f64| -> Vec<f32> {
        (0..(secs * RATE as f64) as usize)
            .map(|i| 0.4 * (i as f32 * 0.25).sin())
            .collect()
    };
    let mut samples = tone(6.0);
    samples.extend(vec![0.0f32; RATE as usize]);
    samples.extend(tone(6.0));
    WavSource::from_samples(samples, RATE, -40.0, 0.5)
}

fn small_chunk_config() -> Config {
    let mut config = Config::default();
    config.chunking.max_chunk_secs = 8.0;
    config.chunking.search_window_secs = 4.0;
    config.segmenter.max_concurrency = 1;
    config.stt.max_concurrency = 1;
    config.llm.retries = 3;
    config.stt.retries = 3;
    config
}

#[tokio::test]
async fn chunked_audio_produces_contiguous_timeline() {
    // 13s of audio with an 8s ceiling splits at the silence midpoint
    let stt = ScriptedStt::new(vec![
        Ok(json!({
            "words": [
                {"text": "First", "start": 1.0, "end": 1.4, "type": "word"},
                {"text": "part.", "start": 1.5, "end": 2.0, "type": "word"}
            ]
        })),
        Ok(json!({
            "words": [
                {"text": "Second", "start": 0.5, "end": 0.9, "type": "word"},
                {"text": "part.", "start": 1.0, "end": 1.5, "type": "word"}
            ]
        })),
    ]);
    let llm = ScriptedLlm::new(vec![
        Ok("two short remarks".to_string()),
        Ok("First part.\nSecond part.".to_string()),
    ]);
    let pipeline = Pipeline::new(Arc::new(stt), Arc::new(llm), small_chunk_config());

    let outcome = pipeline.generate(&two_part_source()).await.unwrap();

    assert_eq!(outcome.entries.len(), 2);
    // The cut lands in the silence around 6.5s, so the second
    // chunk's tokens are shifted past it
    assert!(outcome.entries[1].start > 6.0);
    assert!(outcome.entries[0].end < outcome.entries[1].start);

    let reparsed = srt::parse(&outcome.srt).unwrap();
    assert_eq!(reparsed.len(), 2);
    assert_eq!(reparsed[0].text(), "First part.");
}

#[tokio::test(start_paused = true)]
async fn window_retry_exhaustion_still_renders_complete_file() {
    // Summary succeeds; the split call times out through the whole
    // retry budget and the window degrades to punctuation splitting
    let llm = ScriptedLlm::new(vec![
        Ok("summary".to_string()),
        Err(timeout()),
        Err(timeout()),
        Err(timeout()),
    ]);
    let pipeline = Pipeline::new(
        Arc::new(ScriptedStt::new(vec![])),
        Arc::new(llm),
        small_chunk_config(),
    );

    let payload = json!({
        "tokens": [
            {"text": "One", "start_ms": 0, "end_ms": 300},
            {"text": "sentence.", "start_ms": 400, "end_ms": 900},
            {"text": "Another", "start_ms": 3000, "end_ms": 3400},
            {"text": "one.", "start_ms": 3500, "end_ms": 3900}
        ]
    });
    let outcome = pipeline.from_transcript(&payload, None).await.unwrap();

    assert_eq!(outcome.entries.len(), 2);
    assert_eq!(outcome.entries[0].text(), "One sentence.");
    assert_eq!(outcome.entries[1].text(), "Another one.");
    assert!(outcome.warnings.iter().any(|w| w.contains("degraded")));

    // Gap invariant holds across the degraded output
    let gap = 0.1;
    for pair in outcome.entries.windows(2) {
        assert!(pair[0].end <= pair[1].start - gap + 1e-6);
    }
}

#[tokio::test]
async fn lone_event_marker_never_stands_alone() {
    let llm = ScriptedLlm::new(vec![
        Ok("summary".to_string()),
        // The model wrongly isolates the marker on its own line
        Ok("That was funny.\n(laughter)\nMoving on.".to_string()),
    ]);
    let pipeline = Pipeline::new(
        Arc::new(ScriptedStt::new(vec![])),
        Arc::new(llm),
        small_chunk_config(),
    );

    let payload = json!({
        "words": [
            {"text": "That", "start": 0.0, "end": 0.3, "type": "word"},
            {"text": "was", "start": 0.4, "end": 0.6, "type": "word"},
            {"text": "funny.", "start": 0.7, "end": 1.1, "type": "word"},
            {"text": "[laughter]", "start": 1.2, "end": 2.8, "type": "audio_event"},
            {"text": "Moving", "start": 4.0, "end": 4.3, "type": "word"},
            {"text": "on.", "start": 4.4, "end": 4.7, "type": "word"}
        ]
    });
    let outcome = pipeline.from_transcript(&payload, None).await.unwrap();

    assert_eq!(outcome.entries.len(), 2);
    assert_eq!(outcome.entries[0].text(), "That was funny. (laughter)");
    assert_eq!(outcome.entries[1].text(), "Moving on.");
}

#[tokio::test]
async fn minimum_duration_yields_to_gap_rule() {
    let mut config = small_chunk_config();
    config.timing.gap_ms = 80;
    let llm = ScriptedLlm::new(vec![
        Ok("summary".to_string()),
        Ok("Hello.\nWorld.".to_string()),
    ]);
    let pipeline = Pipeline::new(Arc::new(ScriptedStt::new(vec![])), Arc::new(llm), config);

    let payload = json!({
        "tokens": [
            {"text": "Hello.", "start_ms": 0, "end_ms": 400},
            {"text": "World.", "start_ms": 500, "end_ms": 900}
        ]
    });
    let outcome = pipeline.from_transcript(&payload, None).await.unwrap();

    assert_eq!(outcome.entries.len(), 2);
    // Entry 1 wants 1.2s but must stop 80ms before entry 2
    assert!((outcome.entries[0].end - 0.42).abs() < 1e-9);
    // Entry 2 has room and extends to the minimum
    assert!((outcome.entries[1].end - 1.7).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn failed_chunk_abandons_whole_run() {
    let stt = ScriptedStt::new(vec![
        Err(timeout()),
        Err(timeout()),
        Err(timeout()),
    ]);
    let llm = ScriptedLlm::new(vec![]);
    let pipeline = Pipeline::new(Arc::new(stt), Arc::new(llm), small_chunk_config());

    let err = pipeline.generate(&two_part_source()).await.unwrap_err();
    assert!(matches!(err, SubweaveError::ServiceUnavailable { .. }));
}

#[tokio::test]
async fn unknown_transcript_shape_is_schema_error() {
    let pipeline = Pipeline::new(
        Arc::new(ScriptedStt::new(vec![])),
        Arc::new(ScriptedLlm::new(vec![])),
        small_chunk_config(),
    );
    let err = pipeline
        .from_transcript(&json!({"transcript": "plain text"}), None)
        .await
        .unwrap_err();
    assert!(matches!(err, SubweaveError::Schema { .. }));
}
