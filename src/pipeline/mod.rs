//! Pipeline orchestration
//!
//! Wires the stages together: plan chunks, transcribe them against
//! the speech-to-text service, merge the per-chunk token streams,
//! segment, correct timing, render. Chunk transcription runs on a
//! bounded worker pool; a single unrecoverable chunk failure abandons
//! the whole run rather than emitting a subtitle file with a silent
//! hole in it.

use crate::audio::{plan_chunks, AudioSource};
use crate::config::Config;
use crate::error::{Result, SubweaveError};
use crate::llm::{with_retries, LanguageModel};
use crate::segmenter::Segmenter;
use crate::srt::{self, SubtitleEntry};
use crate::stt::TranscriptionService;
use crate::timing;
use crate::transcript::{self, ChunkTranscript, Provider, TranscriptStream};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// The finished product of a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub entries: Vec<SubtitleEntry>,
    pub srt: String,
    /// Non-fatal degradations accumulated across all stages
    pub warnings: Vec<String>,
}

pub struct Pipeline {
    stt: Arc<dyn TranscriptionService>,
    llm: Arc<dyn LanguageModel>,
    config: Config,
}

impl Pipeline {
    pub fn new(
        stt: Arc<dyn TranscriptionService>,
        llm: Arc<dyn LanguageModel>,
        config: Config,
    ) -> Self {
        Self { stt, llm, config }
    }

    /// Run the full pipeline over an audio source
    pub async fn generate(&self, source: &dyn AudioSource) -> Result<PipelineOutcome> {
        let chunks = plan_chunks(source, &self.config.chunking);
        info!(
            chunks = chunks.len(),
            duration = source.duration(),
            "transcribing audio"
        );

        // Slices are cut up front so the tasks own plain bytes
        let mut work = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            work.push((chunk.index, chunk.offset, source.slice(chunk.offset, chunk.end())?));
        }

        let raw_responses = self.transcribe_chunks(work).await?;

        let mut warnings = Vec::new();
        let mut chunk_streams = Vec::with_capacity(raw_responses.len());
        for (index, offset, value) in raw_responses {
            let normalized = transcript::normalize(&value, None)?;
            for warning in normalized.warnings {
                warnings.push(format!("chunk {}: {}", index, warning));
            }
            chunk_streams.push(ChunkTranscript {
                index,
                offset,
                stream: normalized.stream,
            });
        }

        let stream = transcript::merge_streams(chunk_streams)?;
        self.finish(stream, warnings).await
    }

    /// Run the pipeline over an already-fetched transcript payload
    pub async fn from_transcript(
        &self,
        value: &serde_json::Value,
        provider: Option<Provider>,
    ) -> Result<PipelineOutcome> {
        let normalized = transcript::normalize(value, provider)?;
        self.finish(normalized.stream, normalized.warnings).await
    }

    /// Dispatch chunk uploads to a bounded pool, abandon on failure
    async fn transcribe_chunks(
        &self,
        work: Vec<(usize, f64, Vec<u8>)>,
    ) -> Result<Vec<(usize, f64, serde_json::Value)>> {
        let semaphore = Arc::new(Semaphore::new(self.config.stt.max_concurrency.max(1)));
        let mut join_set: JoinSet<Result<(usize, f64, serde_json::Value)>> = JoinSet::new();

        for (index, offset, audio) in work {
            let stt = self.stt.clone();
            let retries = self.config.stt.retries;
            let semaphore = semaphore.clone();
            join_set.spawn(async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|e| SubweaveError::Other(format!("worker pool closed: {}", e)))?;
                let value = with_retries("stt", "chunk", index, retries, || {
                    let stt = stt.clone();
                    let audio = audio.clone();
                    async move { stt.transcribe(audio).await }
                })
                .await?;
                Ok((index, offset, value))
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            let result = joined
                .map_err(|e| SubweaveError::Other(format!("chunk task panicked: {}", e)))?;
            match result {
                Ok(item) => results.push(item),
                Err(e) => {
                    warn!(error = %e, "chunk transcription failed, abandoning run");
                    join_set.abort_all();
                    return Err(e);
                }
            }
        }

        results.sort_by_key(|(index, _, _)| *index);
        Ok(results)
    }

    /// Shared tail: segment, correct, render
    async fn finish(
        &self,
        stream: TranscriptStream,
        mut warnings: Vec<String>,
    ) -> Result<PipelineOutcome> {
        let segmenter = Segmenter::new(
            self.llm.clone(),
            self.config.segmenter.clone(),
            self.config.llm.temperature,
            self.config.llm.retries,
        );
        let segmentation = segmenter.segment(&stream).await?;
        warnings.extend(segmentation.warnings);

        let segments = timing::correct(&stream, &segmentation.groups, &self.config.timing)?;
        let entries = srt::entries_from(&stream, &segments, self.config.timing.max_chars_per_line);
        let rendered = srt::render(&entries);
        info!(entries = entries.len(), warnings = warnings.len(), "pipeline finished");

        Ok(PipelineOutcome {
            entries,
            srt: rendered,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{MockAudioSource, SilenceRegion};
    use crate::llm::MockLanguageModel;
    use crate::stt::MockTranscriptionService;
    use serde_json::json;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.chunking.max_chunk_secs = 10.0;
        config.chunking.search_window_secs = 5.0;
        config.segmenter.max_concurrency = 1;
        config.stt.max_concurrency = 1;
        config
    }

    fn pipeline(stt: MockTranscriptionService, llm: MockLanguageModel) -> Pipeline {
        Pipeline::new(Arc::new(stt), Arc::new(llm), test_config())
    }

    #[tokio::test]
    async fn test_single_chunk_end_to_end() {
        let stt = MockTranscriptionService::new().with_response(json!({
            "words": [
                {"text": "Hello", "start": 0.0, "end": 0.4, "type": "word"},
                {"text": "there.", "start": 0.5, "end": 0.9, "type": "word"},
                {"text": "Goodbye", "start": 3.0, "end": 3.4, "type": "word"},
                {"text": "now.", "start": 3.5, "end": 3.9, "type": "word"}
            ]
        }));
        let llm = MockLanguageModel::new()
            .with_response("a short farewell")
            .with_response("Hello there.\nGoodbye now.");
        let source = MockAudioSource {
            duration: 5.0,
            regions: vec![],
        };

        let outcome = pipeline(stt, llm).generate(&source).await.unwrap();

        assert_eq!(outcome.entries.len(), 2);
        assert_eq!(outcome.entries[0].text(), "Hello there.");
        assert_eq!(outcome.entries[1].text(), "Goodbye now.");
        assert!(outcome.srt.starts_with("1\n00:00:00,000 --> "));
    }

    #[tokio::test]
    async fn test_multi_chunk_offsets_merged() {
        // Two chunks, the second offset by the silence cut at 8.0s
        let stt = MockTranscriptionService::new()
            .with_response(json!({
                "words": [{"text": "First.", "start": 0.5, "end": 1.0, "type": "word"}]
            }))
            .with_response(json!({
                "words": [{"text": "Second.", "start": 0.5, "end": 1.0, "type": "word"}]
            }));
        let llm = MockLanguageModel::new()
            .with_response("summary")
            .with_response("First.\nSecond.");
        let source = MockAudioSource {
            duration: 15.0,
            regions: vec![SilenceRegion { start: 7.5, end: 8.5 }],
        };

        let outcome = pipeline(stt, llm).generate(&source).await.unwrap();

        assert_eq!(outcome.entries.len(), 2);
        // Second chunk's token shifted by the 8.0s offset
        assert!((outcome.entries[1].start - 8.5).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunk_failure_abandons_run() {
        let stt = MockTranscriptionService::new()
            .with_failure(SubweaveError::ServiceTimeout {
                service: "stt".to_string(),
                seconds: 1,
            })
            .with_failure(SubweaveError::ServiceTimeout {
                service: "stt".to_string(),
                seconds: 1,
            })
            .with_failure(SubweaveError::ServiceTimeout {
                service: "stt".to_string(),
                seconds: 1,
            });
        let llm = MockLanguageModel::new();
        let source = MockAudioSource {
            duration: 5.0,
            regions: vec![],
        };

        let err = pipeline(stt, llm).generate(&source).await.unwrap_err();
        assert!(matches!(err, SubweaveError::ServiceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_from_transcript_skips_audio() {
        let llm = MockLanguageModel::new()
            .with_response("summary")
            .with_response("Just one line.");
        let pipeline = pipeline(MockTranscriptionService::new(), llm);

        let payload = json!({
            "tokens": [
                {"text": "Just", "start_ms": 0, "end_ms": 300},
                {"text": "one", "start_ms": 400, "end_ms": 600},
                {"text": "line.", "start_ms": 700, "end_ms": 1000}
            ]
        });
        let outcome = pipeline.from_transcript(&payload, None).await.unwrap();

        assert_eq!(outcome.entries.len(), 1);
        assert_eq!(outcome.entries[0].text(), "Just one line.");
    }

    #[tokio::test]
    async fn test_adapter_warnings_surface_in_outcome() {
        let llm = MockLanguageModel::new()
            .with_response("summary")
            .with_response("Hi there.");
        let pipeline = pipeline(MockTranscriptionService::new(), llm);

        let payload = json!({
            "tokens": [
                {"text": "Hi", "start_ms": 0},
                {"text": "there.", "start_ms": 400, "end_ms": 800}
            ]
        });
        let outcome = pipeline.from_transcript(&payload, None).await.unwrap();
        assert!(outcome.warnings.iter().any(|w| w.contains("estimated")));
    }
}
