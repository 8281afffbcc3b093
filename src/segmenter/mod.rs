//! Semantic segmentation
//!
//! Groups the token stream into subtitle-sized pieces using a two
//! phase model protocol. Phase one asks for a short summary of the
//! whole transcript; phase two sends each text window together with
//! that summary and asks for line breaks at natural sentence and
//! semantic boundaries. Window results are reconciled through owned
//! token ranges, event markers are re-attached to their sentences,
//! and any window whose model calls are exhausted degrades to
//! punctuation splitting instead of failing the pipeline.

pub mod align;
pub mod window;

use crate::config::SegmenterConfig;
use crate::error::{Result, SubweaveError};
use crate::llm::{with_retries, LanguageModel};
use crate::transcript::{TokenKind, TranscriptStream};
use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use window::Window;

const SUMMARY_SYSTEM: &str = "You are a transcription assistant. Summarize the transcript \
you are given in two or three sentences, naming the topic, the speakers if identifiable, \
and any recurring terminology. Reply with the summary only.";

const SPLIT_SYSTEM: &str = "You are a subtitle editor. Insert line breaks into the transcript \
excerpt so that each line is one natural sentence or coherent phrase suitable as a subtitle. \
Do not add, remove, translate or reorder any words. Do not break inside a parenthesized \
sound annotation. Reply with the excerpt text only, one segment per line.";

/// Maximum transcript characters included in the summary request
const SUMMARY_EXCERPT_CHARS: usize = 4000;

/// A contiguous run of tokens destined for one subtitle entry
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentGroup {
    pub tokens: Range<usize>,
}

/// The segmenter's output: groups tiling the stream plus warnings
#[derive(Debug, Clone, Default)]
pub struct Segmentation {
    pub groups: Vec<SegmentGroup>,
    pub warnings: Vec<String>,
}

pub struct Segmenter {
    model: Arc<dyn LanguageModel>,
    config: SegmenterConfig,
    temperature: f32,
    retries: u32,
}

/// What one window task produced: model lines, or None after fallback
struct WindowOutcome {
    lines: Option<Vec<String>>,
    warning: Option<String>,
}

impl Segmenter {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        config: SegmenterConfig,
        temperature: f32,
        retries: u32,
    ) -> Self {
        Self {
            model,
            config,
            temperature,
            retries,
        }
    }

    /// Partition the stream into segment groups
    ///
    /// Every token ends up in exactly one group. The only hard
    /// failure is an authentication error from the model service;
    /// all other model failures degrade per window.
    pub async fn segment(&self, stream: &TranscriptStream) -> Result<Segmentation> {
        if stream.is_empty() {
            return Ok(Segmentation::default());
        }

        let windows = window::build_windows(
            stream,
            self.config.window_chars,
            self.config.window_overlap_chars,
        );
        info!(windows = windows.len(), tokens = stream.len(), "segmenting stream");

        let mut warnings = Vec::new();
        let summary = match self.summarize(stream).await {
            Ok(summary) => Some(summary),
            Err(e) if is_fatal(&e) => return Err(e),
            Err(e) => {
                warn!(error = %e, "summary phase failed, continuing without context");
                warnings.push(format!("summary unavailable: {}", e));
                None
            }
        };

        let outcomes = self.run_windows(stream, &windows, summary.as_deref()).await?;

        let mut boundaries: BTreeSet<usize> = BTreeSet::new();
        boundaries.insert(0);
        boundaries.insert(stream.len());

        for (win, outcome) in windows.iter().zip(outcomes) {
            boundaries.insert(win.owned.start);
            if let Some(warning) = outcome.warning {
                warnings.push(warning);
            }
            let cuts = match outcome.lines {
                Some(lines) => align::align_lines(
                    &stream.tokens,
                    win.tokens.clone(),
                    &lines,
                    self.config.alignment_threshold,
                ),
                None => align::punctuation_cuts(
                    &stream.tokens,
                    win.owned.clone(),
                    self.config.window_chars,
                ),
            };
            // Only cuts inside the owned range count
            for cut in cuts {
                if cut > win.owned.start && cut < win.owned.end {
                    boundaries.insert(cut);
                }
            }
        }

        apply_event_rules(stream, &mut boundaries);

        let cuts: Vec<usize> = boundaries.into_iter().collect();
        let groups = cuts
            .windows(2)
            .map(|pair| SegmentGroup {
                tokens: pair[0]..pair[1],
            })
            .collect();

        Ok(Segmentation { groups, warnings })
    }

    async fn summarize(&self, stream: &TranscriptStream) -> Result<String> {
        let text = stream.text();
        let excerpt: String = text.chars().take(SUMMARY_EXCERPT_CHARS).collect();
        let model = self.model.clone();
        let temperature = self.temperature;
        with_retries("llm", "summary", 0, self.retries, || {
            let model = model.clone();
            let excerpt = excerpt.clone();
            async move { model.complete(SUMMARY_SYSTEM, &excerpt, temperature).await }
        })
        .await
    }

    /// Dispatch window requests to a bounded pool, collect by index
    async fn run_windows(
        &self,
        stream: &TranscriptStream,
        windows: &[Window],
        summary: Option<&str>,
    ) -> Result<Vec<WindowOutcome>> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut join_set: JoinSet<Result<(usize, WindowOutcome)>> = JoinSet::new();

        for win in windows {
            let index = win.index;
            let text = win.text(stream);
            let user = match summary {
                Some(summary) => format!("Context summary:\n{}\n\nTranscript excerpt:\n{}", summary, text),
                None => format!("Transcript excerpt:\n{}", text),
            };
            let model = self.model.clone();
            let temperature = self.temperature;
            let retries = self.retries;
            let semaphore = semaphore.clone();

            join_set.spawn(async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|e| SubweaveError::Other(format!("worker pool closed: {}", e)))?;

                let result = with_retries("llm", "window", index, retries, || {
                    let model = model.clone();
                    let user = user.clone();
                    let text = text.clone();
                    async move {
                        let response = model.complete(SPLIT_SYSTEM, &user, temperature).await?;
                        parse_split_response(&response, &text)
                    }
                })
                .await;

                let outcome = match result {
                    Ok(lines) => WindowOutcome {
                        lines: Some(lines),
                        warning: None,
                    },
                    Err(e) if is_fatal(&e) => return Err(e),
                    Err(e) => {
                        warn!(window = index, error = %e, "window degraded to punctuation split");
                        WindowOutcome {
                            lines: None,
                            warning: Some(format!(
                                "window {} degraded to punctuation split: {}",
                                index, e
                            )),
                        }
                    }
                };
                Ok((index, outcome))
            });
        }

        let mut slots: Vec<Option<WindowOutcome>> = Vec::new();
        slots.resize_with(windows.len(), || None);
        while let Some(joined) = join_set.join_next().await {
            let (index, outcome) =
                joined.map_err(|e| SubweaveError::Other(format!("window task panicked: {}", e)))??;
            slots[index] = Some(outcome);
        }

        let mut outcomes = Vec::with_capacity(slots.len());
        for (index, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(outcome) => outcomes.push(outcome),
                None => {
                    return Err(SubweaveError::Other(format!(
                        "window {} produced no result",
                        index
                    )));
                }
            }
        }
        Ok(outcomes)
    }
}

fn is_fatal(error: &SubweaveError) -> bool {
    matches!(error, SubweaveError::AuthFailed { .. })
}

/// Validate and split a model response into segment lines
///
/// The response must echo the excerpt text closely; a response that
/// diverges too far is malformed and goes back through the retry
/// budget rather than producing nonsense boundaries.
fn parse_split_response(response: &str, sent_text: &str) -> Result<Vec<String>> {
    let lines: Vec<String> = response
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();
    if lines.is_empty() {
        return Err(SubweaveError::MalformedResponse {
            service: "llm".to_string(),
            message: "split response was empty".to_string(),
        });
    }

    let echoed = lines.join(" ");
    let fidelity = align::similarity(&echoed, sent_text);
    if fidelity < 0.5 {
        return Err(SubweaveError::MalformedResponse {
            service: "llm".to_string(),
            message: format!("split response diverged from excerpt (similarity {:.2})", fidelity),
        });
    }
    debug!(lines = lines.len(), fidelity, "parsed split response");
    Ok(lines)
}

/// Enforce event-marker grouping rules on the boundary set
///
/// A run of two or more consecutive event tokens becomes its own
/// group: interior boundaries are removed and edge boundaries added.
/// A lone event token never stands alone: the boundary joining it to
/// the preceding group is removed, or the following one when it is
/// the first token.
fn apply_event_rules(stream: &TranscriptStream, boundaries: &mut BTreeSet<usize>) {
    let n = stream.len();
    let is_event = |i: usize| stream.tokens[i].kind == TokenKind::Event;

    // Maximal runs of consecutive event tokens
    let mut runs: Vec<Range<usize>> = Vec::new();
    let mut i = 0;
    while i < n {
        if is_event(i) {
            let start = i;
            while i < n && is_event(i) {
                i += 1;
            }
            runs.push(start..i);
        } else {
            i += 1;
        }
    }

    for run in &runs {
        if run.len() >= 2 {
            for inner in run.start + 1..run.end {
                boundaries.remove(&inner);
            }
            if run.start > 0 {
                boundaries.insert(run.start);
            }
            if run.end < n {
                boundaries.insert(run.end);
            }
        }
    }

    for run in &runs {
        if run.len() != 1 {
            continue;
        }
        let idx = run.start;
        // Already attached to spoken text on either side
        let detached = boundaries.contains(&idx) && boundaries.contains(&(idx + 1));
        if !detached {
            continue;
        }
        let prev_is_event_run = idx > 0 && is_event(idx - 1);
        let next_is_event_run = idx + 1 < n && is_event(idx + 1);
        if idx > 0 && !prev_is_event_run {
            boundaries.remove(&idx);
        } else if idx + 1 < n && !next_is_event_run {
            boundaries.remove(&(idx + 1));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLanguageModel;
    use crate::transcript::Token;

    fn segmenter(model: MockLanguageModel) -> Segmenter {
        Segmenter::new(Arc::new(model), SegmenterConfig::default(), 0.3, 2)
    }

    fn sentence_stream() -> TranscriptStream {
        TranscriptStream::new(vec![
            Token::word("Hello", 0.0, 0.4),
            Token::word("there.", 0.5, 0.9),
            Token::word("How", 1.0, 1.3),
            Token::word("are", 1.4, 1.6),
            Token::word("you?", 1.7, 2.0),
        ])
    }

    fn assert_tiles(groups: &[SegmentGroup], len: usize) {
        assert_eq!(groups.first().unwrap().tokens.start, 0);
        assert_eq!(groups.last().unwrap().tokens.end, len);
        for pair in groups.windows(2) {
            assert_eq!(pair[0].tokens.end, pair[1].tokens.start);
        }
    }

    #[tokio::test]
    async fn test_segments_follow_model_lines() {
        let model = MockLanguageModel::new()
            .with_response("a talk about greetings")
            .with_response("Hello there.\nHow are you?");
        let result = segmenter(model).segment(&sentence_stream()).await.unwrap();

        assert_eq!(result.groups.len(), 2);
        assert_eq!(result.groups[0].tokens, 0..2);
        assert_eq!(result.groups[1].tokens, 2..5);
        assert!(result.warnings.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_summary_failure_is_not_fatal() {
        let model = MockLanguageModel::new()
            .with_failure(SubweaveError::QuotaExceeded { service: "llm".to_string() })
            .with_failure(SubweaveError::QuotaExceeded { service: "llm".to_string() })
            .with_response("Hello there.\nHow are you?");
        let result = segmenter(model).segment(&sentence_stream()).await.unwrap();

        assert_eq!(result.groups.len(), 2);
        assert!(result.warnings.iter().any(|w| w.contains("summary")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_failure_falls_back_to_punctuation() {
        // Summary succeeds, then both split attempts fail
        let model = MockLanguageModel::new()
            .with_response("summary")
            .with_failure(SubweaveError::ServiceTimeout { service: "llm".to_string(), seconds: 1 })
            .with_failure(SubweaveError::ServiceTimeout { service: "llm".to_string(), seconds: 1 });
        let result = segmenter(model).segment(&sentence_stream()).await.unwrap();

        // Punctuation fallback still cuts after "there."
        assert_eq!(result.groups.len(), 2);
        assert_eq!(result.groups[0].tokens, 0..2);
        assert!(result.warnings.iter().any(|w| w.contains("degraded")));
        assert_tiles(&result.groups, 5);
    }

    #[tokio::test]
    async fn test_auth_failure_is_fatal() {
        let model = MockLanguageModel::new().with_failure(SubweaveError::AuthFailed {
            service: "llm".to_string(),
            message: "bad key".to_string(),
        });
        let err = segmenter(model).segment(&sentence_stream()).await.unwrap_err();
        assert!(matches!(err, SubweaveError::AuthFailed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_divergent_response_retried_then_degraded() {
        let model = MockLanguageModel::new()
            .with_response("summary")
            .with_response("completely unrelated nonsense xyzzy")
            .with_response("more unrelated nonsense plugh");
        let result = segmenter(model).segment(&sentence_stream()).await.unwrap();

        assert!(result.warnings.iter().any(|w| w.contains("degraded")));
        assert_tiles(&result.groups, 5);
    }

    #[tokio::test]
    async fn test_lone_event_attaches_to_previous_sentence() {
        let stream = TranscriptStream::new(vec![
            Token::word("Funny.", 0.0, 0.5),
            Token::event("(laughter)", 0.6, 1.5),
            Token::word("Anyway.", 1.6, 2.1),
        ]);
        let model = MockLanguageModel::new()
            .with_response("summary")
            .with_response("Funny.\n(laughter)\nAnyway.");
        let result = segmenter(model).segment(&stream).await.unwrap();

        assert_eq!(result.groups.len(), 2);
        assert_eq!(result.groups[0].tokens, 0..2);
        assert_tiles(&result.groups, 3);
    }

    #[tokio::test]
    async fn test_leading_event_attaches_forward() {
        let stream = TranscriptStream::new(vec![
            Token::event("(music)", 0.0, 2.0),
            Token::word("Welcome.", 2.1, 2.6),
        ]);
        let model = MockLanguageModel::new()
            .with_response("summary")
            .with_response("(music)\nWelcome.");
        let result = segmenter(model).segment(&stream).await.unwrap();

        assert_eq!(result.groups.len(), 1);
        assert_eq!(result.groups[0].tokens, 0..2);
    }

    #[tokio::test]
    async fn test_consecutive_events_form_own_group() {
        let stream = TranscriptStream::new(vec![
            Token::word("Watch.", 0.0, 0.5),
            Token::event("(applause)", 0.6, 2.0),
            Token::event("(cheering)", 2.0, 3.5),
            Token::word("Thanks.", 3.6, 4.1),
        ]);
        let model = MockLanguageModel::new()
            .with_response("summary")
            .with_response("Watch. (applause)\n(cheering) Thanks.");
        let result = segmenter(model).segment(&stream).await.unwrap();

        assert_eq!(result.groups.len(), 3);
        assert_eq!(result.groups[1].tokens, 1..3);
        assert_tiles(&result.groups, 4);
    }

    #[tokio::test]
    async fn test_empty_stream() {
        let model = MockLanguageModel::new();
        let result = segmenter(model).segment(&TranscriptStream::default()).await.unwrap();
        assert!(result.groups.is_empty());
    }
}
