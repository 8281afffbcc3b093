//! Timestamp correction
//!
//! Raw token times make poor subtitle times: a trailing pause or one
//! mistimed interjection can stretch an entry over silence, and short
//! entries flash by too fast to read. Correction derives each group's
//! start and end from its tokens, then applies the repair rules in a
//! fixed order. The inter-entry gap always wins over the minimum
//! duration rule, so two entries never overlap.

use crate::config::TimingConfig;
use crate::error::{Result, SubweaveError};
use crate::segmenter::SegmentGroup;
use crate::transcript::{TokenKind, TranscriptStream};
use std::ops::Range;
use tracing::debug;

/// A segment group with corrected display times
#[derive(Debug, Clone, PartialEq)]
pub struct TimedSegment {
    pub tokens: Range<usize>,
    pub start: f64,
    pub end: f64,
}

impl TimedSegment {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

const EPSILON: f64 = 1e-6;

/// Derive and correct display times for each segment group
///
/// Empty groups are dropped. Groups consisting only of event markers
/// keep their raw token times, since the marker's span reflects the
/// real sound duration. The result always satisfies [`validate`].
pub fn correct(
    stream: &TranscriptStream,
    groups: &[SegmentGroup],
    config: &TimingConfig,
) -> Result<Vec<TimedSegment>> {
    let gap = config.gap_secs();

    let mut segments: Vec<TimedSegment> = Vec::with_capacity(groups.len());
    for group in groups {
        if group.tokens.is_empty() {
            continue;
        }
        let tokens = &stream.tokens[group.tokens.clone()];
        let first = &tokens[0];
        let last = &tokens[tokens.len() - 1];
        segments.push(TimedSegment {
            tokens: group.tokens.clone(),
            start: first.start,
            end: last.end.max(first.start),
        });
    }

    for i in 0..segments.len() {
        let tokens = &stream.tokens[segments[i].tokens.clone()];
        let event_only = tokens.iter().all(|t| t.kind == TokenKind::Event);
        if event_only {
            continue;
        }

        let segment = &mut segments[i];
        collapse_trailing_gap(segment, tokens, config);
        exclude_outlier_end(segment, tokens, config);
    }

    // Duration bounds, looked ahead against the next segment's start
    for i in 0..segments.len() {
        let next_start = segments.get(i + 1).map(|s| s.start);
        let tokens = &stream.tokens[segments[i].tokens.clone()];
        let event_only = tokens.iter().all(|t| t.kind == TokenKind::Event);
        let segment = &mut segments[i];

        if !event_only {
            if segment.duration() < config.min_duration_secs {
                let mut extended = segment.start + config.min_duration_secs;
                if let Some(next_start) = next_start {
                    extended = extended.min(next_start - gap);
                }
                if extended > segment.end {
                    debug!(index = i, end = extended, "extended short entry");
                }
                segment.end = segment.end.max(extended);
            }
            if segment.duration() > config.max_duration_secs {
                segment.end = segment.start + config.max_duration_secs;
            }
        }

        // The gap rule is absolute, whatever the rules above decided
        if let Some(next_start) = next_start
            && segment.end > next_start - gap
        {
            segment.end = next_start - gap;
        }
    }

    validate(&segments, config)?;
    Ok(segments)
}

/// Rule 1: clamp an end that trails the last spoken content too far
///
/// Event markers count as content here; their span reflects a real
/// sound, unlike a punctuation token stretched over a pause.
fn collapse_trailing_gap(
    segment: &mut TimedSegment,
    tokens: &[crate::transcript::Token],
    config: &TimingConfig,
) {
    let Some(last_word_end) = tokens
        .iter()
        .rev()
        .find(|t| t.kind != TokenKind::Punctuation)
        .map(|t| t.end)
    else {
        return;
    };
    if segment.end - last_word_end > config.trailing_gap_secs {
        segment.end = last_word_end + config.correction_padding_secs;
    }
}

/// Rule 2: cap the contribution of a mistimed final interjection
///
/// A final one-word token whose measured duration dwarfs both its
/// neighbors and the outlier threshold is a provider artifact, not a
/// slow word. Its end contribution is capped at the larger of the
/// neighbor average and the threshold.
fn exclude_outlier_end(
    segment: &mut TimedSegment,
    tokens: &[crate::transcript::Token],
    config: &TimingConfig,
) {
    if tokens.len() < 2 {
        return;
    }
    let last = &tokens[tokens.len() - 1];
    if last.kind != TokenKind::Word || (segment.end - last.end).abs() > EPSILON {
        return;
    }

    let rest = &tokens[..tokens.len() - 1];
    let word_durations: Vec<f64> = rest
        .iter()
        .filter(|t| t.kind == TokenKind::Word)
        .map(|t| t.duration())
        .collect();
    if word_durations.is_empty() {
        return;
    }
    let neighbor_avg = word_durations.iter().sum::<f64>() / word_durations.len() as f64;

    let duration = last.duration();
    if duration > config.outlier_duration_secs && duration > 3.0 * neighbor_avg {
        let capped = last.start + neighbor_avg.max(config.outlier_duration_secs);
        debug!(from = segment.end, to = capped, "capped outlier final token");
        segment.end = capped;
    }
}

/// Check the post-correction invariants
///
/// Every segment must have positive duration and leave at least the
/// configured gap before its successor. A violation here means the
/// configuration conflicts with the content, for example a minimum
/// gap wider than the space between two groups of tokens.
pub fn validate(segments: &[TimedSegment], config: &TimingConfig) -> Result<()> {
    let gap = config.gap_secs();
    for (i, segment) in segments.iter().enumerate() {
        if segment.end - segment.start <= 0.0 {
            return Err(SubweaveError::ConstraintViolation {
                index: i,
                message: format!(
                    "non-positive duration {:.3}s after correction",
                    segment.duration()
                ),
            });
        }
        if let Some(next) = segments.get(i + 1)
            && segment.end > next.start - gap + EPSILON
        {
            return Err(SubweaveError::ConstraintViolation {
                index: i,
                message: format!(
                    "entry ends at {:.3}s, within the {:.3}s gap before the next entry at {:.3}s",
                    segment.end, gap, next.start
                ),
            });
        }
    }
    Ok(())
}
