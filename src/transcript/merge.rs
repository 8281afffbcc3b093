//! Chunk transcript merging
//!
//! When long audio is split into chunks, each chunk is transcribed
//! independently with times relative to the chunk start. Merging
//! rewrites those times into the global timeline and removes duplicate
//! tokens at chunk boundaries, where a word near the silence cut can
//! appear in both neighboring transcripts.

use crate::defaults;
use crate::error::{Result, SubweaveError};
use crate::transcript::{Token, TranscriptStream};
use tracing::debug;

/// A chunk transcript paired with its offset into the full audio
#[derive(Debug, Clone)]
pub struct ChunkTranscript {
    /// Chunk position in the original chunk plan
    pub index: usize,
    /// Seconds from the start of the full audio to the chunk start
    pub offset: f64,
    pub stream: TranscriptStream,
}

/// Merge per-chunk transcripts into one global-timeline stream
///
/// Chunks are processed in index order. Each stream is shifted by its
/// offset, then boundary duplicates are dropped: a token whose shifted
/// start falls within the merge tolerance of an already-merged token
/// with the same text is a re-transcription of the same audio, and the
/// occurrence with the tighter time range wins.
///
/// Returns [`SubweaveError::MergeConflict`] when a chunk's shifted
/// tokens would start before the previously merged chunk's offset, or
/// when a non-duplicate token regresses behind the merged timeline by
/// more than the merge tolerance. The merged stream is never reordered
/// to paper over such an overlap.
pub fn merge_streams(mut chunks: Vec<ChunkTranscript>) -> Result<TranscriptStream> {
    chunks.sort_by_key(|c| c.index);

    let mut merged: Vec<Token> = Vec::new();
    let mut prev_offset = f64::NEG_INFINITY;
    // Metadata follows the first chunk
    let mut provider = None;
    let mut language = None;

    for chunk in chunks {
        if chunk.offset < prev_offset {
            return Err(SubweaveError::MergeConflict {
                chunk: chunk.index,
                message: format!(
                    "chunk offset {:.3}s precedes previous chunk offset {:.3}s",
                    chunk.offset, prev_offset
                ),
            });
        }
        prev_offset = chunk.offset;

        let mut stream = chunk.stream;
        if provider.is_none() {
            provider = stream.provider;
            language = stream.language.take();
        }
        stream.shift(chunk.offset);

        if let Some(first) = stream.start()
            && first < chunk.offset - defaults::MERGE_TOLERANCE_SECS
        {
            return Err(SubweaveError::MergeConflict {
                chunk: chunk.index,
                message: format!(
                    "shifted token at {:.3}s starts before chunk offset {:.3}s",
                    first, chunk.offset
                ),
            });
        }

        let mut dropped = 0usize;
        for mut token in stream.tokens {
            if let Some(dup_at) = find_boundary_duplicate(&merged, &token) {
                dropped += 1;
                // Keep whichever occurrence has the tighter time range,
                // unless swapping it in would break the ordering
                if token.duration() < merged[dup_at].duration()
                    && (dup_at == 0 || token.start >= merged[dup_at - 1].start)
                {
                    merged[dup_at] = token;
                }
                continue;
            }
            if let Some(last) = merged.last() {
                if token.start < last.start - defaults::MERGE_TOLERANCE_SECS {
                    return Err(SubweaveError::MergeConflict {
                        chunk: chunk.index,
                        message: format!(
                            "token {:?} at {:.3}s regresses behind the merged timeline at {:.3}s",
                            token.text, token.start, last.start
                        ),
                    });
                }
                // Jitter inside the tolerance is snapped forward
                if token.start < last.start {
                    token.start = last.start;
                    token.end = token.end.max(token.start);
                }
            }
            merged.push(token);
        }
        if dropped > 0 {
            debug!(chunk = chunk.index, dropped, "dropped boundary duplicates");
        }
    }

    let mut stream = TranscriptStream::new(merged);
    stream.provider = provider;
    stream.language = language;
    Ok(stream)
}

/// Find an already-merged token that duplicates `token` at a boundary
fn find_boundary_duplicate(merged: &[Token], token: &Token) -> Option<usize> {
    // Only the tail of the previous chunk can collide, so scanning a
    // few trailing tokens is enough.
    merged
        .iter()
        .enumerate()
        .rev()
        .take(16)
        .find(|(_, existing)| {
            existing.text == token.text
                && (existing.start - token.start).abs() <= defaults::MERGE_TOLERANCE_SECS
        })
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(index: usize, offset: f64, tokens: Vec<Token>) -> ChunkTranscript {
        ChunkTranscript {
            index,
            offset,
            stream: TranscriptStream::new(tokens),
        }
    }

    #[test]
    fn test_merge_rewrites_offsets() {
        let chunks = vec![
            chunk(0, 0.0, vec![Token::word("one", 0.0, 0.5)]),
            chunk(1, 10.0, vec![Token::word("two", 0.0, 0.5)]),
        ];
        let merged = merge_streams(chunks).unwrap();
        assert_eq!(merged.len(), 2);
        assert!((merged.tokens[1].start - 10.0).abs() < 1e-9);
        assert!((merged.tokens[1].end - 10.5).abs() < 1e-9);
    }

    #[test]
    fn test_merge_drops_boundary_duplicate() {
        let chunks = vec![
            chunk(
                0,
                0.0,
                vec![
                    Token::word("hello", 0.0, 0.4),
                    Token::word("world", 9.98, 10.5),
                ],
            ),
            chunk(
                1,
                10.0,
                vec![
                    // Re-transcription of "world" straddling the cut
                    Token::word("world", 0.0, 0.4),
                    Token::word("again", 0.5, 0.9),
                ],
            ),
        ];
        let merged = merge_streams(chunks).unwrap();
        assert_eq!(merged.len(), 3);
        // The tighter range (10.0..10.4) replaces the looser one
        let world = merged.tokens.iter().find(|t| t.text == "world").unwrap();
        assert!((world.duration() - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_merge_keeps_distant_repeat() {
        let chunks = vec![
            chunk(0, 0.0, vec![Token::word("yes", 0.0, 0.3)]),
            chunk(1, 10.0, vec![Token::word("yes", 0.0, 0.3)]),
        ];
        let merged = merge_streams(chunks).unwrap();
        // Same word ten seconds apart is a real repeat, not a duplicate
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_merge_out_of_order_indices() {
        let chunks = vec![
            chunk(1, 10.0, vec![Token::word("two", 0.0, 0.5)]),
            chunk(0, 0.0, vec![Token::word("one", 0.0, 0.5)]),
        ];
        let merged = merge_streams(chunks).unwrap();
        assert_eq!(merged.tokens[0].text, "one");
        assert!(merged.is_ordered());
    }

    #[test]
    fn test_merge_conflict_on_negative_start() {
        let chunks = vec![
            chunk(0, 0.0, vec![Token::word("one", 0.0, 0.5)]),
            chunk(1, 10.0, vec![Token::word("bad", -2.0, -1.5)]),
        ];
        let err = merge_streams(chunks).unwrap_err();
        assert!(matches!(err, SubweaveError::MergeConflict { chunk: 1, .. }));
    }

    #[test]
    fn test_merge_conflict_on_overlapping_speech() {
        let chunks = vec![
            chunk(
                0,
                0.0,
                vec![
                    Token::word("alpha", 0.0, 0.4),
                    Token::word("beta", 10.5, 11.0),
                ],
            ),
            // Different text starting before the merged tail is real
            // overlapping speech, not a boundary duplicate
            chunk(1, 10.0, vec![Token::word("gamma", 0.2, 0.6)]),
        ];
        let err = merge_streams(chunks).unwrap_err();
        assert!(matches!(err, SubweaveError::MergeConflict { chunk: 1, .. }));
    }

    #[test]
    fn test_merge_snaps_tolerance_jitter_forward() {
        let chunks = vec![
            chunk(0, 0.0, vec![Token::word("tail", 9.99, 10.4)]),
            chunk(1, 10.0, vec![Token::word("next", -0.04, 0.4)]),
        ];
        let merged = merge_streams(chunks).unwrap();
        assert_eq!(merged.len(), 2);
        assert!(merged.is_ordered());
        // 9.96 is within the tolerance of the 9.99 tail, so it snaps
        assert!((merged.tokens[1].start - 9.99).abs() < 1e-9);
    }

    #[test]
    fn test_merge_empty_input() {
        let merged = merge_streams(Vec::new()).unwrap();
        assert!(merged.is_empty());
    }

    #[test]
    fn test_merge_single_chunk_passthrough() {
        let chunks = vec![chunk(
            0,
            0.0,
            vec![Token::word("a", 0.0, 0.4), Token::word("b", 0.5, 0.9)],
        )];
        let merged = merge_streams(chunks).unwrap();
        assert_eq!(merged.len(), 2);
    }
}
