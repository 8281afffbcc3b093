//! Chunk planning for long audio
//!
//! Transcription services reject very long uploads, so audio beyond
//! the chunk ceiling is split into pieces. Cuts land on the silence
//! midpoint closest to the target position, searched within a window
//! before the target; only when the window holds no usable silence
//! does the planner fall back to a hard cut at the target itself.

use crate::audio::AudioSource;
use crate::config::ChunkingConfig;
use tracing::{debug, warn};

/// A planned slice of the source audio
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioChunk {
    /// Position in the plan, starting at zero
    pub index: usize,
    /// Seconds from the start of the full audio
    pub offset: f64,
    /// Chunk length in seconds
    pub duration: f64,
}

impl AudioChunk {
    pub fn end(&self) -> f64 {
        self.offset + self.duration
    }
}

/// Plan chunk boundaries for a source
///
/// Audio at or under the ceiling yields a single chunk covering the
/// whole file. Every chunk is strictly shorter than or equal to the
/// ceiling, chunks tile the full duration with no gaps, and the plan
/// for a duration D holds at least ceil(D / ceiling) chunks.
pub fn plan_chunks(source: &dyn AudioSource, config: &ChunkingConfig) -> Vec<AudioChunk> {
    let total = source.duration();
    if total <= 0.0 {
        return Vec::new();
    }
    if total <= config.max_chunk_secs {
        return vec![AudioChunk {
            index: 0,
            offset: 0.0,
            duration: total,
        }];
    }

    let mut chunks = Vec::new();
    let mut cursor = 0.0;

    while total - cursor > config.max_chunk_secs {
        let target = cursor + config.max_chunk_secs;
        let window_start = (target - config.search_window_secs).max(cursor);
        let cut = best_cut(source, window_start, target);

        let cut = match cut {
            Some(point) => point,
            None => {
                warn!(
                    target_secs = target,
                    "no silence in search window, cutting at target"
                );
                target
            }
        };

        debug!(index = chunks.len(), offset = cursor, end = cut, "planned chunk");
        chunks.push(AudioChunk {
            index: chunks.len(),
            offset: cursor,
            duration: cut - cursor,
        });
        cursor = cut;
    }

    chunks.push(AudioChunk {
        index: chunks.len(),
        offset: cursor,
        duration: total - cursor,
    });
    chunks
}

/// Silence midpoint closest to `target` within `[window_start, target]`
fn best_cut(source: &dyn AudioSource, window_start: f64, target: f64) -> Option<f64> {
    source
        .silence_regions(window_start, target)
        .into_iter()
        .map(|r| r.midpoint().min(target))
        .filter(|&mid| mid > window_start)
        .min_by(|a, b| (target - a).abs().total_cmp(&(target - b).abs()))
}
