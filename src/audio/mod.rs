//! Audio sources and long-audio chunking
//!
//! An [`AudioSource`] abstracts over where samples come from so the
//! chunk planner and pipeline can be tested without real files. The
//! only file-backed implementation is [`WavSource`], which decodes a
//! WAV file into mono f32 samples up front.

pub mod chunker;
pub mod silence;

pub use chunker::{plan_chunks, AudioChunk};
pub use silence::SilenceRegion;

use crate::error::{Result, SubweaveError};
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// A readable audio stream with silence information
pub trait AudioSource {
    /// Total duration in seconds
    fn duration(&self) -> f64;

    /// Silence regions within `[start, end)` seconds
    fn silence_regions(&self, start: f64, end: f64) -> Vec<SilenceRegion>;

    /// Encode the span `[start, end)` as a standalone WAV payload
    fn slice(&self, start: f64, end: f64) -> Result<Vec<u8>>;
}

/// WAV-file-backed audio source
///
/// Multi-channel input is downmixed to mono and integer sample formats
/// are converted to f32 in [-1.0, 1.0].
pub struct WavSource {
    samples: Vec<f32>,
    sample_rate: u32,
    threshold_db: f64,
    min_silence_secs: f64,
}

impl WavSource {
    pub fn open(
        path: &Path,
        threshold_db: f64,
        min_silence_secs: f64,
    ) -> Result<Self> {
        let reader = hound::WavReader::open(path).map_err(|e| SubweaveError::AudioSource {
            message: format!("failed to open {}: {}", path.display(), e),
        })?;
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| SubweaveError::AudioSource {
                    message: format!("failed to decode {}: {}", path.display(), e),
                })?,
            hound::SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<std::result::Result<_, _>>()
                    .map_err(|e| SubweaveError::AudioSource {
                        message: format!("failed to decode {}: {}", path.display(), e),
                    })?
            }
        };

        let samples = downmix(&interleaved, channels);
        debug!(
            path = %path.display(),
            sample_rate = spec.sample_rate,
            channels,
            secs = samples.len() as f64 / spec.sample_rate as f64,
            "loaded wav source"
        );

        Ok(Self {
            samples,
            sample_rate: spec.sample_rate,
            threshold_db,
            min_silence_secs,
        })
    }

    /// Build a source directly from mono samples
    pub fn from_samples(
        samples: Vec<f32>,
        sample_rate: u32,
        threshold_db: f64,
        min_silence_secs: f64,
    ) -> Self {
        Self {
            samples,
            sample_rate,
            threshold_db,
            min_silence_secs,
        }
    }

    fn sample_index(&self, secs: f64) -> usize {
        ((secs * self.sample_rate as f64) as usize).min(self.samples.len())
    }
}

fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

impl AudioSource for WavSource {
    fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    fn silence_regions(&self, start: f64, end: f64) -> Vec<SilenceRegion> {
        let lo = self.sample_index(start);
        let hi = self.sample_index(end);
        if lo >= hi {
            return Vec::new();
        }
        silence::detect_silence(
            &self.samples[lo..hi],
            self.sample_rate,
            self.threshold_db,
            self.min_silence_secs,
        )
        .into_iter()
        .map(|r| SilenceRegion {
            start: r.start + start,
            end: r.end + start,
        })
        .collect()
    }

    fn slice(&self, start: f64, end: f64) -> Result<Vec<u8>> {
        let lo = self.sample_index(start);
        let hi = self.sample_index(end);
        if lo >= hi {
            return Err(SubweaveError::AudioSource {
                message: format!("empty slice {:.3}s..{:.3}s", start, end),
            });
        }

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer =
                hound::WavWriter::new(&mut cursor, spec).map_err(|e| SubweaveError::AudioSource {
                    message: format!("failed to encode slice: {}", e),
                })?;
            for &sample in &self.samples[lo..hi] {
                let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                writer.write_sample(value).map_err(|e| SubweaveError::AudioSource {
                    message: format!("failed to encode slice: {}", e),
                })?;
            }
            writer.finalize().map_err(|e| SubweaveError::AudioSource {
                message: format!("failed to finalize slice: {}", e),
            })?;
        }
        Ok(cursor.into_inner())
    }
}

/// In-memory audio source for tests
#[cfg(test)]
pub struct MockAudioSource {
    pub duration: f64,
    pub regions: Vec<SilenceRegion>,
}

#[cfg(test)]
impl AudioSource for MockAudioSource {
    fn duration(&self) -> f64 {
        self.duration
    }

    fn silence_regions(&self, start: f64, end: f64) -> Vec<SilenceRegion> {
        self.regions
            .iter()
            .copied()
            .filter(|r| r.midpoint() >= start && r.midpoint() < end)
            .collect()
    }

    fn slice(&self, start: f64, end: f64) -> Result<Vec<u8>> {
        Ok(format!("{:.3}..{:.3}", start, end).into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 16_000;

    fn source_with_gap() -> WavSource {
        // 1s tone, 1s silence, 1s tone
        let mut samples: Vec<f32> = (0..RATE).map(|i| 0.5 * (i as f32 * 0.3).sin()).collect();
        samples.extend(vec![0.0f32; RATE as usize]);
        samples.extend((0..RATE).map(|i| 0.5 * (i as f32 * 0.3).sin()));
        WavSource::from_samples(samples, RATE, -40.0, 0.5)
    }

    #[test]
    fn test_duration() {
        let source = source_with_gap();
        assert!((source.duration() - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_silence_regions_offset_by_range_start() {
        let source = source_with_gap();
        let regions = source.silence_regions(0.5, 3.0);
        assert_eq!(regions.len(), 1);
        assert!((regions[0].start - 1.0).abs() < 0.1);
        assert!((regions[0].end - 2.0).abs() < 0.1);
    }

    #[test]
    fn test_slice_produces_valid_wav() {
        let source = source_with_gap();
        let bytes = source.slice(0.0, 1.0).unwrap();
        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().sample_rate, RATE);
        assert_eq!(reader.len(), RATE);
    }

    #[test]
    fn test_empty_slice_is_error() {
        let source = source_with_gap();
        assert!(source.slice(2.0, 2.0).is_err());
    }

    #[test]
    fn test_downmix_stereo() {
        let interleaved = vec![1.0, 0.0, 0.5, 0.5];
        let mono = downmix(&interleaved, 2);
        assert_eq!(mono, vec![0.5, 0.5]);
    }
}
