//! Silence detection over PCM samples
//!
//! Chunk boundaries are placed inside silence so no word is cut in
//! half. Detection is a windowed RMS scan: frames whose level falls
//! below the threshold are silent, and runs of silent frames longer
//! than the minimum length become [`SilenceRegion`]s.

/// A contiguous span of audio below the silence threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SilenceRegion {
    /// Start of the region in seconds
    pub start: f64,
    /// End of the region in seconds
    pub end: f64,
}

impl SilenceRegion {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Midpoint of the region, the preferred cut position
    pub fn midpoint(&self) -> f64 {
        (self.start + self.end) / 2.0
    }
}

/// RMS frame length in seconds
const FRAME_SECS: f64 = 0.02;

/// Calculate RMS amplitude of audio samples
pub fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Convert an RMS amplitude to decibels relative to full scale
pub fn rms_to_db(rms: f32) -> f64 {
    if rms <= 0.0 {
        return f64::NEG_INFINITY;
    }
    20.0 * (rms as f64).log10()
}

/// Scan mono samples for silence regions
///
/// `threshold_db` is relative to full scale (e.g. -40.0) and
/// `min_silence_secs` discards runs too short to cut inside.
pub fn detect_silence(
    samples: &[f32],
    sample_rate: u32,
    threshold_db: f64,
    min_silence_secs: f64,
) -> Vec<SilenceRegion> {
    if samples.is_empty() || sample_rate == 0 {
        return Vec::new();
    }

    let frame_len = ((sample_rate as f64 * FRAME_SECS) as usize).max(1);
    let mut regions = Vec::new();
    let mut run_start: Option<usize> = None;

    let mut frame_start = 0usize;
    while frame_start < samples.len() {
        let frame_end = (frame_start + frame_len).min(samples.len());
        let db = rms_to_db(calculate_rms(&samples[frame_start..frame_end]));

        if db < threshold_db {
            if run_start.is_none() {
                run_start = Some(frame_start);
            }
        } else if let Some(start) = run_start.take() {
            push_region(&mut regions, start, frame_start, sample_rate, min_silence_secs);
        }
        frame_start = frame_end;
    }

    if let Some(start) = run_start {
        push_region(&mut regions, start, samples.len(), sample_rate, min_silence_secs);
    }

    regions
}

fn push_region(
    regions: &mut Vec<SilenceRegion>,
    start_sample: usize,
    end_sample: usize,
    sample_rate: u32,
    min_silence_secs: f64,
) {
    let start = start_sample as f64 / sample_rate as f64;
    let end = end_sample as f64 / sample_rate as f64;
    if end - start >= min_silence_secs {
        regions.push(SilenceRegion { start, end });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 16_000;

    fn tone(secs: f64, amplitude: f32) -> Vec<f32> {
        let n = (secs * RATE as f64) as usize;
        (0..n)
            .map(|i| amplitude * (i as f32 * 0.3).sin())
            .collect()
    }

    #[test]
    fn test_rms_of_silence_is_zero() {
        let samples = vec![0.0f32; 1000];
        assert_eq!(calculate_rms(&samples), 0.0);
    }

    #[test]
    fn test_rms_of_constant_signal() {
        let samples = vec![0.5f32; 1000];
        assert!((calculate_rms(&samples) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_rms_to_db() {
        assert!((rms_to_db(1.0)).abs() < 1e-9);
        assert!((rms_to_db(0.1) + 20.0).abs() < 1e-6);
        assert_eq!(rms_to_db(0.0), f64::NEG_INFINITY);
    }

    #[test]
    fn test_detect_silence_in_middle() {
        let mut samples = tone(1.0, 0.5);
        samples.extend(vec![0.0f32; RATE as usize]); // 1s of silence
        samples.extend(tone(1.0, 0.5));

        let regions = detect_silence(&samples, RATE, -40.0, 0.5);
        assert_eq!(regions.len(), 1);
        assert!((regions[0].start - 1.0).abs() < 0.05);
        assert!((regions[0].end - 2.0).abs() < 0.05);
        assert!((regions[0].midpoint() - 1.5).abs() < 0.05);
    }

    #[test]
    fn test_short_silence_discarded() {
        let mut samples = tone(1.0, 0.5);
        samples.extend(vec![0.0f32; (0.2 * RATE as f64) as usize]);
        samples.extend(tone(1.0, 0.5));

        let regions = detect_silence(&samples, RATE, -40.0, 0.5);
        assert!(regions.is_empty());
    }

    #[test]
    fn test_trailing_silence_detected() {
        let mut samples = tone(1.0, 0.5);
        samples.extend(vec![0.0f32; RATE as usize]);

        let regions = detect_silence(&samples, RATE, -40.0, 0.5);
        assert_eq!(regions.len(), 1);
        assert!((regions[0].end - 2.0).abs() < 0.05);
    }

    #[test]
    fn test_all_loud_audio_has_no_silence() {
        let samples = tone(2.0, 0.5);
        let regions = detect_silence(&samples, RATE, -40.0, 0.5);
        assert!(regions.is_empty());
    }

    #[test]
    fn test_empty_input() {
        assert!(detect_silence(&[], RATE, -40.0, 0.5).is_empty());
    }
}
