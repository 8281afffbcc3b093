//! Default configuration constants for subweave.
//!
//! This module provides shared constants used across different configuration
//! types to ensure consistency and eliminate duplication. The timing
//! tolerances are empirical values tuned against real word-level transcripts;
//! all of them can be overridden in the configuration file.

/// Target minimum duration for a subtitle entry in seconds.
///
/// Entries shorter than this are extended forward when the following entry
/// leaves room. 1.2s is about the minimum a viewer needs to register a line.
pub const MIN_DURATION_SECS: f64 = 1.2;

/// Maximum duration for a subtitle entry in seconds.
pub const MAX_DURATION_SECS: f64 = 12.0;

/// Minimum enforced gap between two consecutive subtitle entries, in
/// milliseconds. The gap rule always wins over the minimum-duration rule:
/// two entries must never overlap.
pub const GAP_MS: u64 = 100;

/// Maximum characters per rendered subtitle line.
pub const MAX_CHARS_PER_LINE: usize = 60;

/// Maximum chunk duration in seconds for long source audio (28 minutes).
///
/// Audio longer than this is split at silence boundaries and each chunk is
/// transcribed independently.
pub const MAX_CHUNK_SECS: f64 = 1680.0;

/// How far before a chunk boundary to search for a silence region, in
/// seconds. If no silence falls inside this window the chunk is hard-cut at
/// the boundary.
pub const SILENCE_SEARCH_WINDOW_SECS: f64 = 120.0;

/// Level below which audio counts as silence, in dBFS.
pub const SILENCE_THRESHOLD_DB: f64 = -40.0;

/// Minimum length of a below-threshold region to count as silence, in
/// seconds. Shorter dips are inter-word pauses, not cut points.
pub const MIN_SILENCE_SECS: f64 = 0.5;

/// Trailing gap threshold in seconds for end-time correction.
///
/// When the pause between a group's last two tokens exceeds this, the raw
/// end time is an artifact of the provider stretching the final token over
/// the pause, and the end is clamped back toward the last spoken word.
pub const TRAILING_GAP_SECS: f64 = 0.6;

/// Duration above which a single short token counts as an outlier, in
/// seconds. Interjections stretched far past this by the provider get their
/// contribution to the entry end capped.
pub const OUTLIER_DURATION_SECS: f64 = 0.35;

/// Padding added after a corrected end time, in seconds.
pub const CORRECTION_PADDING_SECS: f64 = 0.25;

/// Tolerance for treating two boundary tokens as the same token during
/// chunk-transcript merging, in seconds.
pub const MERGE_TOLERANCE_SECS: f64 = 0.05;

/// Fallback duration for a token with no end time, in seconds.
pub const DEFAULT_TOKEN_SECS: f64 = 0.3;

/// Maximum characters per segmentation window sent to the language model.
///
/// Windows are cut by character count rather than token count because text
/// density varies widely between providers and languages.
pub const WINDOW_CHARS: usize = 2800;

/// Context margin shared between adjacent segmentation windows, in
/// characters. A sentence spanning a window edge is visible to both windows;
/// the owning window's boundary marks win.
pub const WINDOW_OVERLAP_CHARS: usize = 200;

/// Similarity ratio below which a language-model segment is considered
/// unalignable against the token stream.
pub const ALIGNMENT_THRESHOLD: f64 = 0.7;

/// Per-call timeout for external services, in seconds.
pub const SERVICE_TIMEOUT_SECS: u64 = 180;

/// Retry budget for a single external call (transcription or LLM window).
pub const SERVICE_RETRIES: u32 = 3;

/// Base delay for retry backoff, in milliseconds. Doubled per attempt.
pub const RETRY_BASE_DELAY_MS: u64 = 500;

/// Maximum in-flight external calls (chunk transcriptions or LLM windows).
pub const MAX_CONCURRENCY: usize = 4;

/// Default chat-completions endpoint for the segmentation model.
pub const LLM_BASE_URL: &str = "https://api.deepseek.com/v1/chat/completions";

/// Default segmentation model name.
pub const LLM_MODEL: &str = "deepseek-chat";

/// Default sampling temperature. Low enough that retrying a failed window
/// is meaningful.
pub const LLM_TEMPERATURE: f32 = 0.3;

/// Default transcription endpoint.
pub const STT_BASE_URL: &str = "https://api.elevenlabs.io/v1/speech-to-text";
