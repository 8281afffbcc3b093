//! subweave - timestamped transcripts to SRT subtitles
//!
//! Normalizes word-level speech-to-text output into a token stream,
//! segments it with a language model, repairs the timing, and renders
//! SRT. Long audio is split at silence boundaries, transcribed per
//! chunk, and stitched back into one timeline.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod segmenter;
pub mod srt;
pub mod stt;
pub mod timing;
pub mod transcript;

// Core traits (audio → transcript → segments → subtitles)
pub use audio::{AudioSource, WavSource};
pub use llm::{LanguageModel, OpenAiCompatClient};
pub use stt::{ElevenLabsClient, TranscriptionService};

// Pipeline
pub use pipeline::{Pipeline, PipelineOutcome};

// Error handling
pub use error::{Result, SubweaveError};

// Config
pub use config::Config;

// Data model
pub use srt::SubtitleEntry;
pub use transcript::{Provider, Token, TokenKind, TranscriptStream};

/// Build version string with optional git commit hash.
///
/// Returns `"0.3.1+abc1234"` when git hash is available, `"0.3.1"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
