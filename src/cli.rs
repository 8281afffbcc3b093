//! Command-line interface for subweave
//!
//! Provides argument parsing using clap derive macros.

use crate::transcript::Provider;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Transcript to subtitle converter
#[derive(Parser, Debug)]
#[command(
    name = "subweave",
    version = crate::version_string(),
    about = "Turn timestamped transcripts into SRT subtitles"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress progress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: stage progress, -vv: full diagnostics)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Transcribe a WAV file and generate subtitles
    Generate {
        /// WAV file to transcribe
        #[arg(value_name = "AUDIO")]
        audio: PathBuf,

        /// Output path (default: input path with .srt extension)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Language code hint for transcription (e.g. en, ja, de)
        #[arg(long, value_name = "LANG")]
        language: Option<String>,

        /// Chunk ceiling override. Examples: 900s, 15m, 1h
        #[arg(long, value_name = "DURATION", value_parser = parse_chunk_secs)]
        max_chunk: Option<f64>,
    },

    /// Generate subtitles from an already-fetched transcript JSON
    Convert {
        /// Provider transcript JSON file
        #[arg(value_name = "TRANSCRIPT")]
        transcript: PathBuf,

        /// Output path (default: input path with .srt extension)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Provider shape (elevenlabs, soniox, whisper; default: auto-detect)
        #[arg(long, value_name = "PROVIDER")]
        provider: Option<Provider>,
    },

    /// Show how a WAV file would be split into chunks
    Plan {
        /// WAV file to inspect
        #[arg(value_name = "AUDIO")]
        audio: PathBuf,

        /// Chunk ceiling override. Examples: 900s, 15m, 1h
        #[arg(long, value_name = "DURATION", value_parser = parse_chunk_secs)]
        max_chunk: Option<f64>,
    },

    /// Manage configuration
    Config {
        /// Action to perform
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the configuration file path
    Path,

    /// Print the effective configuration as TOML
    Show,
}

/// Parse a chunk ceiling string into seconds.
///
/// Supports any duration format accepted by `humantime`: bare numbers
/// (seconds), single-unit (`900s`, `15m`) and compound (`1h30m`).
fn parse_chunk_secs(s: &str) -> Result<f64, String> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<f64>() {
        if secs <= 0.0 {
            return Err("chunk ceiling must be positive".to_string());
        }
        return Ok(secs);
    }
    humantime::parse_duration(s)
        .map(|d| d.as_secs_f64())
        .map_err(|e| e.to_string())
}
