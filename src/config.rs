use crate::defaults;
use crate::error::{Result, SubweaveError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub timing: TimingConfig,
    pub chunking: ChunkingConfig,
    pub segmenter: SegmenterConfig,
    pub llm: LlmConfig,
    pub stt: SttConfig,
}

/// Subtitle timing constraints and correction tolerances
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimingConfig {
    pub min_duration_secs: f64,
    pub max_duration_secs: f64,
    pub gap_ms: u64,
    pub max_chars_per_line: usize,
    pub trailing_gap_secs: f64,
    pub outlier_duration_secs: f64,
    pub correction_padding_secs: f64,
}

/// Long-audio chunking parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_chunk_secs: f64,
    pub search_window_secs: f64,
    pub silence_threshold_db: f64,
    pub min_silence_secs: f64,
}

/// Windowed segmentation parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SegmenterConfig {
    pub window_chars: usize,
    pub window_overlap_chars: usize,
    pub alignment_threshold: f64,
    pub max_concurrency: usize,
}

/// Language model service configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub retries: u32,
    /// API key; normally supplied via SUBWEAVE_LLM_API_KEY instead.
    pub api_key: Option<String>,
}

/// Transcription service configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SttConfig {
    pub base_url: String,
    pub language: Option<String>,
    pub timeout_secs: u64,
    pub retries: u32,
    /// Simultaneous chunk uploads
    pub max_concurrency: usize,
    /// API key; normally supplied via SUBWEAVE_STT_API_KEY instead.
    pub api_key: Option<String>,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            min_duration_secs: defaults::MIN_DURATION_SECS,
            max_duration_secs: defaults::MAX_DURATION_SECS,
            gap_ms: defaults::GAP_MS,
            max_chars_per_line: defaults::MAX_CHARS_PER_LINE,
            trailing_gap_secs: defaults::TRAILING_GAP_SECS,
            outlier_duration_secs: defaults::OUTLIER_DURATION_SECS,
            correction_padding_secs: defaults::CORRECTION_PADDING_SECS,
        }
    }
}

impl TimingConfig {
    /// Minimum inter-entry gap in seconds.
    pub fn gap_secs(&self) -> f64 {
        self.gap_ms as f64 / 1000.0
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_secs: defaults::MAX_CHUNK_SECS,
            search_window_secs: defaults::SILENCE_SEARCH_WINDOW_SECS,
            silence_threshold_db: defaults::SILENCE_THRESHOLD_DB,
            min_silence_secs: defaults::MIN_SILENCE_SECS,
        }
    }
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            window_chars: defaults::WINDOW_CHARS,
            window_overlap_chars: defaults::WINDOW_OVERLAP_CHARS,
            alignment_threshold: defaults::ALIGNMENT_THRESHOLD,
            max_concurrency: defaults::MAX_CONCURRENCY,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::LLM_BASE_URL.to_string(),
            model: defaults::LLM_MODEL.to_string(),
            temperature: defaults::LLM_TEMPERATURE,
            timeout_secs: defaults::SERVICE_TIMEOUT_SECS,
            retries: defaults::SERVICE_RETRIES,
            api_key: None,
        }
    }
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::STT_BASE_URL.to_string(),
            language: None,
            timeout_secs: defaults::SERVICE_TIMEOUT_SECS,
            retries: defaults::SERVICE_RETRIES,
            max_concurrency: defaults::MAX_CONCURRENCY,
            api_key: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SubweaveError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                SubweaveError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Errors on invalid TOML so a typo never silently reverts settings.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(SubweaveError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// Check cross-field consistency that deserialization cannot express
    pub fn validate(&self) -> Result<()> {
        if self.timing.min_duration_secs > self.timing.max_duration_secs {
            return Err(SubweaveError::ConfigInvalidValue {
                key: "timing.min_duration_secs".to_string(),
                message: format!(
                    "exceeds max_duration_secs ({})",
                    self.timing.max_duration_secs
                ),
            });
        }
        if self.segmenter.window_overlap_chars * 2 >= self.segmenter.window_chars {
            return Err(SubweaveError::ConfigInvalidValue {
                key: "segmenter.window_overlap_chars".to_string(),
                message: format!(
                    "overlap must leave room in the window ({} chars)",
                    self.segmenter.window_chars
                ),
            });
        }
        Ok(())
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - SUBWEAVE_LLM_API_KEY → llm.api_key
    /// - SUBWEAVE_LLM_MODEL → llm.model
    /// - SUBWEAVE_LLM_BASE_URL → llm.base_url
    /// - SUBWEAVE_STT_API_KEY → stt.api_key
    /// - SUBWEAVE_LANGUAGE → stt.language
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var("SUBWEAVE_LLM_API_KEY")
            && !key.is_empty()
        {
            self.llm.api_key = Some(key);
        }

        if let Ok(model) = std::env::var("SUBWEAVE_LLM_MODEL")
            && !model.is_empty()
        {
            self.llm.model = model;
        }

        if let Ok(url) = std::env::var("SUBWEAVE_LLM_BASE_URL")
            && !url.is_empty()
        {
            self.llm.base_url = url;
        }

        if let Ok(key) = std::env::var("SUBWEAVE_STT_API_KEY")
            && !key.is_empty()
        {
            self.stt.api_key = Some(key);
        }

        if let Ok(language) = std::env::var("SUBWEAVE_LANGUAGE")
            && !language.is_empty()
        {
            self.stt.language = Some(language);
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/subweave/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .expect("Could not determine config directory")
            .join("subweave")
            .join("config.toml")
    }
}
