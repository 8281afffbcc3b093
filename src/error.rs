//! Error types for subweave.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SubweaveError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Transcript normalization errors
    #[error("Unrecognized transcript shape: {message}")]
    Schema { message: String },

    // Chunk merge errors
    #[error("Unresolvable chunk overlap at chunk {chunk}: {message}")]
    MergeConflict { chunk: usize, message: String },

    // External service errors
    #[error("{service} call timed out after {seconds}s")]
    ServiceTimeout { service: String, seconds: u64 },

    #[error("{service} returned a malformed response: {message}")]
    MalformedResponse { service: String, message: String },

    #[error("{service} quota or rate limit exceeded")]
    QuotaExceeded { service: String },

    #[error("{service} authentication failed: {message}")]
    AuthFailed { service: String, message: String },

    #[error("{service} unavailable for {unit} {index} after {attempts} attempts: {message}")]
    ServiceUnavailable {
        service: String,
        unit: String,
        index: usize,
        attempts: u32,
        message: String,
    },

    // Timing correction errors
    #[error("Timing constraint violated at entry {index}: {message}")]
    ConstraintViolation { index: usize, message: String },

    // Audio source errors
    #[error("Audio source error: {message}")]
    AudioSource { message: String },

    // Subtitle parsing errors
    #[error("Invalid SRT data at entry {index}: {message}")]
    SrtParse { index: usize, message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl SubweaveError {
    /// Whether a failed external call is worth retrying.
    ///
    /// Timeouts, malformed responses and rate limits are transient;
    /// authentication failures and everything else are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SubweaveError::ServiceTimeout { .. }
                | SubweaveError::MalformedResponse { .. }
                | SubweaveError::QuotaExceeded { .. }
        )
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, SubweaveError>;
