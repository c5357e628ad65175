use reqwest::StatusCode;
use std::error::Error as StdError;

/// Result alias used across the engine
pub type CacheResult<T> = std::result::Result<T, CacheError>;

// Error type for cache load/store operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Unexpected (non-2xx, non-miss) response from the cache server
    #[error("{} {message}", status_line(.status))]
    UnexpectedStatus { status: StatusCode, message: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid cache key: {0}")]
    InvalidKey(String),
}

/// Status code and reason phrase, e.g. `404 Not Found`
pub fn status_line(status: &StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {reason}", status.as_str()),
        None => status.as_str().to_string(),
    }
}

impl CacheError {
    /// Whether this error is a protocol error (the server answered, but not with success)
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, CacheError::UnexpectedStatus { .. })
    }

    /// Status code carried by a protocol error
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            CacheError::UnexpectedStatus { status, .. } => Some(*status),
            CacheError::Http(e) => e.status(),
            _ => None,
        }
    }

    /// Describe the deepest underlying cause of this error.
    ///
    /// The returned string is never empty.
    pub fn root_cause(&self) -> String {
        let mut current: &(dyn StdError + 'static) = self;
        while let Some(source) = current.source() {
            current = source;
        }

        let description = current.to_string();
        if !description.is_empty() {
            return description;
        }

        let description = self.to_string();
        if !description.trim().is_empty() {
            return description;
        }

        format!("{self:?}")
    }
}
