//! Error types for vidlore.
//!
//! Library crates use [`VidloreError`] via `thiserror`. Failures are
//! classified into an [`ErrorKind`] before any retry decision is made, so
//! backoff policy never inspects concrete error variants.

use std::path::PathBuf;

/// Top-level error type for all vidlore operations.
#[derive(Debug, thiserror::Error)]
pub enum VidloreError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Data validation error (schema mismatch, invalid enum value, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Generative-service call failure (network, HTTP status, timeout).
    #[error("completion error: {message}")]
    Completion {
        message: String,
        /// HTTP status if the server responded at all.
        status: Option<u16>,
        /// Server-provided retry-after hint, in seconds.
        retry_after_secs: Option<u64>,
    },

    /// Transcript fetch failure for a single video.
    #[error("transcript error: {message}")]
    Transcript { message: String },

    /// The transcript source is refusing requests (rate limiting / IP block).
    /// Fatal for the whole batch, not just the current video.
    #[error("transcript source is blocking requests: {message}")]
    SourceBlocked { message: String },

    /// Unparseable generative output at a boundary where it must surface.
    #[error("malformed response: {message}")]
    Malformed { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, VidloreError>;

/// Coarse failure classification consulted by retry/backoff policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Timeout, connection failure, 5xx, or 429 — eligible for retry.
    Transient,
    /// The remote answered but the payload is unusable.
    Malformed,
    /// Upstream is blocking us; abort the batch, leave remaining work pending.
    HardBlock,
    /// Everything else — retrying will not help.
    Permanent,
}

impl VidloreError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a transcript-fetch error from any displayable message.
    pub fn transcript(msg: impl Into<String>) -> Self {
        Self::Transcript {
            message: msg.into(),
        }
    }

    /// Create a malformed-response error from any displayable message.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Classify this error for retry policy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Completion { status, .. } => match status {
                // No status: the request never completed (timeout, reset).
                None => ErrorKind::Transient,
                Some(429) => ErrorKind::Transient,
                Some(s) if *s >= 500 => ErrorKind::Transient,
                Some(_) => ErrorKind::Permanent,
            },
            Self::SourceBlocked { .. } => ErrorKind::HardBlock,
            Self::Malformed { .. } => ErrorKind::Malformed,
            _ => ErrorKind::Permanent,
        }
    }

    /// Server-provided retry-after hint, if this failure carries one.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::Completion {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }
}
