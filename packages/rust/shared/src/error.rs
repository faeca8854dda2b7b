//! Error types for sitegen.
//!
//! Library crates use [`SitegenError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all sitegen operations.
#[derive(Debug, thiserror::Error)]
pub enum SitegenError {
    /// The trigger payload is missing a field or has the wrong shape.
    #[error("payload error: {message}")]
    Payload { message: String },

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// The requested object does not exist in the artifact store.
    #[error("object not found: s3://{bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// The job credentials are not allowed to access the object.
    #[error("access denied: s3://{bucket}/{key}")]
    AccessDenied { bucket: String, key: String },

    /// Any other rejection from the artifact store.
    #[error("storage error: {0}")]
    Storage(String),

    /// Transport-level failure talking to a remote service.
    #[error("network error: {0}")]
    Network(String),

    /// Corrupt or unreadable zip archive.
    #[error("archive error: {message}")]
    Archive { message: String },

    /// Build step failure other than a failing command.
    #[error("build error: {message}")]
    Build { message: String },

    /// An install/build/copy command exited unsuccessfully.
    #[error("command `{command}` exited with status {status}:\n{output}")]
    CommandFailed {
        command: String,
        status: i32,
        output: String,
    },

    /// The orchestrator could not be told about the job outcome.
    #[error("report error: {0}")]
    Report(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SitegenError>;

impl SitegenError {
    /// Create a payload error from any displayable message.
    pub fn payload(msg: impl Into<String>) -> Self {
        Self::Payload {
            message: msg.into(),
        }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an archive error from any displayable message.
    pub fn archive(msg: impl Into<String>) -> Self {
        Self::Archive {
            message: msg.into(),
        }
    }

    /// Create a build error from any displayable message.
    pub fn build(msg: impl Into<String>) -> Self {
        Self::Build {
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
}
