// src/error.rs

//! Error types for crxpkg

use thiserror::Error;

/// Result type for crxpkg operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while converging packages and OSGi configuration
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to construct a client or other startup-time resource
    #[error("initialization error: {0}")]
    InitError(String),

    /// Local filesystem operation failed
    #[error("I/O error: {0}")]
    IoError(String),

    /// Artifact download failed
    #[error("download error: {0}")]
    DownloadError(String),

    /// The package manager listing or another remote call could not complete
    #[error("package manager unavailable: {0}")]
    RemoteUnavailable(String),

    /// Package descriptor or server-side metadata could not be parsed
    #[error("metadata error: {0}")]
    MetadataParse(String),

    /// Bundle stability was not reached within the configured attempts.
    /// Treated as fatal by callers: aborting beats reporting false success.
    #[error("bundle stability timeout: {0}")]
    StabilityTimeout(String),

    /// External configuration tool exited non-zero or produced garbage
    #[error("tool invocation failed: {0}")]
    ToolInvocation(String),

    /// Resource manifest could not be parsed or is inconsistent
    #[error("manifest error: {0}")]
    ManifestError(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IoError(e.to_string())
    }
}
