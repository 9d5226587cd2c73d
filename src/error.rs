//! Error types for rzsync

use thiserror::Error;

/// Result type alias for rzsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for rzsync
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors (file system operations)
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Invalid or truncated control file
    #[error("malformed control file: {message}")]
    MalformedControl { message: String },

    /// Post-assembly whole-file hash disagreement
    #[error("checksum mismatch: control file says SHA-1 {expected}, assembled file has {computed}")]
    ChecksumMismatch { expected: String, computed: String },

    /// 404 on a remote resource
    #[error("remote resource not found: {url}")]
    RemoteMissing { url: String },

    /// Unexpected HTTP status or network failure
    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// Unparseable range response: multipart framing, Content-Range, early EOF
    #[error("malformed range response: {message}")]
    MalformedResponse { message: String },

    /// The server left requested ranges undelivered within one batch
    #[error("server left {missing} requested range(s) undelivered")]
    IncompleteRangeResponse { missing: usize },

    /// Operation was cancelled
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Create an I/O error with context
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Create a control-file parse error
    pub fn malformed_control(message: impl Into<String>) -> Self {
        Self::MalformedControl {
            message: message.into(),
        }
    }

    /// Create a transport error without an underlying cause
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Create a transport error wrapping an HTTP client failure
    pub fn transport_source(message: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a range-response parse error
    pub fn malformed_response(message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: err,
        }
    }
}
