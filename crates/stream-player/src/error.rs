//! Error types surfaced by the task framework and the playback collaborators.

use thiserror::Error;

/// Errors delivered through a [`crate::task::Task`] result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The job returned an error.
    #[error("task failed: {0}")]
    Failed(String),
    /// The job panicked; the worker thread kept running.
    #[error("task panicked: {0}")]
    Panicked(String),
    /// The invocation was dropped before it started (owner torn down).
    #[error("task cancelled before it started")]
    Cancelled,
    /// A registry key was requested with types other than the ones it was created with.
    #[error("task signature `{key}` was registered as `{registered}`, requested as `{requested}`")]
    SignatureMismatch {
        key: String,
        registered: &'static str,
        requested: &'static str,
    },
    /// The registry could not start its worker thread.
    #[error("task queue unavailable: {0}")]
    QueueUnavailable(String),
}

/// Transport failure categories reported by a completed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    ConnectionFailure,
    Timeout,
    Tls,
    Protocol,
    Resolution,
    EmptyResponse,
    InvalidUrl,
    /// Non-success HTTP status.
    Status(u16),
    /// The data handler refused bytes.
    Aborted,
    Unknown,
}

impl TransportErrorKind {
    /// Map an HTTP status code onto a kind.
    pub fn from_status(code: u16) -> Self {
        TransportErrorKind::Status(code)
    }

    pub fn is_unauthorized(self) -> bool {
        matches!(self, TransportErrorKind::Status(401))
    }

    pub fn is_not_found(self) -> bool {
        matches!(self, TransportErrorKind::Status(404))
    }

    pub fn is_bad_request(self) -> bool {
        matches!(self, TransportErrorKind::Status(400))
    }
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportErrorKind::ConnectionFailure => f.write_str("connection failure"),
            TransportErrorKind::Timeout => f.write_str("timeout"),
            TransportErrorKind::Tls => f.write_str("tls failure"),
            TransportErrorKind::Protocol => f.write_str("protocol error"),
            TransportErrorKind::Resolution => f.write_str("resolution failure"),
            TransportErrorKind::EmptyResponse => f.write_str("empty response"),
            TransportErrorKind::InvalidUrl => f.write_str("invalid url"),
            TransportErrorKind::Status(code) => write!(f, "http status {code}"),
            TransportErrorKind::Aborted => f.write_str("aborted"),
            TransportErrorKind::Unknown => f.write_str("unknown error"),
        }
    }
}

/// Structured error attached to a completed transfer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Errors raised by a feed decoder.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The codec backend failed in a way that cannot be skipped.
    #[error("decoder backend error: {0}")]
    Backend(String),
    /// The stream uses something the decoder does not handle.
    #[error("unsupported stream: {0}")]
    Unsupported(String),
}

impl From<symphonia::core::errors::Error> for DecodeError {
    fn from(err: symphonia::core::errors::Error) -> Self {
        match err {
            symphonia::core::errors::Error::Unsupported(what) => {
                DecodeError::Unsupported(what.to_string())
            }
            other => DecodeError::Backend(other.to_string()),
        }
    }
}
