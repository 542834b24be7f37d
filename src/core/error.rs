//! Error types for dataplane-http
//!
//! Adapters classify failures into an [`ErrorKind`]; only the transfer pipeline
//! decides whether a kind is worth another attempt.

use std::fmt;

use reqwest::StatusCode;

/// Classification of a transfer failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or missing address configuration. Never retried.
    InvalidAddress,
    /// The remote rejected the request (4xx) or credentials were unavailable. Never retried.
    ClientError,
    /// Server-side failure (5xx) or connection failure. Retryable.
    TransientError,
    /// No response within the configured deadline. Retryable.
    TimeoutError,
    /// Connection lost mid-transfer. Retryable by restarting the whole transfer.
    StreamInterrupted,
}

impl ErrorKind {
    /// Whether a failure of this kind may succeed on a fresh attempt
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::TransientError | ErrorKind::TimeoutError | ErrorKind::StreamInterrupted
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidAddress => "InvalidAddress",
            ErrorKind::ClientError => "ClientError",
            ErrorKind::TransientError => "TransientError",
            ErrorKind::TimeoutError => "TimeoutError",
            ErrorKind::StreamInterrupted => "StreamInterrupted",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for dataplane-http operations
#[derive(Debug)]
pub enum Error {
    /// Address descriptor is missing a base URL or carries invalid values
    InvalidAddress(String),

    /// The remote endpoint answered with a client error, or credentials could not be resolved
    ClientError {
        status: Option<u16>,
        message: String,
    },

    /// Server error or connection failure
    TransientError {
        status: Option<u16>,
        message: String,
    },

    /// Deadline exceeded while waiting for a response
    TimeoutError(String),

    /// Connection lost while the body was being transferred
    StreamInterrupted(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidAddress(_) => ErrorKind::InvalidAddress,
            Error::ClientError { .. } => ErrorKind::ClientError,
            Error::TransientError { .. } => ErrorKind::TransientError,
            Error::TimeoutError(_) => ErrorKind::TimeoutError,
            Error::StreamInterrupted(_) => ErrorKind::StreamInterrupted,
        }
    }

    /// HTTP status that caused the error, when one was received
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::ClientError { status, .. } | Error::TransientError { status, .. } => *status,
            _ => None,
        }
    }

    pub fn client(message: impl Into<String>) -> Self {
        Error::ClientError {
            status: None,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Error::TransientError {
            status: None,
            message: message.into(),
        }
    }

    /// Classify a non-success HTTP status received from `url`
    pub fn from_status(status: StatusCode, url: &str) -> Self {
        let code = status.as_u16();
        if status.is_server_error() {
            return Error::TransientError {
                status: Some(code),
                message: format!("Received {status} from {url}"),
            };
        }

        let message = match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                format!("Not authorized to access {url} ({status})")
            }
            StatusCode::NOT_FOUND => format!("Resource not found: {url}"),
            _ => format!("Received {status} from {url}"),
        };
        Error::ClientError {
            status: Some(code),
            message,
        }
    }

    /// Classify a reqwest failure raised while the body was in flight
    pub fn interrupted(err: reqwest::Error) -> Self {
        if err.is_connect() {
            Error::transient(format!("Connection failed: {err}"))
        } else if err.is_timeout() {
            Error::TimeoutError(err.to_string())
        } else {
            Error::StreamInterrupted(err.to_string())
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidAddress(msg) => write!(f, "Invalid address: {msg}"),
            Error::ClientError { message, .. } => write!(f, "Client error: {message}"),
            Error::TransientError { message, .. } => write!(f, "Transient error: {message}"),
            Error::TimeoutError(msg) => write!(f, "Timeout: {msg}"),
            Error::StreamInterrupted(msg) => write!(f, "Stream interrupted: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::TimedOut {
            Error::TimeoutError(err.to_string())
        } else {
            Error::StreamInterrupted(err.to_string())
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            Error::InvalidAddress(err.to_string())
        } else if err.is_timeout() {
            Error::TimeoutError(err.to_string())
        } else if let Some(status) = err.status() {
            let url = err.url().map(|u| u.as_str()).unwrap_or("<unknown>");
            Error::from_status(status, url)
        } else if err.is_body() || err.is_decode() {
            Error::StreamInterrupted(err.to_string())
        } else {
            Error::transient(err.to_string())
        }
    }
}

/// Convenience result type for dataplane-http operations
pub type Result<T> = std::result::Result<T, Error>;
