//! Stream subsystem error types
//!
//! Split by boundary: [`TransportError`] covers connection establishment and
//! wire I/O, [`FrameError`] covers decoding of individual frame bodies.

use thiserror::Error;

/// Errors from the push-connection transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Request construction or protocol-level failure
    #[error("request error: {0}")]
    Request(String),

    /// Connection attempt timed out
    #[error("connection timed out")]
    Timeout,

    /// Server is unreachable
    #[error("server unavailable")]
    Unavailable,

    /// Server answered with a non-success status
    #[error("unexpected status: {0}")]
    Status(u16),

    /// The stream failed mid-read
    #[error("stream interrupted: {0}")]
    Interrupted(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() {
            TransportError::Unavailable
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

/// Errors from decoding a single frame body.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Body was empty
    #[error("empty frame body")]
    Empty,

    /// Body was not the expected JSON object
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransportError::Status(502);
        assert_eq!(err.to_string(), "unexpected status: 502");

        let err = TransportError::Timeout;
        assert_eq!(err.to_string(), "connection timed out");

        let err = FrameError::Empty;
        assert_eq!(err.to_string(), "empty frame body");
    }
}
