//! Domain-specific error types for the IronBus transport.
//!
//! All fallible operations return `Result<T, BusError>`.
//! No panics on invalid input — every error is typed and recoverable.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the IronBus transport.
#[derive(Debug, Error)]
pub enum BusError {
    // ── Protocol Errors ──────────────────────────────────────────
    /// The 16-byte token in a received header does not match the
    /// session's configured token.
    #[error("token check failed")]
    TokenRejected,

    /// A field in the frame header could not be parsed.
    #[error("invalid header: {0}")]
    InvalidHeader(&'static str),

    /// The protocol code of a received frame is not the one the
    /// caller expected.
    #[error("unexpected protocol code: expected {expected:#x}, got {actual:#x}")]
    UnexpectedProtocol { expected: u32, actual: u32 },

    /// A numeric value did not map to any known enum variant.
    #[error("unknown {type_name} discriminant: {value:#x}")]
    UnknownVariant { type_name: &'static str, value: u64 },

    /// The body exceeds the maximum encodable content length.
    #[error("body too large: {size} bytes (max {max})")]
    BodyTooLarge { size: usize, max: usize },

    // ── Connection Errors ────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// The peer closed the connection before a full frame arrived.
    #[error("remote closed the connection")]
    RemoteClosed,

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    // ── Serialization Errors ─────────────────────────────────────
    /// Encoding or decoding of the file metadata payload failed.
    #[error("metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    /// UTF-8 conversion failed.
    #[error("invalid utf-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    // ── Application Errors ───────────────────────────────────────
    /// The requested file does not exist (locally or on the remote).
    #[error("file does not exist: {0}")]
    FileNotExist(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for BusError {
    fn from(s: String) -> Self {
        BusError::Other(s)
    }
}

impl From<&str> for BusError {
    fn from(s: &str) -> Self {
        BusError::Other(s.to_string())
    }
}

impl BusError {
    /// Classify an error from an exact-length socket read: a clean EOF
    /// means the peer closed before a full unit arrived.
    pub(crate) fn from_read(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            BusError::RemoteClosed
        } else {
            BusError::Connection(e)
        }
    }

    /// Returns `true` when the underlying I/O error means the socket
    /// object was already torn down on our side. These are treated as
    /// idempotent shutdown, never surfaced as failures.
    pub fn is_disposed(&self) -> bool {
        matches!(
            self,
            BusError::Connection(e) if e.kind() == std::io::ErrorKind::NotConnected
        )
    }

    /// Returns `true` when the underlying I/O error means the peer has
    /// already gone away (graceful or abortive close noticed on write).
    pub fn is_peer_gone(&self) -> bool {
        use std::io::ErrorKind;
        matches!(
            self,
            BusError::Connection(e) if matches!(
                e.kind(),
                ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
            )
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = BusError::TokenRejected;
        assert!(e.to_string().contains("token"));

        let e = BusError::BodyTooLarge {
            size: 1000,
            max: 500,
        };
        assert!(e.to_string().contains("1000"));
        assert!(e.to_string().contains("500"));
    }

    #[test]
    fn from_string() {
        let e: BusError = "something broke".into();
        assert!(matches!(e, BusError::Other(_)));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: BusError = io_err.into();
        assert!(matches!(e, BusError::Connection(_)));
        assert!(e.is_peer_gone());
        assert!(!e.is_disposed());
    }

    #[test]
    fn disposed_classification() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotConnected, "gone");
        let e: BusError = io_err.into();
        assert!(e.is_disposed());
        assert!(!e.is_peer_gone());
    }
}
