//! Error types for the controller transport.
//!
//! Every failure the transport can produce is classified into one closed
//! [`ErrorKind`]. The connection manager matches on that kind to decide
//! whether the link survives, and callers use it to tell "controller
//! unreachable" apart from "controller sent garbage".

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Closed classification of transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Socket path missing or controller not listening.
    ConnectFailed,
    /// I/O failure or peer close in the middle of a session.
    TransportBroken,
    /// A response line was not valid JSON.
    MalformedResponse,
    /// A binary transfer header did not match what was expected.
    ProtocolViolation,
}

impl ErrorKind {
    /// Short identifier used in log fields and CLI output.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConnectFailed => "connect_failed",
            ErrorKind::TransportBroken => "transport_broken",
            ErrorKind::MalformedResponse => "malformed_response",
            ErrorKind::ProtocolViolation => "protocol_violation",
        }
    }

    /// True for failures of the socket itself, false for peer protocol faults.
    pub fn is_transport(&self) -> bool {
        matches!(self, ErrorKind::ConnectFailed | ErrorKind::TransportBroken)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by the transport layer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not open the controller socket.
    #[error("Connection to {} failed: {source}", .path.display())]
    ConnectFailed {
        /// Socket path that was tried
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The established link failed during send or receive.
    #[error("Transport broken: {0}")]
    TransportBroken(#[source] io::Error),

    /// The controller answered with text that is not valid JSON.
    #[error("Malformed response {line:?}: {reason}")]
    MalformedResponse {
        /// The offending line, lossily decoded
        line: String,
        /// Parser diagnostic
        reason: String,
    },

    /// The controller violated the binary transfer framing.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),
}

impl TransportError {
    /// Classify a failed connect attempt.
    pub(crate) fn connect(path: impl Into<PathBuf>, source: io::Error) -> Self {
        TransportError::ConnectFailed {
            path: path.into(),
            source,
        }
    }

    /// The peer closed the stream while a response was still owed.
    pub(crate) fn peer_closed() -> Self {
        TransportError::TransportBroken(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "controller closed the connection",
        ))
    }

    pub(crate) fn malformed(line: &[u8], reason: impl fmt::Display) -> Self {
        TransportError::MalformedResponse {
            line: String::from_utf8_lossy(line).into_owned(),
            reason: reason.to_string(),
        }
    }

    /// The kind this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransportError::ConnectFailed { .. } => ErrorKind::ConnectFailed,
            TransportError::TransportBroken(_) => ErrorKind::TransportBroken,
            TransportError::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            TransportError::ProtocolViolation(_) => ErrorKind::ProtocolViolation,
        }
    }
}

impl From<io::Error> for TransportError {
    /// I/O errors on an established link always break the transport.
    fn from(err: io::Error) -> Self {
        TransportError::TransportBroken(err)
    }
}

/// Snapshot of the most recent failure, readable after the call returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&TransportError> for LastError {
    fn from(err: &TransportError) -> Self {
        LastError {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for LastError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let connect = TransportError::connect(
            "/tmp/knitpi.sock",
            io::Error::new(io::ErrorKind::NotFound, "not found"),
        );
        assert_eq!(connect.kind(), ErrorKind::ConnectFailed);
        assert!(connect.kind().is_transport());

        let broken: TransportError = io::Error::new(io::ErrorKind::BrokenPipe, "pipe").into();
        assert_eq!(broken.kind(), ErrorKind::TransportBroken);
        assert!(broken.kind().is_transport());

        let malformed = TransportError::malformed(b"{not json", "expected value");
        assert_eq!(malformed.kind(), ErrorKind::MalformedResponse);
        assert!(!malformed.kind().is_transport());

        let violation = TransportError::ProtocolViolation("wrong tag".to_string());
        assert_eq!(violation.kind(), ErrorKind::ProtocolViolation);
        assert!(!violation.kind().is_transport());
    }

    #[test]
    fn test_error_display() {
        let connect = TransportError::connect(
            "/tmp/knitpi.sock",
            io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        );
        assert_eq!(
            connect.to_string(),
            "Connection to /tmp/knitpi.sock failed: refused"
        );

        let violation = TransportError::ProtocolViolation("expected bindata".to_string());
        assert_eq!(violation.to_string(), "Protocol violation: expected bindata");
    }

    #[test]
    fn test_last_error_snapshot() {
        let err = TransportError::peer_closed();
        let last = LastError::from(&err);
        assert_eq!(last.kind, ErrorKind::TransportBroken);
        assert!(last.message.contains("closed the connection"));
        assert!(last.to_string().starts_with("[transport_broken]"));
    }
}
