//! Error types for credential probes.

use std::io;
use std::time::Duration;

use crate::types::{ReplyClass, ReplyCode};

/// Result type alias for probe operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of a probe failure.
///
/// Every variant collapses to `false` at the [`crate::validate`] boundary;
/// the classification exists for tracing and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Host unresolvable, connection refused or connect timeout.
    Connect,
    /// TLS negotiation rejected.
    Handshake,
    /// Unexpected or unparseable reply code.
    Protocol,
    /// Peer closed the stream or stayed silent past the read budget.
    StreamExhausted,
    /// Operation attempted on a transport that is no longer usable.
    Unusable,
}

impl FailureKind {
    /// Returns a short lowercase label, suitable for structured logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Handshake => "handshake",
            Self::Protocol => "protocol",
            Self::StreamExhausted => "stream_exhausted",
            Self::Unusable => "unusable",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Probe error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Host name did not resolve to any address.
    #[error("Could not resolve {host}: {source}")]
    Resolve {
        /// Host that failed to resolve.
        host: String,
        /// Underlying resolver error.
        #[source]
        source: io::Error,
    },

    /// TCP connection could not be established.
    #[error("Connection to {endpoint} failed: {source}")]
    Connect {
        /// `host:port` that was dialled.
        endpoint: String,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },

    /// TCP connection did not complete within the connect timeout.
    #[error("Connection to {endpoint} timed out after {timeout:?}")]
    ConnectTimeout {
        /// `host:port` that was dialled.
        endpoint: String,
        /// Timeout that elapsed.
        timeout: Duration,
    },

    /// Host name is not a valid TLS server name.
    #[error("Invalid server name: {0}")]
    InvalidServerName(String),

    /// TLS handshake failed (certificate rejected, protocol mismatch).
    #[error("TLS handshake with {host} failed: {source}")]
    Handshake {
        /// Host the certificate was checked against.
        host: String,
        /// Underlying handshake error.
        #[source]
        source: io::Error,
    },

    /// TLS configuration could not be built.
    #[error("TLS configuration error: {0}")]
    Tls(#[from] rustls::Error),

    /// Server answered with a code other than the one the step requires.
    #[error("Expected reply {expected}, got {actual}: {text}")]
    UnexpectedReply {
        /// Code the step requires.
        expected: ReplyCode,
        /// Code the server sent.
        actual: ReplyCode,
        /// Raw reply text, trimmed.
        text: String,
    },

    /// Reply did not start with a three-digit code.
    #[error("Malformed reply: {0:?}")]
    MalformedReply(String),

    /// Peer closed the connection before a reply arrived.
    #[error("Connection closed by server")]
    StreamClosed,

    /// No reply bytes became available within the polling budget.
    #[error("No reply after {attempts} polls")]
    ReplyTimeout {
        /// Number of polls performed.
        attempts: u32,
    },

    /// Transport is unusable (never connected, or failed earlier).
    #[error("Transport is not usable")]
    Unusable,

    /// I/O error on an established connection.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Returns the failure classification for this error.
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::Resolve { .. } | Self::Connect { .. } | Self::ConnectTimeout { .. } => {
                FailureKind::Connect
            }
            Self::InvalidServerName(_) | Self::Handshake { .. } | Self::Tls(_) => {
                FailureKind::Handshake
            }
            Self::UnexpectedReply { .. } | Self::MalformedReply(_) => FailureKind::Protocol,
            Self::StreamClosed | Self::ReplyTimeout { .. } | Self::Io(_) => {
                FailureKind::StreamExhausted
            }
            Self::Unusable => FailureKind::Unusable,
        }
    }

    /// Returns true if the server rejected the credentials themselves
    /// (535 in answer to the password).
    #[must_use]
    pub fn is_auth_rejected(&self) -> bool {
        matches!(self, Self::UnexpectedReply { actual, .. } if *actual == ReplyCode::AUTH_FAILED)
    }

    /// Returns true if the server refused with a 4yz code, so the same
    /// probe might pass later.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::UnexpectedReply { actual, .. } if matches!(actual.class(), ReplyClass::Transient)
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_errors_classify_as_connect() {
        let err = Error::ConnectTimeout {
            endpoint: "smtp.test:465".into(),
            timeout: Duration::from_secs(2),
        };
        assert_eq!(err.kind(), FailureKind::Connect);

        let err = Error::Resolve {
            host: "nowhere.invalid".into(),
            source: io::Error::new(io::ErrorKind::NotFound, "no addresses"),
        };
        assert_eq!(err.kind(), FailureKind::Connect);
    }

    #[test]
    fn test_reply_errors_classify_as_protocol() {
        let err = Error::UnexpectedReply {
            expected: ReplyCode::AUTH_SUCCEEDED,
            actual: ReplyCode::AUTH_FAILED,
            text: "535 5.7.8 Authentication failed".into(),
        };
        assert_eq!(err.kind(), FailureKind::Protocol);
        assert!(err.is_auth_rejected());

        let err = Error::MalformedReply("OK".into());
        assert_eq!(err.kind(), FailureKind::Protocol);
        assert!(!err.is_auth_rejected());
    }

    #[test]
    fn test_closed_stream_is_exhaustion() {
        assert_eq!(Error::StreamClosed.kind(), FailureKind::StreamExhausted);
        assert_eq!(
            Error::ReplyTimeout { attempts: 100 }.kind(),
            FailureKind::StreamExhausted
        );
    }

    #[test]
    fn test_display_messages() {
        let err = Error::UnexpectedReply {
            expected: ReplyCode::SERVICE_READY,
            actual: ReplyCode::SERVICE_UNAVAILABLE,
            text: "421 busy".into(),
        };
        assert_eq!(err.to_string(), "Expected reply 220, got 421: 421 busy");
        assert!(err.is_transient());
        assert!(!Error::StreamClosed.is_transient());
        assert_eq!(FailureKind::StreamExhausted.to_string(), "stream_exhausted");
    }
}
