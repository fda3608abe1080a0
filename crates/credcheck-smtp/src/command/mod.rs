//! SMTP command builder.

use base64::Engine;

/// SMTP command sent by the probe.
#[derive(Clone, PartialEq, Eq)]
pub enum Command {
    /// HELO - Simple greeting
    Helo {
        /// Client hostname
        hostname: String,
    },
    /// AUTH LOGIN - Begin LOGIN authentication
    AuthLogin,
    /// Base64 answer to a 334 challenge
    Credential {
        /// Base64-encoded login or password
        encoded: String,
    },
}

impl Command {
    /// Builds a HELO command.
    #[must_use]
    pub fn helo(hostname: impl Into<String>) -> Self {
        Self::Helo {
            hostname: hostname.into(),
        }
    }

    /// Builds a challenge answer carrying base64 of `value`'s UTF-8 bytes.
    #[must_use]
    pub fn credential(value: &str) -> Self {
        Self::Credential {
            encoded: encode_credential(value),
        }
    }

    /// Serializes the command to bytes, CRLF included.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();

        match self {
            Self::Helo { hostname } => {
                buf.extend_from_slice(b"HELO ");
                buf.extend_from_slice(hostname.as_bytes());
            }
            Self::AuthLogin => {
                buf.extend_from_slice(b"AUTH LOGIN");
            }
            Self::Credential { encoded } => {
                buf.extend_from_slice(encoded.as_bytes());
            }
        }

        buf.extend_from_slice(b"\r\n");
        buf
    }
}

// Credential lines are redacted.
impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Helo { hostname } => f.debug_struct("Helo").field("hostname", hostname).finish(),
            Self::AuthLogin => f.write_str("AuthLogin"),
            Self::Credential { .. } => f.write_str("Credential(<redacted>)"),
        }
    }
}

/// Encodes a login or password the way AUTH LOGIN expects it.
#[must_use]
pub fn encode_credential(value: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(value.as_bytes())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_helo() {
        assert_eq!(Command::helo("client.test").serialize(), b"HELO client.test\r\n");
    }

    #[test]
    fn test_auth_login() {
        assert_eq!(Command::AuthLogin.serialize(), b"AUTH LOGIN\r\n");
    }

    #[test]
    fn test_credential_line() {
        assert_eq!(Command::credential("user").serialize(), b"dXNlcg==\r\n");
        assert_eq!(Command::credential("").serialize(), b"\r\n");
    }

    #[test]
    fn test_login_encoding_reverses() {
        let encoded = encode_credential("user@example.com");
        assert_eq!(encoded, "dXNlckBleGFtcGxlLmNvbQ==");
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&encoded)
            .unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), "user@example.com");
    }

    #[test]
    fn test_non_ascii_password_is_utf8_encoded() {
        // "пароль" as UTF-8
        assert_eq!(encode_credential("пароль"), "0L/QsNGA0L7Qu9GM");
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let debug = format!("{:?}", Command::credential("secret"));
        assert_eq!(debug, "Credential(<redacted>)");
        assert!(!debug.contains(&encode_credential("secret")));
    }
}
