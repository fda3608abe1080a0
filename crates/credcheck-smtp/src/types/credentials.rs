//! Login credentials and the server they are checked against.

use std::fmt;

/// Login and password pair.
///
/// Both are opaque; no character set is enforced. The `Debug`
/// implementation never prints the password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    login: String,
    password: String,
}

impl Credentials {
    /// Creates a credential pair.
    #[must_use]
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }

    /// Returns the login.
    #[must_use]
    pub fn login(&self) -> &str {
        &self.login
    }

    /// Returns the password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Server address: host name (or IP literal) and port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Host name or literal IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl Endpoint {
    /// Creates an endpoint.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // IPv6 literals need brackets to be dialable
        if self.host.contains(':') && !self.host.starts_with('[') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Transport security for the probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// Plain TCP. Credentials travel base64-encoded but unencrypted.
    #[default]
    None,
    /// TLS from the first byte (implicit TLS, usually port 465).
    Tls,
}

impl Security {
    /// Returns the conventional port for this mode.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::None => 587,
            Self::Tls => 465,
        }
    }

    /// Returns true if the connection is encrypted.
    #[must_use]
    pub const fn is_encrypted(self) -> bool {
        matches!(self, Self::Tls)
    }
}

impl From<bool> for Security {
    fn from(use_tls: bool) -> Self {
        if use_tls { Self::Tls } else { Self::None }
    }
}

impl fmt::Display for Security {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "plain",
            Self::Tls => "tls",
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_password() {
        let creds = Credentials::new("user@example.com", "hunter2");
        let debug = format!("{creds:?}");
        assert!(debug.contains("user@example.com"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_endpoint_display() {
        assert_eq!(Endpoint::new("smtp.test", 587).to_string(), "smtp.test:587");
        assert_eq!(Endpoint::new("127.0.0.1", 25).to_string(), "127.0.0.1:25");
        assert_eq!(Endpoint::new("::1", 465).to_string(), "[::1]:465");
        assert_eq!(Endpoint::new("[::1]", 465).to_string(), "[::1]:465");
    }

    #[test]
    fn test_security_from_flag() {
        assert_eq!(Security::from(true), Security::Tls);
        assert_eq!(Security::from(false), Security::None);
        assert!(Security::Tls.is_encrypted());
        assert_eq!(Security::Tls.default_port(), 465);
        assert_eq!(Security::None.default_port(), 587);
    }
}
