//! Probe configuration.

use std::sync::Arc;
use std::time::Duration;

use rustls::ClientConfig;

use super::reader::PollBudget;

/// Default connect timeout for the TLS transport.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Default pause between polls of the plain transport.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default number of polls before the plain transport gives up on a reply.
pub const DEFAULT_POLL_ATTEMPTS: u32 = 100;

/// Name sent in HELO when the local host name cannot be determined.
pub const FALLBACK_CLIENT_NAME: &str = "localhost";

/// Tunables for a credential probe.
#[derive(Debug, Clone)]
pub struct ProbeOptions {
    /// Bound on TCP connect and TLS handshake (TLS transport only).
    pub connect_timeout: Duration,
    /// Pause between polls for a reply (plain transport only).
    pub poll_interval: Duration,
    /// Polls before a missing reply counts as failure (plain transport only).
    pub poll_attempts: u32,
    /// Name sent in HELO. `None` means the local host name.
    pub client_name: Option<String>,
    /// TLS client configuration. `None` means webpki roots.
    pub tls_config: Option<Arc<ClientConfig>>,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_attempts: DEFAULT_POLL_ATTEMPTS,
            client_name: None,
            tls_config: None,
        }
    }
}

impl ProbeOptions {
    /// Creates options with the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the connect timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the polling interval and attempt count.
    #[must_use]
    pub const fn poll_budget(mut self, interval: Duration, attempts: u32) -> Self {
        self.poll_interval = interval;
        self.poll_attempts = attempts;
        self
    }

    /// Sets the name sent in HELO.
    #[must_use]
    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = Some(name.into());
        self
    }

    /// Sets the TLS client configuration.
    #[must_use]
    pub fn tls_config(mut self, config: Arc<ClientConfig>) -> Self {
        self.tls_config = Some(config);
        self
    }

    /// Returns the polling budget of the plain transport.
    #[must_use]
    pub const fn budget(&self) -> PollBudget {
        PollBudget::new(self.poll_interval, self.poll_attempts)
    }

    /// Returns the name to send in HELO.
    ///
    /// Falls back to the local host name, then to `localhost`.
    #[must_use]
    pub fn helo_name(&self) -> String {
        self.client_name
            .clone()
            .or_else(local_hostname)
            .unwrap_or_else(|| FALLBACK_CLIENT_NAME.to_string())
    }
}

fn local_hostname() -> Option<String> {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.trim().is_empty())
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ProbeOptions::new();
        assert_eq!(options.connect_timeout, Duration::from_secs(2));
        assert_eq!(options.budget(), PollBudget::default());
        assert!(options.client_name.is_none());
        assert!(options.tls_config.is_none());
    }

    #[test]
    fn test_setters() {
        let options = ProbeOptions::new()
            .connect_timeout(Duration::from_secs(5))
            .poll_budget(Duration::from_millis(10), 3)
            .client_name("probe.test");
        assert_eq!(options.connect_timeout, Duration::from_secs(5));
        assert_eq!(options.budget().total(), Duration::from_millis(30));
        assert_eq!(options.helo_name(), "probe.test");
    }

    #[test]
    fn test_helo_name_never_empty() {
        assert!(!ProbeOptions::new().helo_name().is_empty());
    }
}
