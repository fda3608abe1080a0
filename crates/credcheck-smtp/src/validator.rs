//! Public entry point: is this login usable on this server?

use tracing::{Instrument, info, info_span, warn};

use crate::connection::{Dial, NetworkDialer, ProbeOptions, Transport};
use crate::session::{SmtpSession, StepError};
use crate::types::{Credentials, Endpoint, Security};

/// Checks credentials against an SMTP server with one AUTH LOGIN handshake.
///
/// Every call opens its own connection and releases it before returning,
/// so a validator can be shared between concurrent probes.
#[derive(Debug, Clone, Default)]
pub struct CredentialValidator<D = NetworkDialer> {
    dialer: D,
    options: ProbeOptions,
}

impl CredentialValidator {
    /// Creates a validator with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a validator with the given options.
    #[must_use]
    pub fn with_options(options: ProbeOptions) -> Self {
        Self {
            dialer: NetworkDialer,
            options,
        }
    }
}

impl<D> CredentialValidator<D>
where
    D: Dial + Sync,
{
    /// Creates a validator that opens transports through `dialer`.
    pub const fn with_dialer(dialer: D, options: ProbeOptions) -> Self {
        Self { dialer, options }
    }

    /// Returns the probe options.
    pub const fn options(&self) -> &ProbeOptions {
        &self.options
    }

    /// Runs the handshake and reports where it failed.
    ///
    /// Connection problems surface as a failure of the greeting step.
    ///
    /// # Errors
    ///
    /// Returns the first step whose reply was missing or unexpected.
    pub async fn probe(
        &self,
        credentials: &Credentials,
        endpoint: &Endpoint,
        security: Security,
    ) -> Result<(), StepError> {
        let span = info_span!("smtp_probe", %endpoint, %security);
        async {
            let mut transport = self.dialer.dial(endpoint, security, &self.options).await;
            let result = SmtpSession::new(&mut transport, credentials, self.options.helo_name())
                .run()
                .await;
            transport.close().await;

            match &result {
                Ok(()) => info!("credentials accepted"),
                Err(err) => info!(
                    step = %err.step,
                    kind = %err.source.kind(),
                    transient = err.source.is_transient(),
                    error = %err.source,
                    "credentials not usable"
                ),
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Returns true if the server accepted `login` and `password`.
    ///
    /// Unreachable hosts, closed ports, TLS failures, protocol surprises and
    /// wrong credentials all yield `false`.
    pub async fn validate(
        &self,
        login: &str,
        password: &str,
        host: &str,
        port: u16,
        use_tls: bool,
    ) -> bool {
        let credentials = Credentials::new(login, password);
        let endpoint = Endpoint::new(host, port);
        self.probe(&credentials, &endpoint, Security::from(use_tls))
            .await
            .is_ok()
    }
}

/// Returns true if the server accepted `login` and `password`, using
/// default options.
pub async fn validate(login: &str, password: &str, host: &str, port: u16, use_tls: bool) -> bool {
    CredentialValidator::new()
        .validate(login, password, host, port, use_tls)
        .await
}

/// Blocking form of [`validate`] for synchronous callers.
///
/// Runs the whole probe on a private current-thread runtime. Called from
/// inside an async runtime it cannot block, and returns `false`.
#[must_use]
pub fn validate_blocking(
    login: &str,
    password: &str,
    host: &str,
    port: u16,
    use_tls: bool,
) -> bool {
    if tokio::runtime::Handle::try_current().is_ok() {
        warn!("blocking credential probe called from an async runtime; use validate instead");
        return false;
    }
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            warn!(error = %e, "could not start runtime for credential probe");
            return false;
        }
    };
    runtime.block_on(validate(login, password, host, port, use_tls))
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::similar_names
)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::error::{Error, Result};
    use crate::session::Step;
    use crate::session::tests::ScriptedTransport;

    /// Hands its final state to the test when the validator drops it.
    struct Reporting {
        inner: ScriptedTransport,
        slot: Arc<Mutex<Option<ScriptedTransport>>>,
    }

    impl Drop for Reporting {
        fn drop(&mut self) {
            *self.slot.lock().unwrap() = Some(std::mem::take(&mut self.inner));
        }
    }

    impl Transport for Reporting {
        fn is_usable(&self) -> bool {
            self.inner.is_usable()
        }

        async fn send(&mut self, data: &[u8]) -> Result<()> {
            self.inner.send(data).await
        }

        async fn receive(&mut self) -> Result<String> {
            self.inner.receive().await
        }

        async fn close(&mut self) {
            self.inner.close().await;
        }
    }

    #[derive(Default)]
    struct ScriptedDialer {
        codes: Vec<u16>,
        unreachable: bool,
        last: Arc<Mutex<Option<ScriptedTransport>>>,
        dialled: Mutex<Vec<(Endpoint, Security)>>,
    }

    impl ScriptedDialer {
        fn replying(codes: &[u16]) -> Self {
            Self {
                codes: codes.to_vec(),
                ..Self::default()
            }
        }

        fn last(&self) -> ScriptedTransport {
            self.last.lock().unwrap().take().unwrap()
        }
    }

    impl Dial for ScriptedDialer {
        type Transport = Reporting;

        async fn dial(
            &self,
            endpoint: &Endpoint,
            security: Security,
            _options: &ProbeOptions,
        ) -> Reporting {
            self.dialled
                .lock()
                .unwrap()
                .push((endpoint.clone(), security));
            let inner = if self.unreachable {
                ScriptedTransport::unusable()
            } else {
                ScriptedTransport::with_codes(&self.codes)
            };
            Reporting {
                inner,
                slot: self.last.clone(),
            }
        }
    }

    fn validator(dialer: ScriptedDialer) -> CredentialValidator<ScriptedDialer> {
        CredentialValidator::with_dialer(dialer, ProbeOptions::new().client_name("client.test"))
    }

    #[tokio::test]
    async fn test_accepted_credentials() {
        let validator = validator(ScriptedDialer::replying(&[220, 250, 334, 334, 235]));

        assert!(validator.validate("user", "pass", "smtp.test", 587, false).await);

        let transport = validator.dialer.last();
        assert_eq!(transport.reads, 5);
        assert!(transport.closed);
        assert_eq!(
            *validator.dialer.dialled.lock().unwrap(),
            vec![(Endpoint::new("smtp.test", 587), Security::None)]
        );
    }

    #[tokio::test]
    async fn test_rejected_credentials() {
        let validator = validator(ScriptedDialer::replying(&[220, 250, 334, 334, 535]));

        assert!(!validator.validate("user", "wrong", "smtp.test", 587, false).await);

        let transport = validator.dialer.last();
        assert_eq!(transport.reads, 5);
        assert!(transport.closed);
    }

    #[tokio::test]
    async fn test_tls_flag_selects_tls() {
        let validator = validator(ScriptedDialer::replying(&[220, 250, 334, 334, 235]));

        assert!(validator.validate("user", "pass", "smtp.test", 465, true).await);

        assert_eq!(
            validator.dialer.dialled.lock().unwrap()[0].1,
            Security::Tls
        );
    }

    #[tokio::test]
    async fn test_unreachable_host_reads_nothing() {
        let validator = validator(ScriptedDialer {
            unreachable: true,
            ..ScriptedDialer::default()
        });

        let err = validator
            .probe(
                &Credentials::new("user", "pass"),
                &Endpoint::new("smtp.test", 587),
                Security::None,
            )
            .await
            .unwrap_err();

        assert_eq!(err.step, Step::Greeting);
        assert!(matches!(err.source, Error::Unusable));
        let transport = validator.dialer.last();
        assert_eq!(transport.reads, 0);
        assert!(transport.sent.is_empty());
    }

    #[tokio::test]
    async fn test_early_failure_still_closes() {
        let validator = validator(ScriptedDialer::replying(&[421]));

        assert!(!validator.validate("user", "pass", "smtp.test", 587, false).await);

        let transport = validator.dialer.last();
        assert_eq!(transport.reads, 1);
        assert!(transport.sent.is_empty());
        assert!(transport.closed);
    }

    #[tokio::test]
    async fn test_probe_reports_failing_step() {
        let validator = validator(ScriptedDialer::replying(&[220, 250, 504]));

        let err = validator
            .probe(
                &Credentials::new("user", "pass"),
                &Endpoint::new("smtp.test", 587),
                Security::None,
            )
            .await
            .unwrap_err();

        assert_eq!(err.step, Step::AuthLogin);
        assert_eq!(err.source.kind(), crate::FailureKind::Protocol);
    }

    #[tokio::test]
    async fn test_unresolvable_host_over_network() {
        assert!(!validate("user", "pass", "host.invalid", 587, false).await);
    }

    #[test]
    fn test_blocking_wrapper() {
        assert!(!validate_blocking("user", "pass", "host.invalid", 465, true));
    }

    #[tokio::test]
    async fn test_blocking_wrapper_inside_runtime_returns_false() {
        let result = std::panic::catch_unwind(|| {
            validate_blocking("user", "pass", "host.invalid", 25, false)
        });
        assert!(matches!(result, Ok(false)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocking_wrapper_inside_multi_thread_runtime() {
        assert!(!validate_blocking("user", "pass", "host.invalid", 25, false));
    }
}
