//! The AUTH LOGIN handshake as a fixed sequence of steps.
//!
//! ```text
//! Greeting ──220──> Helo ──250──> AuthLogin ──334──> Username ──334──> Password ──235──> success
//!     │               │              │                  │                  │
//!     └───────────────┴──────────────┴──── any other reply ────────────────┴──> failed
//! ```
//!
//! Each step sends its command (the greeting step sends nothing), then reads
//! exactly one reply and checks its code before moving on.

use tracing::trace;

use crate::command::Command;
use crate::connection::Transport;
use crate::error::{Error, Result};
use crate::types::{Credentials, ReplyCode};

/// One step of the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    /// Wait for the server greeting.
    Greeting,
    /// Send `HELO`.
    Helo,
    /// Send `AUTH LOGIN`.
    AuthLogin,
    /// Send the base64 login.
    Username,
    /// Send the base64 password.
    Password,
}

impl Step {
    /// All steps, in protocol order.
    pub const ALL: [Self; 5] = [
        Self::Greeting,
        Self::Helo,
        Self::AuthLogin,
        Self::Username,
        Self::Password,
    ];

    /// Reply code that lets the handshake proceed past this step.
    #[must_use]
    pub const fn expected(self) -> ReplyCode {
        match self {
            Self::Greeting => ReplyCode::SERVICE_READY,
            Self::Helo => ReplyCode::OK,
            Self::AuthLogin | Self::Username => ReplyCode::AUTH_CONTINUE,
            Self::Password => ReplyCode::AUTH_SUCCEEDED,
        }
    }

    /// Step that follows this one, or `None` after the password.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Greeting => Some(Self::Helo),
            Self::Helo => Some(Self::AuthLogin),
            Self::AuthLogin => Some(Self::Username),
            Self::Username => Some(Self::Password),
            Self::Password => None,
        }
    }

    /// Short lowercase label, suitable for structured logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::Helo => "helo",
            Self::AuthLogin => "auth_login",
            Self::Username => "username",
            Self::Password => "password",
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of the handshake at a given step.
#[derive(Debug, thiserror::Error)]
#[error("{step} step failed: {source}")]
pub struct StepError {
    /// Step that failed.
    pub step: Step,
    /// What went wrong.
    #[source]
    pub source: Error,
}

/// Drives one AUTH LOGIN handshake over a transport.
///
/// The session borrows the transport; closing it is the caller's job.
#[derive(Debug)]
pub struct SmtpSession<'a, T> {
    transport: &'a mut T,
    credentials: &'a Credentials,
    client_name: String,
}

impl<'a, T> SmtpSession<'a, T>
where
    T: Transport + Send,
{
    /// Creates a session that will greet the server as `client_name`.
    pub fn new(
        transport: &'a mut T,
        credentials: &'a Credentials,
        client_name: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            credentials,
            client_name: client_name.into(),
        }
    }

    /// Runs every step in order, stopping at the first failure.
    ///
    /// Nothing is sent or read if the transport is already unusable.
    ///
    /// # Errors
    ///
    /// Returns the failing step and its cause.
    pub async fn run(mut self) -> std::result::Result<(), StepError> {
        let mut step = Some(Step::Greeting);
        while let Some(current) = step {
            self.advance(current)
                .await
                .map_err(|source| StepError {
                    step: current,
                    source,
                })?;
            step = current.next();
        }
        trace!("handshake complete");
        Ok(())
    }

    async fn advance(&mut self, step: Step) -> Result<()> {
        if !self.transport.is_usable() {
            return Err(self.transport.take_failure().unwrap_or(Error::Unusable));
        }

        if let Some(command) = self.command(step) {
            trace!(%step, ?command, "sending");
            self.transport.send(&command.serialize()).await?;
        }

        let reply = self.transport.check_response(step.expected()).await?;
        trace!(%step, code = %reply.code, "reply accepted");
        Ok(())
    }

    fn command(&self, step: Step) -> Option<Command> {
        match step {
            Step::Greeting => None,
            Step::Helo => Some(Command::helo(self.client_name.as_str())),
            Step::AuthLogin => Some(Command::AuthLogin),
            Step::Username => Some(Command::credential(self.credentials.login())),
            Step::Password => Some(Command::credential(self.credentials.password())),
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::similar_names
)]
pub(crate) mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::command::encode_credential;

    /// Transport that replays canned replies and records what was sent.
    #[derive(Debug, Default)]
    pub(crate) struct ScriptedTransport {
        pub replies: VecDeque<String>,
        pub sent: Vec<String>,
        pub reads: usize,
        pub unusable: bool,
        pub closed: bool,
    }

    impl ScriptedTransport {
        pub(crate) fn with_codes(codes: &[u16]) -> Self {
            Self {
                replies: codes.iter().map(|c| format!("{c} ok\r\n")).collect(),
                ..Self::default()
            }
        }

        pub(crate) fn unusable() -> Self {
            Self {
                unusable: true,
                ..Self::default()
            }
        }
    }

    impl Transport for ScriptedTransport {
        fn is_usable(&self) -> bool {
            !self.unusable
        }

        async fn send(&mut self, data: &[u8]) -> Result<()> {
            if self.unusable {
                return Err(Error::Unusable);
            }
            self.sent.push(String::from_utf8_lossy(data).into_owned());
            Ok(())
        }

        async fn receive(&mut self) -> Result<String> {
            if self.unusable {
                return Err(Error::Unusable);
            }
            self.reads += 1;
            self.replies.pop_front().ok_or(Error::StreamClosed)
        }

        async fn close(&mut self) {
            self.closed = true;
            self.unusable = true;
        }
    }

    const HAPPY: [u16; 5] = [220, 250, 334, 334, 235];

    async fn run(transport: &mut ScriptedTransport) -> std::result::Result<(), StepError> {
        let credentials = Credentials::new("user", "pass");
        SmtpSession::new(transport, &credentials, "client.test")
            .run()
            .await
    }

    #[test]
    fn test_step_table() {
        let expected: Vec<u16> = Step::ALL.iter().map(|s| s.expected().as_u16()).collect();
        assert_eq!(expected, HAPPY);

        let mut order = vec![Step::Greeting];
        while let Some(next) = order.last().and_then(|s| s.next()) {
            order.push(next);
        }
        assert_eq!(order, Step::ALL);
    }

    #[tokio::test]
    async fn test_full_handshake() {
        let mut transport = ScriptedTransport::with_codes(&HAPPY);

        run(&mut transport).await.unwrap();

        assert_eq!(transport.reads, 5);
        assert_eq!(
            transport.sent,
            vec![
                "HELO client.test\r\n".to_string(),
                "AUTH LOGIN\r\n".to_string(),
                format!("{}\r\n", encode_credential("user")),
                format!("{}\r\n", encode_credential("pass")),
            ]
        );
    }

    #[tokio::test]
    async fn test_bad_credentials_reads_five_replies() {
        let mut transport = ScriptedTransport::with_codes(&[220, 250, 334, 334, 535]);

        let err = run(&mut transport).await.unwrap_err();

        assert_eq!(err.step, Step::Password);
        assert!(err.source.is_auth_rejected());
        assert_eq!(transport.reads, 5);
        assert_eq!(transport.sent.len(), 4);
    }

    #[tokio::test]
    async fn test_mismatch_at_each_step_stops_the_handshake() {
        for (index, step) in Step::ALL.iter().enumerate() {
            let mut codes = HAPPY.to_vec();
            codes[index] = 554;
            let mut transport = ScriptedTransport::with_codes(&codes);

            let err = run(&mut transport).await.unwrap_err();

            assert_eq!(err.step, *step);
            assert_eq!(err.source.kind(), crate::FailureKind::Protocol);
            assert_eq!(transport.reads, index + 1, "reads at {step}");
            // The greeting step sends nothing; every later step sends one line
            assert_eq!(transport.sent.len(), index, "sends at {step}");
            assert_eq!(transport.replies.len(), 4 - index);
        }
    }

    #[tokio::test]
    async fn test_unusable_transport_is_never_read() {
        let mut transport = ScriptedTransport::unusable();

        let err = run(&mut transport).await.unwrap_err();

        assert_eq!(err.step, Step::Greeting);
        assert!(matches!(err.source, Error::Unusable));
        assert_eq!(transport.reads, 0);
        assert!(transport.sent.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_reply_is_a_mismatch() {
        let mut transport = ScriptedTransport::default();
        transport.replies.push_back("220 ready\r\n".into());
        transport.replies.push_back("hello\r\n".into());

        let err = run(&mut transport).await.unwrap_err();

        assert_eq!(err.step, Step::Helo);
        assert!(matches!(err.source, Error::MalformedReply(_)));
        assert_eq!(transport.sent.len(), 1);
    }

    #[tokio::test]
    async fn test_server_hangs_up() {
        let mut transport = ScriptedTransport::with_codes(&[220, 250]);

        let err = run(&mut transport).await.unwrap_err();

        assert_eq!(err.step, Step::AuthLogin);
        assert_eq!(err.source.kind(), crate::FailureKind::StreamExhausted);
    }
}
