//! Transports for the probe: plain TCP or implicit TLS behind one interface.

mod config;
mod reader;
mod stream;

use std::future::Future;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tracing::debug;

pub use config::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL, FALLBACK_CLIENT_NAME,
    ProbeOptions,
};
pub use reader::{
    POLL_CHUNK_SIZE, PollBudget, READ_BUFFER_SIZE, TryRead, poll_read, read_until_terminator,
};
pub use stream::{connect_plain, connect_tls, default_tls_config, tls_config_with_roots};

use crate::error::{Error, Result};
use crate::parser::parse_reply;
use crate::types::{Endpoint, Reply, ReplyCode, Security};

/// A byte channel to an SMTP server, as the session sees it.
///
/// Implementations own their failure state: once unusable, a transport
/// stays unusable and every operation reports failure without touching the
/// network.
pub trait Transport {
    /// Returns true while the transport can still send and receive.
    fn is_usable(&self) -> bool;

    /// Takes the error that made the transport unusable, if one was kept.
    fn take_failure(&mut self) -> Option<Error> {
        None
    }

    /// Writes all of `data`, or nothing if the transport is unusable.
    fn send(&mut self, data: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Reads one reply's worth of text.
    fn receive(&mut self) -> impl Future<Output = Result<String>> + Send;

    /// Reads one reply and checks its code against `expected`.
    ///
    /// A reply that does not start with three digits counts as a mismatch.
    fn check_response(
        &mut self,
        expected: ReplyCode,
    ) -> impl Future<Output = Result<Reply>> + Send
    where
        Self: Send,
    {
        async move {
            let text = self.receive().await?;
            let reply = parse_reply(&text)?;
            if reply.code != expected {
                return Err(Error::UnexpectedReply {
                    expected,
                    actual: reply.code,
                    text: reply.text,
                });
            }
            Ok(reply)
        }
    }

    /// Releases the connection. Must not fail; errors are swallowed.
    fn close(&mut self) -> impl Future<Output = ()> + Send {
        async {}
    }
}

/// Opens transports for the validator.
pub trait Dial {
    /// Transport produced by this dialer.
    type Transport: Transport + Send;

    /// Connects to `endpoint`. Failure yields an unusable transport rather
    /// than an error.
    fn dial(
        &self,
        endpoint: &Endpoint,
        security: Security,
        options: &ProbeOptions,
    ) -> impl Future<Output = Self::Transport> + Send;
}

/// Dialer for real network connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkDialer;

impl Dial for NetworkDialer {
    type Transport = Connector;

    async fn dial(
        &self,
        endpoint: &Endpoint,
        security: Security,
        options: &ProbeOptions,
    ) -> Connector {
        Connector::connect(endpoint, security, options).await
    }
}

/// Connection to the server, plain or TLS.
#[derive(Debug)]
pub enum Connector {
    /// Plain TCP; replies are polled for.
    Plain {
        /// Connected socket.
        stream: TcpStream,
        /// How long to wait for each reply.
        budget: PollBudget,
    },
    /// Implicit TLS; replies are read up to the line terminator
    /// (boxed to reduce enum size).
    Tls(Box<TlsStream<TcpStream>>),
    /// Connection failed or was closed.
    Unusable(Option<Error>),
}

impl Connector {
    /// Opens a connection in the requested mode.
    ///
    /// Never fails: if resolution, connection or the handshake fails the
    /// connector is returned unusable, keeping the cause for
    /// [`Transport::take_failure`].
    pub async fn connect(endpoint: &Endpoint, security: Security, options: &ProbeOptions) -> Self {
        match Self::try_connect(endpoint, security, options).await {
            Ok(connector) => connector,
            Err(err) => {
                debug!(%endpoint, %security, kind = %err.kind(), error = %err, "connection unusable");
                Self::Unusable(Some(err))
            }
        }
    }

    /// Opens a connection in the requested mode.
    ///
    /// # Errors
    ///
    /// Returns an error if resolution, connection or the TLS handshake fails.
    pub async fn try_connect(
        endpoint: &Endpoint,
        security: Security,
        options: &ProbeOptions,
    ) -> Result<Self> {
        match security {
            Security::None => {
                let stream = connect_plain(endpoint).await?;
                Ok(Self::Plain {
                    stream,
                    budget: options.budget(),
                })
            }
            Security::Tls => {
                let config = match &options.tls_config {
                    Some(config) => config.clone(),
                    None => default_tls_config()?,
                };
                let stream = connect_tls(endpoint, options.connect_timeout, config).await?;
                Ok(Self::Tls(Box::new(stream)))
            }
        }
    }

    fn poison(&mut self) {
        *self = Self::Unusable(None);
    }
}

impl Transport for Connector {
    fn is_usable(&self) -> bool {
        !matches!(self, Self::Unusable(_))
    }

    fn take_failure(&mut self) -> Option<Error> {
        match self {
            Self::Unusable(failure) => failure.take(),
            _ => None,
        }
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let result = match self {
            Self::Plain { stream, .. } => stream.write_all(data).await,
            Self::Tls(stream) => match stream.write_all(data).await {
                Ok(()) => stream.flush().await,
                Err(e) => Err(e),
            },
            Self::Unusable(_) => return Err(Error::Unusable),
        };
        result.map_err(|e| {
            self.poison();
            Error::Io(e)
        })
    }

    async fn receive(&mut self) -> Result<String> {
        let result = match self {
            Self::Plain { stream, budget } => poll_read(&*stream, *budget).await,
            Self::Tls(stream) => read_until_terminator(&mut **stream).await,
            Self::Unusable(_) => return Err(Error::Unusable),
        };
        if matches!(result, Err(Error::Io(_) | Error::StreamClosed)) {
            self.poison();
        }
        result
    }

    /// Closes the connection: TLS close-notify first, then the socket.
    async fn close(&mut self) {
        match std::mem::replace(self, Self::Unusable(None)) {
            Self::Plain { mut stream, .. } => {
                let _ = stream.shutdown().await;
            }
            Self::Tls(mut stream) => {
                let _ = stream.shutdown().await;
            }
            Self::Unusable(failure) => *self = Self::Unusable(failure),
        }
    }
}
