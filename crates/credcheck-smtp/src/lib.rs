//! # credcheck-smtp
//!
//! Checks whether a login and password are accepted by an SMTP server.
//!
//! The probe connects (plain TCP or implicit TLS), waits for the greeting,
//! sends `HELO`, then walks through `AUTH LOGIN` with the base64-encoded
//! login and password. It never sends mail: the answer is a single boolean.
//!
//! ## Quick Start
//!
//! ```ignore
//! #[tokio::main]
//! async fn main() {
//!     let usable = credcheck_smtp::validate(
//!         "user@example.com",
//!         "app-password",
//!         "smtp.example.com",
//!         465,
//!         true,
//!     )
//!     .await;
//!     println!("{}", if usable { "valid" } else { "invalid" });
//! }
//! ```
//!
//! ## Diagnostics
//!
//! [`validate`] folds every failure into `false`. [`CredentialValidator::probe`]
//! returns the failing [`Step`] and an [`Error`] whose [`Error::kind`] tells
//! connection, TLS, protocol and stream failures apart. Each probe also runs
//! inside a `smtp_probe` tracing span; credentials are never logged.
//!
//! ## Modules
//!
//! - [`command`]: the three command lines the probe sends
//! - [`connection`]: plain and TLS transports, reply readers, options
//! - [`parser`]: reply code parser
//! - [`session`]: the handshake state machine
//! - [`types`]: credentials, endpoints, reply codes

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod session;
pub mod types;
mod validator;

pub use connection::{Connector, Dial, NetworkDialer, ProbeOptions, Transport};
pub use error::{Error, FailureKind, Result};
pub use session::{SmtpSession, Step, StepError};
pub use types::{Credentials, Endpoint, Reply, ReplyClass, ReplyCode, Security};
pub use validator::{CredentialValidator, validate, validate_blocking};
