//! Core probe types.

mod credentials;
mod reply;

pub use credentials::{Credentials, Endpoint, Security};
pub use reply::{Reply, ReplyClass, ReplyCode};
