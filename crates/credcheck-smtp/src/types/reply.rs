//! Server replies and their codes.

/// A single server reply, as read by the probe.
///
/// Continuation lines are not joined: whatever the reader returned is kept
/// verbatim in `text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Three-digit status.
    pub code: ReplyCode,
    /// Reply text with the trailing line terminator removed.
    pub text: String,
}

impl Reply {
    /// Pairs a code with the text it arrived in.
    #[must_use]
    pub fn new(code: ReplyCode, text: impl Into<String>) -> Self {
        Self {
            code,
            text: text.into(),
        }
    }
}

/// First digit of a reply code, as RFC 5321 groups them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyClass {
    /// 2yz: the command was accepted.
    Completed,
    /// 3yz: the server wants more input.
    Intermediate,
    /// 4yz: try again later.
    Transient,
    /// 5yz: the command was refused.
    Permanent,
    /// Anything outside 200..=599.
    Unknown,
}

/// Numeric SMTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReplyCode(u16);

impl ReplyCode {
    /// Server greeting.
    pub const SERVICE_READY: Self = Self(220);
    /// Login accepted.
    pub const AUTH_SUCCEEDED: Self = Self(235);
    /// Generic acknowledgement, the answer to `HELO`.
    pub const OK: Self = Self(250);
    /// Challenge; send the next credential line.
    pub const AUTH_CONTINUE: Self = Self(334);
    /// Server is shutting the channel down.
    pub const SERVICE_UNAVAILABLE: Self = Self(421);
    /// Login or password refused.
    pub const AUTH_FAILED: Self = Self(535);

    /// Wraps a raw code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Raw numeric value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Groups the code by its first digit.
    #[must_use]
    pub const fn class(self) -> ReplyClass {
        match self.0 / 100 {
            2 => ReplyClass::Completed,
            3 => ReplyClass::Intermediate,
            4 => ReplyClass::Transient,
            5 => ReplyClass::Permanent,
            _ => ReplyClass::Unknown,
        }
    }
}

impl std::fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_classes_follow_first_digit() {
        assert_eq!(ReplyCode::SERVICE_READY.class(), ReplyClass::Completed);
        assert_eq!(ReplyCode::AUTH_SUCCEEDED.class(), ReplyClass::Completed);
        assert_eq!(ReplyCode::AUTH_CONTINUE.class(), ReplyClass::Intermediate);
        assert_eq!(ReplyCode::SERVICE_UNAVAILABLE.class(), ReplyClass::Transient);
        assert_eq!(ReplyCode::AUTH_FAILED.class(), ReplyClass::Permanent);
        assert_eq!(ReplyCode::new(999).class(), ReplyClass::Unknown);
        assert_eq!(ReplyCode::new(0).class(), ReplyClass::Unknown);
    }

    #[test]
    fn test_display_is_numeric() {
        assert_eq!(ReplyCode::OK.to_string(), "250");
        assert_eq!(ReplyCode::new(334), ReplyCode::AUTH_CONTINUE);
        assert_eq!(ReplyCode::AUTH_FAILED.as_u16(), 535);
    }
}
