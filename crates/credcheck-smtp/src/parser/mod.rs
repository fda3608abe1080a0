//! SMTP reply parser.
//!
//! The probe only cares about the three-digit code at the start of a reply:
//! `235 2.7.0 Authentication successful\r\n` parses to code 235.

use crate::error::{Error, Result};
use crate::types::{Reply, ReplyCode};

/// SMTP line terminator.
pub const CRLF: &str = "\r\n";

/// Parses the reply code from the first three characters of `text`.
///
/// Anything after the code is kept as the reply text (minus trailing line
/// terminators). Multi-line replies are not split: the first code wins.
///
/// # Errors
///
/// Returns [`Error::MalformedReply`] if the text is shorter than three
/// characters or they are not all ASCII digits.
pub fn parse_reply(text: &str) -> Result<Reply> {
    let code = parse_code(text).ok_or_else(|| Error::MalformedReply(text.to_string()))?;
    Ok(Reply::new(code, text.trim_end_matches(['\r', '\n'])))
}

fn parse_code(text: &str) -> Option<ReplyCode> {
    let digits = text.as_bytes().get(..3)?;
    if !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let code = digits
        .iter()
        .fold(0u16, |acc, d| acc * 10 + u16::from(d - b'0'));
    Some(ReplyCode::new(code))
}

/// Returns true if `text` contains a complete line.
#[must_use]
pub fn has_terminator(text: &str) -> bool {
    text.contains(CRLF)
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
    use proptest::prelude::*;

    #[test]
    fn test_parse_greeting() {
        let reply = parse_reply("220 smtp.example.com ESMTP ready\r\n").unwrap();
        assert_eq!(reply.code, ReplyCode::SERVICE_READY);
        assert_eq!(reply.text, "220 smtp.example.com ESMTP ready");
    }

    #[test]
    fn test_parse_bare_code() {
        let reply = parse_reply("334").unwrap();
        assert_eq!(reply.code, ReplyCode::AUTH_CONTINUE);
    }

    #[test]
    fn test_parse_continuation_keeps_first_code() {
        let reply = parse_reply("250-smtp.test\r\n250 AUTH LOGIN\r\n").unwrap();
        assert_eq!(reply.code, ReplyCode::OK);
    }

    #[test]
    fn test_parse_error_too_short() {
        assert!(matches!(parse_reply("25"), Err(Error::MalformedReply(_))));
        assert!(matches!(parse_reply(""), Err(Error::MalformedReply(_))));
    }

    #[test]
    fn test_parse_error_non_numeric() {
        assert!(parse_reply("ABC OK").is_err());
        assert!(parse_reply("2x0 OK").is_err());
        assert!(parse_reply(" 25 OK").is_err());
    }

    #[test]
    fn test_parse_error_multibyte_prefix() {
        // Three characters but not three bytes of digits
        assert!(parse_reply("2é0 OK").is_err());
    }

    #[test]
    fn test_has_terminator() {
        assert!(has_terminator("250 OK\r\n"));
        assert!(!has_terminator("250 OK\n"));
        assert!(!has_terminator("250 OK\r"));
    }

    proptest! {
        #[test]
        fn parse_never_panics(text in ".*") {
            let _ = parse_reply(&text);
        }

        #[test]
        fn any_three_digits_parse(code in 0u16..1000, rest in "[ -~]*") {
            let text = format!("{code:03}{rest}");
            let reply = parse_reply(&text).unwrap();
            prop_assert_eq!(reply.code.as_u16(), code);
        }
    }
}
