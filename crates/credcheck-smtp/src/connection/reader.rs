//! Reply readers.
//!
//! The two transports read replies differently. The plain transport polls
//! for buffered bytes and takes a single chunk; the TLS transport keeps
//! reading until it has seen a line terminator.

use std::io;
use std::time::Duration;

use encoding_rs::{CoderResult, Decoder, UTF_8};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpStream;
use tracing::trace;

use crate::error::{Error, Result};
use crate::parser::has_terminator;

/// Buffer size for a single polled chunk.
pub const POLL_CHUNK_SIZE: usize = 1024;

/// Buffer size for each read of the terminator-seeking reader.
pub const READ_BUFFER_SIZE: usize = 2048;

/// Non-blocking read of whatever is currently buffered.
pub trait TryRead {
    /// Reads available bytes, or fails with [`io::ErrorKind::WouldBlock`]
    /// if there are none. `Ok(0)` means the peer closed the stream.
    ///
    /// # Errors
    ///
    /// Returns `WouldBlock` when nothing is available, or any other I/O
    /// error from the underlying source.
    fn try_read(&self, buf: &mut [u8]) -> io::Result<usize>;
}

impl TryRead for TcpStream {
    fn try_read(&self, buf: &mut [u8]) -> io::Result<usize> {
        Self::try_read(self, buf)
    }
}

/// How long the polling reader waits for a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
    /// Pause between polls.
    pub interval: Duration,
    /// Number of polls before giving up.
    pub attempts: u32,
}

impl PollBudget {
    /// Creates a budget.
    #[must_use]
    pub const fn new(interval: Duration, attempts: u32) -> Self {
        Self { interval, attempts }
    }

    /// Upper bound on the time spent waiting, saturating at [`Duration::MAX`].
    #[must_use]
    pub const fn total(self) -> Duration {
        self.interval.saturating_mul(self.attempts)
    }
}

impl Default for PollBudget {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), 100)
    }
}

/// Polls `source` until bytes are available and returns that one chunk.
///
/// Sleeps go through the tokio clock, so a paused runtime drives the whole
/// budget instantly. The chunk is not extended to a full line: a reply
/// split across TCP segments is returned as its first fragment.
///
/// # Errors
///
/// Returns [`Error::ReplyTimeout`] if nothing arrives within the budget,
/// [`Error::StreamClosed`] if the peer closed, or [`Error::Io`].
pub async fn poll_read<R>(source: &R, budget: PollBudget) -> Result<String>
where
    R: TryRead + ?Sized,
{
    let mut buf = [0u8; POLL_CHUNK_SIZE];

    for attempt in 1..=budget.attempts {
        match source.try_read(&mut buf) {
            Ok(0) => return Err(Error::StreamClosed),
            Ok(n) => {
                trace!(attempt, bytes = n, "reply chunk available");
                return Ok(String::from_utf8_lossy(&buf[..n]).into_owned());
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(Error::Io(e)),
        }
        tokio::time::sleep(budget.interval).await;
    }

    Err(Error::ReplyTimeout {
        attempts: budget.attempts,
    })
}

/// Reads until the accumulated text contains CRLF or the stream ends.
///
/// Bytes are decoded incrementally, so a UTF-8 sequence split across two
/// reads decodes to the right character. If the stream ends mid-line the
/// partial text is returned as is.
///
/// # Errors
///
/// Returns [`Error::StreamClosed`] if the stream ends before any byte
/// arrives, or [`Error::Io`] if a read fails.
pub async fn read_until_terminator<R>(reader: &mut R) -> Result<String>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut decoder = UTF_8.new_decoder_without_bom_handling();
    let mut buf = [0u8; READ_BUFFER_SIZE];
    let mut text = String::new();

    loop {
        let n = reader.read(&mut buf).await?;
        let eof = n == 0;
        decode_into(&mut decoder, &buf[..n], &mut text, eof);

        if eof {
            if text.is_empty() {
                return Err(Error::StreamClosed);
            }
            trace!(len = text.len(), "stream ended before terminator");
            break;
        }
        if has_terminator(&text) {
            break;
        }
    }

    Ok(text)
}

/// Feeds `src` to the decoder, growing `dst` as needed.
fn decode_into(decoder: &mut Decoder, mut src: &[u8], dst: &mut String, last: bool) {
    loop {
        let needed = decoder
            .max_utf8_buffer_length(src.len())
            .unwrap_or(src.len() * 3 + 4);
        dst.reserve(needed);

        let (result, read, _) = decoder.decode_to_string(src, dst, last);
        src = &src[read..];
        if matches!(result, CoderResult::InputEmpty) {
            break;
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
mod tests {
    use std::cell::Cell;
    use std::sync::Mutex;

    use tokio_test::io::Builder;

    use super::*;
    use crate::parser::parse_reply;

    /// Source that is never readable, counting polls.
    #[derive(Default)]
    struct Silent {
        polls: Mutex<u32>,
    }

    impl TryRead for Silent {
        fn try_read(&self, _buf: &mut [u8]) -> io::Result<usize> {
            *self.polls.lock().unwrap() += 1;
            Err(io::ErrorKind::WouldBlock.into())
        }
    }

    /// Source that becomes readable after a number of polls.
    struct Delayed {
        ready_after: u32,
        polls: Cell<u32>,
        data: &'static [u8],
    }

    impl TryRead for Delayed {
        fn try_read(&self, buf: &mut [u8]) -> io::Result<usize> {
            let polls = self.polls.get() + 1;
            self.polls.set(polls);
            if polls <= self.ready_after {
                return Err(io::ErrorKind::WouldBlock.into());
            }
            let n = self.data.len().min(buf.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            Ok(n)
        }
    }

    struct Closed;

    impl TryRead for Closed {
        fn try_read(&self, _buf: &mut [u8]) -> io::Result<usize> {
            Ok(0)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_read_gives_up_after_budget() {
        let source = Silent::default();
        let budget = PollBudget::default();
        let started = tokio::time::Instant::now();

        let err = poll_read(&source, budget).await.unwrap_err();

        assert!(matches!(err, Error::ReplyTimeout { attempts: 100 }));
        assert_eq!(*source.polls.lock().unwrap(), 100);
        let elapsed = started.elapsed();
        assert!(elapsed >= budget.total());
        assert!(elapsed < budget.total() + budget.interval);
        assert_eq!(budget.total(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_read_returns_first_chunk() {
        let source = Delayed {
            ready_after: 3,
            polls: Cell::new(0),
            data: b"220 smtp.test ESMTP\r\n",
        };
        let started = tokio::time::Instant::now();

        let text = poll_read(&source, PollBudget::default()).await.unwrap();

        assert_eq!(text, "220 smtp.test ESMTP\r\n");
        assert_eq!(source.polls.get(), 4);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_read_does_not_complete_partial_lines() {
        let source = Delayed {
            ready_after: 0,
            polls: Cell::new(0),
            data: b"23",
        };
        let text = poll_read(&source, PollBudget::default()).await.unwrap();
        assert_eq!(text, "23");
        assert!(parse_reply(&text).is_err());
    }

    #[test]
    fn test_budget_total_saturates() {
        let budget = PollBudget::new(Duration::MAX, 100);
        assert_eq!(budget.total(), Duration::MAX);
        assert_eq!(
            PollBudget::new(Duration::from_millis(20), 50).total(),
            Duration::from_secs(1)
        );
    }

    #[tokio::test]
    async fn test_poll_read_closed_stream() {
        let err = poll_read(&Closed, PollBudget::default()).await.unwrap_err();
        assert!(matches!(err, Error::StreamClosed));
    }

    #[tokio::test]
    async fn test_read_until_terminator_assembles_split_reply() {
        let mut mock = Builder::new().read(b"23").read(b"0 OK\r\n").build();

        let text = read_until_terminator(&mut mock).await.unwrap();

        assert_eq!(text, "230 OK\r\n");
        assert_eq!(parse_reply(&text).unwrap().code.as_u16(), 230);
    }

    #[tokio::test]
    async fn test_read_until_terminator_split_multibyte() {
        // "é" is 0xC3 0xA9; split it across reads
        let mut mock = Builder::new()
            .read(b"220 caf\xC3")
            .read(b"\xA9 pr\xC3\xAAt\r\n")
            .build();

        let text = read_until_terminator(&mut mock).await.unwrap();
        assert_eq!(text, "220 café prêt\r\n");
    }

    #[tokio::test]
    async fn test_read_until_terminator_split_crlf() {
        let mut mock = Builder::new().read(b"250 OK\r").read(b"\n").build();
        let text = read_until_terminator(&mut mock).await.unwrap();
        assert_eq!(text, "250 OK\r\n");
    }

    #[tokio::test]
    async fn test_read_until_terminator_partial_at_eof() {
        let mut mock = Builder::new().read(b"535 denied").build();
        let text = read_until_terminator(&mut mock).await.unwrap();
        assert_eq!(text, "535 denied");
    }

    #[tokio::test]
    async fn test_read_until_terminator_empty_stream() {
        let mut mock = Builder::new().build();
        let err = read_until_terminator(&mut mock).await.unwrap_err();
        assert!(matches!(err, Error::StreamClosed));
    }

    #[tokio::test]
    async fn test_read_until_terminator_stops_at_first_line() {
        let mut mock = Builder::new()
            .read(b"250-smtp.test\r\n250 AUTH LOGIN\r\n")
            .build();
        let text = read_until_terminator(&mut mock).await.unwrap();
        // The whole chunk arrived in one read; only the code matters
        assert_eq!(parse_reply(&text).unwrap().code.as_u16(), 250);
    }
}
