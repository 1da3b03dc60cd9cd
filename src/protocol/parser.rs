//! Incremental Line Framer
//!
//! This module extracts a single query from the byte stream of a connection.
//! A request is everything up to and including the first `\n`; the query is
//! the portion before the `\n`, minus one optional trailing `\r`.
//!
//! ## How the Framer Works
//!
//! The framer inspects a buffer and returns one of:
//! - `Ok(Some((query, consumed)))` - a complete line was found; `consumed`
//!   bytes (terminator included) should be advanced off the buffer
//! - `Ok(None)` - no terminator yet, the caller should read more data
//! - `Err(FrameError)` - the buffered request exceeds the configured bound
//!
//! This mirrors the usual read loop: append incoming network data to a
//! buffer, attempt a parse, and either dispatch, read more, or fail the
//! connection.
//!
//! Queries are opaque byte strings. Embedded `\0`, invalid UTF-8, and any
//! other byte except `\n` pass through untouched; the membership comparison
//! downstream is byte-exact.

use bytes::Bytes;
use thiserror::Error;

/// Default hard bound on a single request (1 MiB).
pub const DEFAULT_MAX_QUERY_BYTES: usize = 1024 * 1024;

/// Errors produced while framing a request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The request grew past the configured bound without a terminator,
    /// or the line itself is longer than the bound.
    #[error("query too large: {size} bytes buffered (max: {max})")]
    QueryTooLarge { size: usize, max: usize },
}

/// Result type for framing operations.
pub type FrameResult<T> = Result<T, FrameError>;

/// Frames newline-terminated queries out of a raw byte buffer.
///
/// # Example
///
/// ```
/// use linesift::protocol::LineParser;
/// use bytes::{Buf, BytesMut};
///
/// let parser = LineParser::new(1024);
/// let mut buffer = BytesMut::from(&b"hello world\r\n"[..]);
///
/// let (query, consumed) = parser.parse(&buffer).unwrap().unwrap();
/// assert_eq!(&query[..], b"hello world");
/// buffer.advance(consumed);
/// assert!(buffer.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct LineParser {
    /// Upper bound on the bytes of one request, terminator excluded.
    max_query_bytes: usize,
}

impl LineParser {
    /// Creates a framer with the given request bound.
    pub fn new(max_query_bytes: usize) -> Self {
        Self { max_query_bytes }
    }

    /// Attempts to frame one query from the buffer.
    ///
    /// On success the query is copied out of the buffer (queries are small
    /// relative to the read buffer, and the connection is about to close
    /// anyway), with the trailing `\r`, if any, already stripped.
    pub fn parse(&self, buf: &[u8]) -> FrameResult<Option<(Bytes, usize)>> {
        match buf.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                if pos > self.max_query_bytes {
                    return Err(FrameError::QueryTooLarge {
                        size: pos,
                        max: self.max_query_bytes,
                    });
                }
                let mut end = pos;
                if end > 0 && buf[end - 1] == b'\r' {
                    end -= 1;
                }
                Ok(Some((Bytes::copy_from_slice(&buf[..end]), pos + 1)))
            }
            None => {
                if buf.len() > self.max_query_bytes {
                    return Err(FrameError::QueryTooLarge {
                        size: buf.len(),
                        max: self.max_query_bytes,
                    });
                }
                Ok(None)
            }
        }
    }
}

impl Default for LineParser {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_QUERY_BYTES)
    }
}
