//! Wire Protocol Responses
//!
//! This module defines the responses the server can write on the wire.
//! The protocol is a plain line protocol: every response is a single ASCII
//! line terminated by `\n`, after which the server closes the connection.
//!
//! ## Protocol Format
//!
//! ```text
//! STRING EXISTS\n          the query matched a full line of the data file
//! STRING NOT FOUND\n       the query matched no line
//! RATE LIMIT EXCEEDED\n    the client IP exhausted its per-minute budget
//! ERROR\n                  the lookup failed or the request was malformed
//! ```

use std::fmt;

/// The line terminator used on the wire.
pub const LF: u8 = b'\n';

/// Raw response lines, including the trailing `\n`.
pub mod wire {
    pub const EXISTS: &[u8] = b"STRING EXISTS\n";
    pub const NOT_FOUND: &[u8] = b"STRING NOT FOUND\n";
    pub const RATE_LIMITED: &[u8] = b"RATE LIMIT EXCEEDED\n";
    pub const ERROR: &[u8] = b"ERROR\n";
}

/// A response to a single query.
///
/// The four variants form the complete response vocabulary of the server;
/// every connection ends with exactly one of them (or none at all, when the
/// client times out or disconnects before sending a full line).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// The query is byte-for-byte equal to some line of the data file.
    Exists,
    /// The query matched no line. Also returned for the empty query.
    NotFound,
    /// The client's IP exceeded `requests_per_minute`.
    RateLimited,
    /// The lookup failed (I/O error in reread mode) or the query was
    /// oversize.
    Error,
}

impl Response {
    /// Builds the response for a membership verdict.
    pub fn from_membership(exists: bool) -> Self {
        if exists {
            Response::Exists
        } else {
            Response::NotFound
        }
    }

    /// Returns the exact bytes written on the wire, trailing `\n` included.
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Response::Exists => wire::EXISTS,
            Response::NotFound => wire::NOT_FOUND,
            Response::RateLimited => wire::RATE_LIMITED,
            Response::Error => wire::ERROR,
        }
    }

    /// Returns the response line without the terminator, for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Response::Exists => "STRING EXISTS",
            Response::NotFound => "STRING NOT FOUND",
            Response::RateLimited => "RATE LIMIT EXCEEDED",
            Response::Error => "ERROR",
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_bytes_are_exact() {
        assert_eq!(Response::Exists.as_bytes(), b"STRING EXISTS\n");
        assert_eq!(Response::NotFound.as_bytes(), b"STRING NOT FOUND\n");
        assert_eq!(Response::RateLimited.as_bytes(), b"RATE LIMIT EXCEEDED\n");
        assert_eq!(Response::Error.as_bytes(), b"ERROR\n");
    }

    #[test]
    fn membership_mapping() {
        assert_eq!(Response::from_membership(true), Response::Exists);
        assert_eq!(Response::from_membership(false), Response::NotFound);
    }

    #[test]
    fn every_response_ends_with_newline() {
        for r in [
            Response::Exists,
            Response::NotFound,
            Response::RateLimited,
            Response::Error,
        ] {
            assert_eq!(*r.as_bytes().last().unwrap(), LF);
            assert!(r.as_bytes().starts_with(r.as_str().as_bytes()));
        }
    }
}
