//! Wire Protocol Implementation
//!
//! The server speaks a one-shot line protocol over TCP (optionally TLS):
//! the client sends a single query terminated by `\n`, the server answers
//! with a single response line and closes the connection.
//!
//! ## Modules
//!
//! - `types`: the `Response` vocabulary and its exact wire bytes
//! - `parser`: the incremental `LineParser` that frames one query out of
//!   the byte stream
//!
//! ## Example
//!
//! ```
//! use linesift::protocol::{LineParser, Response};
//!
//! let parser = LineParser::new(1024);
//! let (query, _consumed) = parser.parse(b"hello world\n").unwrap().unwrap();
//! assert_eq!(&query[..], b"hello world");
//!
//! let response = Response::from_membership(false);
//! assert_eq!(response.as_bytes(), b"STRING NOT FOUND\n");
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{FrameError, FrameResult, LineParser, DEFAULT_MAX_QUERY_BYTES};
pub use types::Response;
