//! # linesift - Exact Full-Line Membership Server
//!
//! linesift is a TCP server that answers one question very quickly: does a
//! given string appear as a full line in a configured text file? Clients
//! send a single newline-terminated query and receive `STRING EXISTS` or
//! `STRING NOT FOUND`, after which the connection closes.
//!
//! ## Features
//!
//! - **O(1) lookups**: an immutable hash-set index with a bloom-filter
//!   negative fast path, built once at startup
//! - **Reread mode**: optionally re-scan the data file on every query, for
//!   data files that change while the server runs
//! - **Bounded LRU caching** of query verdicts (fast mode only)
//! - **Per-IP rate limiting** over a 60-second sliding window
//! - **TLS** termination via rustls, with optional client certificates
//! - **Admission control**: a hard cap on concurrently served connections
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                              linesift                               │
//! │                                                                     │
//! │  ┌────────────┐    ┌─────────────┐    ┌─────────────┐               │
//! │  │  Listener  │───▶│   (TLS)     │───▶│ Connection  │               │
//! │  │ + admission│    │  handshake  │    │  Handler    │               │
//! │  └────────────┘    └─────────────┘    └──────┬──────┘               │
//! │                                              │                      │
//! │                                              ▼                      │
//! │  ┌─────────────┐   ┌─────────────┐   ┌──────────────────────────┐   │
//! │  │ RateLimiter │◀──│ QueryEngine │──▶│       DataSource         │   │
//! │  │ (per-IP)    │   │ LookupCache │   │ ┌──────────┐ ┌────────┐  │   │
//! │  └─────────────┘   └─────────────┘   │ │LineIndex │ │ Reread │  │   │
//! │                                      │ │ + Bloom  │ │ scan   │  │   │
//! │                                      │ └──────────┘ └────────┘  │   │
//! │                                      └──────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use linesift::config::Settings;
//! use linesift::server::Server;
//!
//! #[tokio::main]
//! async fn main() {
//!     let settings = Settings {
//!         data_path: "data/lines.txt".into(),
//!         ..Settings::default()
//!     };
//!
//!     let server = Server::bind(settings).await.unwrap();
//!     let shutdown = async {
//!         tokio::signal::ctrl_c().await.unwrap();
//!     };
//!     server.run(shutdown).await.unwrap();
//! }
//! ```
//!
//! ## Wire Protocol
//!
//! One request per connection. The request is a single line terminated by
//! `\n` (an optional `\r` before the `\n` is stripped); the response is one
//! of the following ASCII lines, `\n`-terminated:
//!
//! - `STRING EXISTS`
//! - `STRING NOT FOUND`
//! - `RATE LIMIT EXCEEDED`
//! - `ERROR`
//!
//! Queries are raw bytes and membership is byte-exact: a data file that is
//! not valid UTF-8 is served as-is.
//!
//! ## Module Overview
//!
//! - [`config`]: layered settings (defaults, TOML file, CLI/env) and validation
//! - [`protocol`]: the line framer and the response vocabulary
//! - [`search`]: line index, bloom filter, data source, query engine
//! - [`cache`]: bounded LRU of query verdicts
//! - [`limiter`]: per-IP sliding-window rate limiter
//! - [`connection`]: the per-connection request state machine
//! - [`server`]: lifecycle, accept loop, TLS, stats

pub mod cache;
pub mod config;
pub mod connection;
pub mod limiter;
pub mod protocol;
pub mod search;
pub mod server;

// Re-export commonly used types for convenience
pub use cache::LookupCache;
pub use config::{ConfigError, Settings};
pub use connection::{ConnectionError, ConnectionHandler};
pub use limiter::RateLimiter;
pub use protocol::{LineParser, Response};
pub use search::{DataSource, LineIndex, QueryEngine};
pub use server::{Server, ServerStats, StartupError};

/// The default port the server listens on
pub const DEFAULT_PORT: u16 = 44445;

/// The default host the server binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of linesift
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
