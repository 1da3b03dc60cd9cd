//! Per-Connection Request Handling
//!
//! Each accepted connection is served by one handler task running a single
//! read-dispatch-write cycle:
//!
//! ```text
//! START ──accept──▶ READING
//! READING ──'\n' seen──────────────▶ DISPATCH
//! READING ──over max_query_bytes──▶ write ERROR ▶ CLOSE
//! READING ──deadline expired──────▶ CLOSE (no response)
//! READING ──peer closed───────────▶ CLOSE (no response)
//! DISPATCH ──rate limited─────────▶ write RATE LIMIT EXCEEDED ▶ CLOSE
//! DISPATCH ──lookup ok────────────▶ write EXISTS / NOT FOUND ▶ CLOSE
//! DISPATCH ──lookup failed────────▶ write ERROR ▶ CLOSE
//! ```
//!
//! The protocol is one request per connection: after writing the response
//! the server shuts down its write half and drops the stream.
//!
//! ## Buffer Management
//!
//! Incoming bytes accumulate in a `BytesMut`. TCP is a stream, so a query
//! may arrive in fragments; the framer is retried after every read until a
//! terminator shows up or the request exceeds its bound.
//!
//! The handler is generic over the stream so plain TCP and TLS connections
//! share the exact same code path.

use crate::limiter::RateLimiter;
use crate::protocol::{FrameError, LineParser, Response};
use crate::search::QueryEngine;
use crate::server::ServerStats;
use bytes::{Buf, Bytes, BytesMut};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Initial buffer capacity; most queries fit in one small read.
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Largest single reserve step while a query is still incomplete.
const MAX_READ_CHUNK: usize = 64 * 1024;

/// Errors that can occur while serving one connection.
///
/// All of these are recovered locally: the connection is closed and the
/// server moves on.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// I/O error on the socket
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The request exceeded `max_query_bytes`
    #[error("query exceeded {max} bytes")]
    QueryTooLarge { max: usize },

    /// The read deadline expired before a full query arrived
    #[error("timed out reading the query")]
    ReadTimeout,

    /// The write deadline expired before the response was flushed
    #[error("timed out writing the response")]
    WriteTimeout,

    /// The peer closed the connection before sending a full query
    #[error("peer closed before sending a full query")]
    PeerClosed,
}

impl From<FrameError> for ConnectionError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::QueryTooLarge { max, .. } => ConnectionError::QueryTooLarge { max },
        }
    }
}

/// Everything a connection needs besides its stream, cloned per accept.
#[derive(Clone)]
pub struct ConnectionContext {
    /// The lookup front end (source + cache)
    pub engine: QueryEngine,
    /// Per-IP admission gate
    pub limiter: Arc<RateLimiter>,
    /// Shared counters
    pub stats: Arc<ServerStats>,
    /// Query framer carrying the `max_query_bytes` bound
    pub parser: LineParser,
    /// Deadline for reading one query
    pub read_timeout: Duration,
    /// Deadline for writing the response
    pub write_timeout: Duration,
    /// Reserve step for the read buffer
    pub read_chunk: usize,
}

/// Serves a single client connection.
pub struct ConnectionHandler<S> {
    /// The connection's stream (TCP, or TLS over TCP)
    stream: S,

    /// Client's address; the IP part keys the rate limiter
    peer: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// Shared per-connection context
    ctx: ConnectionContext,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a handler for one accepted stream.
    pub fn new(stream: S, peer: SocketAddr, ctx: ConnectionContext) -> Self {
        Self {
            stream,
            peer,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            ctx,
        }
    }

    /// Runs the read-dispatch-write cycle to completion.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        let started = Instant::now();

        let query = match timeout(self.ctx.read_timeout, self.read_query()).await {
            Ok(Ok(query)) => query,
            Ok(Err(ConnectionError::QueryTooLarge { max })) => {
                // Oversize requests get a deterministic ERROR line before
                // the connection is dropped.
                self.ctx.stats.query_oversize();
                let _ = timeout(self.ctx.write_timeout, self.write_response(Response::Error))
                    .await;
                return Err(ConnectionError::QueryTooLarge { max });
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(ConnectionError::ReadTimeout),
        };

        let response = self.dispatch(&query).await;

        match timeout(self.ctx.write_timeout, self.write_response(response)).await {
            Ok(result) => result?,
            Err(_) => return Err(ConnectionError::WriteTimeout),
        }

        debug!(
            client = %self.peer,
            query_len = query.len(),
            response = %response,
            elapsed_us = started.elapsed().as_micros() as u64,
            "request served"
        );
        Ok(())
    }

    /// Reads until the framer produces a complete query.
    async fn read_query(&mut self) -> Result<Bytes, ConnectionError> {
        loop {
            if let Some((query, consumed)) = self.ctx.parser.parse(&self.buffer)? {
                self.buffer.advance(consumed);
                return Ok(query);
            }

            // Incomplete query - make room and read more.
            if self.buffer.capacity() - self.buffer.len() < 1024 {
                self.buffer.reserve(self.ctx.read_chunk.clamp(1024, MAX_READ_CHUNK));
            }
            let n = self.stream.read_buf(&mut self.buffer).await?;
            if n == 0 {
                return Err(ConnectionError::PeerClosed);
            }
        }
    }

    /// Runs one query through the limiter and the lookup path.
    async fn dispatch(&self, query: &Bytes) -> Response {
        if !self.ctx.limiter.check(self.peer.ip()) {
            self.ctx.stats.request_rate_limited();
            debug!(client = %self.peer, "rate limit exceeded");
            return Response::RateLimited;
        }

        match self.ctx.engine.lookup(query).await {
            Ok(exists) => {
                self.ctx.stats.query_processed(exists);
                Response::from_membership(exists)
            }
            Err(e) => {
                self.ctx.stats.lookup_failed();
                warn!(client = %self.peer, error = %e, "lookup failed");
                Response::Error
            }
        }
    }

    /// Writes the response line and half-closes the write side, giving the
    /// client a clean EOF after the single response.
    async fn write_response(&mut self, response: Response) -> Result<(), ConnectionError> {
        self.stream.write_all(response.as_bytes()).await?;
        self.stream.shutdown().await?;
        Ok(())
    }
}

/// Serves one connection and triages the outcome into log severity.
///
/// Expected endings (peer vanished, deadline expired) stay at DEBUG;
/// anything else is WARN. The connection itself is always closed cleanly
/// either way.
pub async fn handle_connection<S>(handler: ConnectionHandler<S>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let peer = handler.peer;
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::PeerClosed
            | ConnectionError::ReadTimeout
            | ConnectionError::QueryTooLarge { .. } => {
                debug!(client = %peer, error = %e, "connection closed early")
            }
            ConnectionError::Io(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %peer, "connection reset by client")
            }
            _ => warn!(client = %peer, error = %e, "connection error"),
        }
    }
}
