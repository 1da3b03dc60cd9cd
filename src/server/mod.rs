//! Server Lifecycle Module
//!
//! Construction from [`Settings`], the accept loop, admission control, TLS
//! wrapping, and graceful shutdown.
//!
//! ## Startup Sequence
//!
//! ```text
//! validate settings
//!       │
//!       ▼
//! build DataSource          (fast mode: read the file, build the index)
//!       │
//!       ▼
//! construct cache / limiter / stats
//!       │
//!       ▼
//! load TLS material         (when enabled)
//!       │
//!       ▼
//! bind the listener         ──▶ ready to serve
//! ```
//!
//! Every failure on this path is fatal; the process never starts serving
//! from a half-built state.
//!
//! ## Admission Control
//!
//! A semaphore with `max_workers` permits is the only gate: each accepted
//! connection takes a permit into its task and returns it on completion.
//! When no permit is free the connection is closed on the spot, before any
//! TLS handshake, and counted as dropped.
//!
//! ## Shutdown
//!
//! On the shutdown signal the listener closes first, then the loop waits
//! up to `shutdown_grace` for all permits to come back. Whatever is still
//! running after the grace period is abandoned and dies with the process.

pub mod stats;
pub mod tls;

// Re-export commonly used types
pub use stats::{ServerStats, StatsSnapshot};
pub use tls::TlsError;

use crate::cache::LookupCache;
use crate::config::{ConfigError, Settings};
use crate::connection::{handle_connection, ConnectionContext, ConnectionHandler};
use crate::limiter::RateLimiter;
use crate::protocol::LineParser;
use crate::search::{DataSource, LineIndex, QueryEngine};
use std::future::Future;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

/// Pause after a failed `accept` before retrying, so a persistent error
/// (e.g. EMFILE) cannot spin the loop.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Errors that prevent the server from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    /// Settings failed validation
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The line index could not be built from the data file
    #[error("failed to build line index from {}: {source}", path.display())]
    Index {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// TLS material could not be loaded
    #[error(transparent)]
    Tls(#[from] TlsError),

    /// The configured host:port did not resolve to an address
    #[error("invalid listen address {addr}")]
    Address { addr: String },

    /// The listening socket could not be bound
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
}

/// The assembled server, bound and ready to serve.
///
/// # Example
///
/// ```no_run
/// use linesift::config::Settings;
/// use linesift::server::Server;
///
/// #[tokio::main]
/// async fn main() {
///     let server = Server::bind(Settings::default()).await.unwrap();
///     let shutdown = async {
///         tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
///     };
///     server.run(shutdown).await.unwrap();
/// }
/// ```
pub struct Server {
    settings: Settings,
    ctx: ConnectionContext,
    tls: Option<TlsAcceptor>,
    listener: TcpListener,
    permits: Arc<Semaphore>,
}

impl Server {
    /// Runs the startup sequence and binds the listening socket.
    pub async fn bind(settings: Settings) -> Result<Server, StartupError> {
        settings.validate()?;

        let source = if settings.reread_on_query {
            info!(
                path = %settings.data_path.display(),
                "reread mode: the data file is scanned on every query"
            );
            DataSource::Reread {
                path: settings.data_path.clone(),
                buffer_size: settings.buffer_size,
            }
        } else {
            let index = LineIndex::build(&settings.data_path, settings.buffer_size).map_err(
                |source| StartupError::Index {
                    path: settings.data_path.clone(),
                    source,
                },
            )?;
            DataSource::Indexed(index)
        };

        // A cache over a mutable file would serve stale verdicts, so reread
        // mode always gets the disabled cache no matter what is configured.
        let cache_capacity = if settings.reread_on_query {
            0
        } else {
            settings.cache_capacity
        };
        let engine = QueryEngine::new(source, LookupCache::new(cache_capacity));

        let limiter = if settings.rate_limit_enabled {
            RateLimiter::new(settings.requests_per_minute)
        } else {
            RateLimiter::disabled()
        };

        let tls = if settings.tls_enabled {
            let acceptor = tls::acceptor(
                &settings.tls_cert,
                &settings.tls_key,
                settings.tls_client_ca.as_deref(),
            )?;
            info!(cert = %settings.tls_cert.display(), "TLS enabled");
            Some(acceptor)
        } else {
            None
        };

        let listener = bind_listener(&settings)?;

        let ctx = ConnectionContext {
            engine,
            limiter: Arc::new(limiter),
            stats: Arc::new(ServerStats::new()),
            parser: LineParser::new(settings.max_query_bytes),
            read_timeout: settings.read_timeout,
            write_timeout: settings.write_timeout,
            read_chunk: settings.buffer_size,
        };
        let permits = Arc::new(Semaphore::new(settings.max_workers));

        Ok(Server {
            settings,
            ctx,
            tls,
            listener,
            permits,
        })
    }

    /// The address the listener actually bound (relevant with port 0).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Shared counter handle, for exporters and tests.
    pub fn stats(&self) -> Arc<ServerStats> {
        Arc::clone(&self.ctx.stats)
    }

    /// Serves until `shutdown` resolves, then drains in-flight connections.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> io::Result<()> {
        let Server {
            settings,
            ctx,
            tls,
            listener,
            permits,
        } = self;
        let stats = Arc::clone(&ctx.stats);

        let addr = listener.local_addr()?;
        let mode = if ctx.engine.is_indexed() { "fast" } else { "reread" };
        info!(
            addr = %addr,
            mode,
            max_workers = settings.max_workers,
            "ready to accept connections"
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        match Arc::clone(&permits).try_acquire_owned() {
                            Ok(permit) => {
                                let ctx = ctx.clone();
                                let tls = tls.clone();
                                tokio::spawn(async move {
                                    serve_client(stream, peer, tls, ctx).await;
                                    drop(permit);
                                });
                            }
                            Err(_) => {
                                // Admission cap reached: close on the spot.
                                stats.connection_dropped();
                                debug!(client = %peer, "connection dropped: worker limit reached");
                                drop(stream);
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                    }
                },
            }
        }

        // Stop accepting first, then give in-flight work the grace period.
        drop(listener);
        info!(active = stats.active(), "shutdown requested; draining connections");
        match timeout(
            settings.shutdown_grace,
            permits.acquire_many(settings.max_workers as u32),
        )
        .await
        {
            Ok(_) => info!("all connections drained"),
            Err(_) => warn!(
                abandoned = stats.active(),
                "grace period expired with connections still active"
            ),
        }

        let snap = stats.snapshot();
        let (cache_hits, cache_misses) = ctx.engine.cache_stats();
        info!(
            connections = snap.connections_accepted,
            dropped = snap.connections_dropped,
            queries = snap.queries_processed,
            found = snap.strings_found,
            rate_limited = snap.rate_limited,
            errors = snap.lookup_errors,
            cache_hits,
            cache_misses,
            "server stopped"
        );
        Ok(())
    }
}

/// Wraps the stream in TLS when configured, then hands it to the
/// connection handler. Handshake failures end the connection here and
/// never reach the rate limiter.
async fn serve_client(
    stream: TcpStream,
    peer: SocketAddr,
    tls: Option<TlsAcceptor>,
    ctx: ConnectionContext,
) {
    ctx.stats.connection_opened();
    let stats = Arc::clone(&ctx.stats);

    match tls {
        Some(acceptor) => match acceptor.accept(stream).await {
            Ok(stream) => handle_connection(ConnectionHandler::new(stream, peer, ctx)).await,
            Err(e) => {
                stats.handshake_failed();
                debug!(client = %peer, error = %e, "TLS handshake failed");
            }
        },
        None => handle_connection(ConnectionHandler::new(stream, peer, ctx)).await,
    }

    stats.connection_closed();
}

/// Resolves the configured address and binds with the configured backlog.
fn bind_listener(settings: &Settings) -> Result<TcpListener, StartupError> {
    let addr_str = settings.bind_address();
    let addr: SocketAddr = addr_str
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| StartupError::Address {
            addr: addr_str.clone(),
        })?;

    let bound = (|| {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        socket.listen(settings.backlog)
    })();

    bound.map_err(|source| StartupError::Bind {
        addr: addr_str,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;

    const DATA: &[u8] = b"7;0;6;28;0;23;5;0;\n1;0;6;16;0;19;3;0;\nhello world\n";

    fn data_file(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    fn test_settings(data: &NamedTempFile) -> Settings {
        Settings {
            data_path: data.path().to_path_buf(),
            host: "127.0.0.1".to_string(),
            port: 0,
            max_workers: 8,
            cache_capacity: 64,
            buffer_size: 4096,
            rate_limit_enabled: false,
            read_timeout: Duration::from_secs(2),
            write_timeout: Duration::from_secs(2),
            shutdown_grace: Duration::from_secs(1),
            ..Settings::default()
        }
    }

    async fn start(
        settings: Settings,
    ) -> (SocketAddr, oneshot::Sender<()>, JoinHandle<io::Result<()>>) {
        let server = Server::bind(settings).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.run(async {
            let _ = stop_rx.await;
        }));
        (addr, stop_tx, handle)
    }

    async fn query(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request).await.unwrap();
        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await.unwrap();
        reply
    }

    #[tokio::test]
    async fn end_to_end_fast_mode() {
        let data = data_file(DATA);
        let (addr, _stop, _handle) = start(test_settings(&data)).await;

        assert_eq!(query(addr, b"7;0;6;28;0;23;5;0;\n").await, b"STRING EXISTS\n");
        assert_eq!(query(addr, b"hello worl\n").await, b"STRING NOT FOUND\n");
        assert_eq!(query(addr, b"hello world\r\n").await, b"STRING EXISTS\n");
        assert_eq!(query(addr, b"\n").await, b"STRING NOT FOUND\n");
    }

    #[tokio::test]
    async fn non_utf8_line_round_trips() {
        let data = data_file(b"\xff\xfe;binary;line\nplain\n");
        let (addr, _stop, _handle) = start(test_settings(&data)).await;

        assert_eq!(query(addr, b"\xff\xfe;binary;line\n").await, b"STRING EXISTS\n");
        assert_eq!(query(addr, b"\xff\xfe\n").await, b"STRING NOT FOUND\n");
    }

    #[tokio::test]
    async fn reread_mode_observes_a_file_swap() {
        let data = data_file(DATA);
        let settings = Settings {
            reread_on_query: true,
            ..test_settings(&data)
        };
        let (addr, _stop, _handle) = start(settings).await;

        assert_eq!(query(addr, b"hello world\n").await, b"STRING EXISTS\n");

        std::fs::write(data.path(), b"7;0;6;28;0;23;5;0;\n1;0;6;16;0;19;3;0;\n").unwrap();
        assert_eq!(query(addr, b"hello world\n").await, b"STRING NOT FOUND\n");
    }

    #[tokio::test]
    async fn fast_mode_is_snapshot_only() {
        let data = data_file(DATA);
        let (addr, _stop, _handle) = start(test_settings(&data)).await;

        std::fs::write(data.path(), b"only this line now\n").unwrap();
        // The swap happened after the index build, so the old answer holds.
        assert_eq!(query(addr, b"hello world\n").await, b"STRING EXISTS\n");
    }

    #[tokio::test]
    async fn rate_limit_is_enforced_per_ip() {
        let data = data_file(DATA);
        let settings = Settings {
            rate_limit_enabled: true,
            requests_per_minute: 2,
            ..test_settings(&data)
        };
        let (addr, _stop, _handle) = start(settings).await;

        assert_eq!(query(addr, b"hello world\n").await, b"STRING EXISTS\n");
        assert_eq!(query(addr, b"hello world\n").await, b"STRING EXISTS\n");
        assert_eq!(query(addr, b"hello world\n").await, b"RATE LIMIT EXCEEDED\n");
    }

    #[tokio::test]
    async fn oversize_query_gets_error_then_close() {
        let data = data_file(DATA);
        let settings = Settings {
            max_query_bytes: 32,
            ..test_settings(&data)
        };
        let (addr, _stop, _handle) = start(settings).await;

        let mut request = vec![b'a'; 64];
        request.push(b'\n');
        assert_eq!(query(addr, &request).await, b"ERROR\n");
    }

    #[tokio::test]
    async fn admission_cap_drops_excess_connections() {
        let data = data_file(DATA);
        let settings = Settings {
            max_workers: 1,
            ..test_settings(&data)
        };
        let (addr, _stop, _handle) = start(settings).await;

        // First connection parks inside the read deadline, holding the
        // only permit.
        let holder = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Second connection must be closed immediately with no response.
        let mut dropped = TcpStream::connect(addr).await.unwrap();
        let mut reply = Vec::new();
        dropped.read_to_end(&mut reply).await.unwrap();
        assert!(reply.is_empty());

        drop(holder);
    }

    #[tokio::test]
    async fn graceful_shutdown_returns_cleanly() {
        let data = data_file(DATA);
        let (addr, stop, handle) = start(test_settings(&data)).await;

        assert_eq!(query(addr, b"hello world\n").await, b"STRING EXISTS\n");

        stop.send(()).unwrap();
        handle.await.unwrap().unwrap();

        // The listener is gone; new connections must fail.
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn repeated_identical_queries_are_idempotent() {
        let data = data_file(DATA);
        let (addr, _stop, _handle) = start(test_settings(&data)).await;

        for _ in 0..5 {
            assert_eq!(query(addr, b"1;0;6;16;0;19;3;0;\n").await, b"STRING EXISTS\n");
        }
        for _ in 0..5 {
            assert_eq!(query(addr, b"1;0;6;16;0;19;3;0\n").await, b"STRING NOT FOUND\n");
        }
    }

    #[tokio::test]
    async fn bind_fails_on_a_missing_data_file() {
        let settings = Settings {
            data_path: PathBuf::from("/nonexistent/lines.txt"),
            host: "127.0.0.1".to_string(),
            port: 0,
            ..Settings::default()
        };
        assert!(matches!(
            Server::bind(settings).await.err().expect("expected Err"),
            StartupError::Config(ConfigError::DataFile { .. })
        ));
    }

    #[tokio::test]
    async fn bind_fails_on_an_occupied_port() {
        let data = data_file(DATA);
        let (addr, _stop, _handle) = start(test_settings(&data)).await;

        let settings = Settings {
            port: addr.port(),
            ..test_settings(&data)
        };
        assert!(matches!(
            Server::bind(settings).await.err().expect("expected Err"),
            StartupError::Bind { .. }
        ));
    }
}
