//! Server-wide counters.
//!
//! Plain atomics bumped from the accept loop and the connection handlers.
//! These are the counters an external metrics exporter would scrape; inside
//! the server they feed the shutdown summary log.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by the accept loop and every connection task.
#[derive(Debug, Default)]
pub struct ServerStats {
    /// Connections that passed the admission gate
    pub connections_accepted: AtomicU64,
    /// Connections currently being served
    pub active_connections: AtomicU64,
    /// Connections closed at accept because `max_workers` were in flight
    pub connections_dropped: AtomicU64,
    /// TLS handshakes that failed
    pub handshake_failures: AtomicU64,
    /// Queries that reached the lookup path
    pub queries_processed: AtomicU64,
    /// Queries answered `STRING EXISTS`
    pub strings_found: AtomicU64,
    /// Requests rejected by the rate limiter
    pub rate_limited: AtomicU64,
    /// Lookups that failed with an I/O error
    pub lookup_errors: AtomicU64,
    /// Requests dropped for exceeding `max_query_bytes`
    pub oversize_queries: AtomicU64,
}

impl ServerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn connection_dropped(&self) {
        self.connections_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handshake_failed(&self) {
        self.handshake_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn query_processed(&self, found: bool) {
        self.queries_processed.fetch_add(1, Ordering::Relaxed);
        if found {
            self.strings_found.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn request_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn lookup_failed(&self) {
        self.queries_processed.fetch_add(1, Ordering::Relaxed);
        self.lookup_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn query_oversize(&self) {
        self.oversize_queries.fetch_add(1, Ordering::Relaxed);
    }

    /// Current in-flight connection count.
    pub fn active(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// A consistent-enough copy of every counter for logging.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connections_dropped: self.connections_dropped.load(Ordering::Relaxed),
            handshake_failures: self.handshake_failures.load(Ordering::Relaxed),
            queries_processed: self.queries_processed.load(Ordering::Relaxed),
            strings_found: self.strings_found.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            lookup_errors: self.lookup_errors.load(Ordering::Relaxed),
            oversize_queries: self.oversize_queries.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time counter values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub connections_accepted: u64,
    pub connections_dropped: u64,
    pub handshake_failures: u64,
    pub queries_processed: u64,
    pub strings_found: u64,
    pub rate_limited: u64,
    pub lookup_errors: u64,
    pub oversize_queries: u64,
}
