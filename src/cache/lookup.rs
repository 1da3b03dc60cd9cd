//! Bounded LRU of query verdicts.
//!
//! Keys are normalized query bytes, values the membership verdict. The
//! cache only ever fronts the immutable fast-mode index, so entries cannot
//! go stale; capacity is the only eviction pressure. A capacity of zero
//! disables caching entirely.

use bytes::Bytes;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Thread-safe query → verdict cache with LRU eviction.
///
/// A single mutex over the combined map + recency list is sufficient at
/// the server's scale; the critical sections are a probe or an insert.
pub struct LookupCache {
    /// None when constructed with capacity 0.
    inner: Option<Mutex<LruCache<Bytes, bool>>>,

    /// Hits served from the cache
    hits: AtomicU64,

    /// Probes that missed (or found the cache disabled)
    misses: AtomicU64,
}

impl LookupCache {
    /// Creates a cache holding at most `capacity` entries; 0 disables it.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// True when the cache was disabled at construction.
    pub fn is_disabled(&self) -> bool {
        self.inner.is_none()
    }

    /// Looks up a verdict, promoting the entry to most-recently-used.
    ///
    /// A poisoned lock degrades to a miss; the data source still answers.
    pub fn get(&self, query: &Bytes) -> Option<bool> {
        let result = self.inner.as_ref().and_then(|cache| {
            if let Ok(mut guard) = cache.lock() {
                guard.get(query).copied()
            } else {
                None
            }
        });
        match result {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        result
    }

    /// Stores a verdict, evicting the least-recently-used entry at capacity.
    ///
    /// A poisoned lock drops the insert; the entry is recomputed next time.
    pub fn put(&self, query: Bytes, exists: bool) {
        if let Some(cache) = self.inner.as_ref() {
            if let Ok(mut guard) = cache.lock() {
                guard.put(query, exists);
            }
        }
    }

    /// Current number of cached entries.
    pub fn len(&self) -> usize {
        self.inner
            .as_ref()
            .map_or(0, |cache| cache.lock().map_or(0, |guard| guard.len()))
    }

    /// True when no entries are cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hits served so far.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Misses recorded so far.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for LookupCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LookupCache")
            .field("disabled", &self.is_disabled())
            .field("len", &self.len())
            .field("hits", &self.hits())
            .field("misses", &self.misses())
            .finish()
    }
}
