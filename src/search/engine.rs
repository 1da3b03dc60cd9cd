//! Query Engine
//!
//! Ties the data source and the lookup cache into the single operation the
//! connection handler needs: answer one membership query.
//!
//! ```text
//! lookup(query)
//!       │
//!       ▼
//! ┌─────────────┐  hit   ┌──────────────┐
//! │ LookupCache │───────▶│   verdict    │
//! └──────┬──────┘        └──────────────┘
//!        │ miss (or reread mode: skipped)
//!        ▼
//! ┌─────────────┐
//! │ DataSource  │──▶ verdict, cached when cacheable
//! └─────────────┘
//! ```
//!
//! Caching is enabled only when the source is the immutable index; a
//! reread source bypasses the cache entirely in both directions.

use crate::cache::LookupCache;
use crate::search::DataSource;
use bytes::Bytes;
use std::io;
use std::sync::Arc;

/// Shared, cloneable lookup front end handed to every connection.
#[derive(Clone, Debug)]
pub struct QueryEngine {
    source: Arc<DataSource>,
    cache: Arc<LookupCache>,
}

impl QueryEngine {
    /// Builds the engine. The cache is only ever used when `source` is
    /// indexed; callers may pass a zero-capacity cache in reread mode.
    pub fn new(source: DataSource, cache: LookupCache) -> Self {
        Self {
            source: Arc::new(source),
            cache: Arc::new(cache),
        }
    }

    /// True when lookups are answered from the in-memory index.
    pub fn is_indexed(&self) -> bool {
        self.source.is_indexed()
    }

    /// Answers one normalized query.
    ///
    /// The empty query is never a member (empty records are discarded at
    /// index build and skipped during scans), so it short-circuits without
    /// touching the source.
    pub async fn lookup(&self, query: &Bytes) -> io::Result<bool> {
        if query.is_empty() {
            return Ok(false);
        }

        if !self.cacheable() {
            return self.source.contains(query).await;
        }

        if let Some(exists) = self.cache.get(query) {
            return Ok(exists);
        }

        let exists = self.source.contains(query).await?;
        self.cache.put(query.clone(), exists);
        Ok(exists)
    }

    /// Cache statistics, for the shutdown summary.
    pub fn cache_stats(&self) -> (u64, u64) {
        (self.cache.hits(), self.cache.misses())
    }

    fn cacheable(&self) -> bool {
        self.source.is_indexed() && !self.cache.is_disabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::LineIndex;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn data_file(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    fn indexed_engine(file: &NamedTempFile, cache_capacity: usize) -> QueryEngine {
        let index = LineIndex::build(file.path(), 4096).unwrap();
        QueryEngine::new(DataSource::Indexed(index), LookupCache::new(cache_capacity))
    }

    #[tokio::test]
    async fn warm_and_cold_cache_agree() {
        let file = data_file(b"hello world\nother line\n");
        let engine = indexed_engine(&file, 16);
        let query = Bytes::from_static(b"hello world");

        let cold = engine.lookup(&query).await.unwrap();
        let warm = engine.lookup(&query).await.unwrap();
        assert!(cold && warm);

        let (hits, _) = engine.cache_stats();
        assert_eq!(hits, 1);
    }

    #[tokio::test]
    async fn negative_verdicts_are_cached_too() {
        let file = data_file(b"hello world\n");
        let engine = indexed_engine(&file, 16);
        let query = Bytes::from_static(b"absent");

        assert!(!engine.lookup(&query).await.unwrap());
        assert!(!engine.lookup(&query).await.unwrap());
        let (hits, _) = engine.cache_stats();
        assert_eq!(hits, 1);
    }

    #[tokio::test]
    async fn empty_query_is_never_a_member() {
        let file = data_file(b"hello world\n");
        let engine = indexed_engine(&file, 16);
        assert!(!engine.lookup(&Bytes::new()).await.unwrap());
    }

    #[tokio::test]
    async fn reread_mode_never_touches_the_cache() {
        let file = data_file(b"hello world\n");
        let source = DataSource::Reread {
            path: file.path().to_path_buf(),
            buffer_size: 4096,
        };
        // Deliberately hand it a real cache; the engine must ignore it.
        let engine = QueryEngine::new(source, LookupCache::new(16));
        let query = Bytes::from_static(b"hello world");

        assert!(engine.lookup(&query).await.unwrap());

        // The swap must be observed, which it would not be if the first
        // verdict had been cached.
        std::fs::write(file.path(), b"something else\n").unwrap();
        assert!(!engine.lookup(&query).await.unwrap());
    }

    #[tokio::test]
    async fn disabled_cache_still_answers() {
        let file = data_file(b"hello world\n");
        let engine = indexed_engine(&file, 0);
        let query = Bytes::from_static(b"hello world");

        assert!(engine.lookup(&query).await.unwrap());
        assert!(engine.lookup(&query).await.unwrap());
        let (hits, _) = engine.cache_stats();
        assert_eq!(hits, 0);
    }
}
