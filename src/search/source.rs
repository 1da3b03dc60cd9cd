//! Data Source: Indexed vs Reread
//!
//! One operation, two operating modes, chosen once at startup:
//!
//! - **Indexed** (fast mode): queries are answered from the immutable
//!   [`LineIndex`] built at startup. Lookups are infallible and cacheable.
//! - **Reread**: every query opens the data file fresh and streams it until
//!   a matching line is found. Nothing is held between queries, so a file
//!   swapped under the server is observed on the very next query. Lookups
//!   can fail with I/O errors and must never be cached.
//!
//! The set of modes is closed, so a plain enum keeps the common indexed
//! path a branch plus an inlineable set probe.

use crate::search::index::{trim_record, LineIndex};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Where query lookups are answered from.
#[derive(Debug)]
pub enum DataSource {
    /// Fast mode: the in-memory index snapshot.
    Indexed(LineIndex),
    /// Reread mode: a fresh scan of the data file per query.
    Reread {
        /// Path of the data file, reopened for every query.
        path: PathBuf,
        /// Read buffer size for the scan.
        buffer_size: usize,
    },
}

impl DataSource {
    /// True in fast mode. Lookup results may be cached only when this is
    /// true, because only the immutable index makes cached verdicts stable.
    pub fn is_indexed(&self) -> bool {
        matches!(self, DataSource::Indexed(_))
    }

    /// Answers one membership query.
    ///
    /// # Errors
    ///
    /// Only reread mode can fail, when the data file cannot be opened or
    /// read. The caller surfaces that to the client as `ERROR`.
    pub async fn contains(&self, query: &[u8]) -> io::Result<bool> {
        match self {
            DataSource::Indexed(index) => Ok(index.contains(query)),
            DataSource::Reread { path, buffer_size } => {
                scan_file(path, *buffer_size, query).await
            }
        }
    }
}

/// Streams the data file record by record, returning on the first match.
///
/// Uses the same normalization as the index build: strip the terminator,
/// skip empty records, compare bytes exactly.
async fn scan_file(path: &Path, buffer_size: usize, query: &[u8]) -> io::Result<bool> {
    let file = File::open(path).await?;
    let mut reader = BufReader::with_capacity(buffer_size.max(1024), file);
    let mut record = Vec::new();

    loop {
        record.clear();
        let n = reader.read_until(b'\n', &mut record).await?;
        if n == 0 {
            return Ok(false);
        }
        let line = trim_record(&record);
        if !line.is_empty() && line == query {
            return Ok(true);
        }
    }
}
