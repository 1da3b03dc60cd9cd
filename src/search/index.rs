//! In-Memory Line Index
//!
//! The index is the fast-mode membership structure: every distinct non-empty
//! line of the data file, held as raw bytes in a hash set. It is built once
//! at startup and never mutated afterwards, which is what lets workers share
//! it without synchronization and lets cached lookups stay valid forever.
//!
//! ## Normalization
//!
//! A line is a maximal byte run delimited by `\n`. One trailing `\r` (CRLF
//! files) is stripped, empty records are discarded, and duplicates collapse
//! silently. The same rules are applied to incoming queries by the framer,
//! so membership is a byte-for-byte comparison of normalized forms. Lines
//! are kept as raw bytes: a data file that is not valid UTF-8 is indexed
//! and matched as-is.
//!
//! ## Lookup Layering
//!
//! ```text
//! contains(query)
//!       │
//!       ▼
//! ┌──────────────┐   definitely absent
//! │ Bloom filter │──────────────────────▶ false
//! └──────┬───────┘
//!        │ maybe present
//!        ▼
//! ┌──────────────┐
//! │   Hash set   │──▶ exact verdict
//! └──────────────┘
//! ```
//!
//! The bloom filter is a negative fast path only; a positive always falls
//! through to the exact set, so a false positive can never reach the wire.

use crate::search::bloom::Bloom;
use ahash::RandomState;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::SystemTime;
use tracing::{debug, info};

/// Target false-positive rate for the negative fast path.
const BLOOM_FPR: f64 = 0.01;

/// Strips the record terminator from one raw record: one trailing `\n`
/// and, if present before it, one trailing `\r`.
pub(crate) fn trim_record(record: &[u8]) -> &[u8] {
    let mut end = record.len();
    if end > 0 && record[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && record[end - 1] == b'\r' {
        end -= 1;
    }
    &record[..end]
}

/// The file identity snapshot an index was built from.
///
/// Fast mode is snapshot-only: if the file changes after startup the index
/// does not observe it. The snapshot is recorded so operators can tell what
/// the running server is actually answering from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSnapshot {
    /// Modification time at build, when the platform reports one.
    pub modified: Option<SystemTime>,
    /// File length in bytes at build.
    pub len: u64,
}

/// Immutable set of the distinct full lines of a data file.
///
/// # Example
///
/// ```no_run
/// use linesift::search::LineIndex;
///
/// let index = LineIndex::build("data/lines.txt".as_ref(), 1024 * 1024).unwrap();
/// assert!(index.contains(b"some line that is in the file") || index.len() == 0);
/// ```
pub struct LineIndex {
    /// Distinct normalized lines.
    lines: HashSet<Box<[u8]>, RandomState>,
    /// Negative fast path sized to the distinct-line count.
    bloom: Bloom,
    /// Identity of the file the index was built from.
    snapshot: FileSnapshot,
    /// Total bytes of the indexed lines, for resource accounting.
    line_bytes: usize,
}

impl LineIndex {
    /// Builds the index by streaming the data file.
    ///
    /// The file is read in binary mode through a buffer of `buffer_size`
    /// bytes. A final record without a trailing `\n` is indexed too.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the file cannot be opened or
    /// read; the server treats that as fatal at startup.
    pub fn build(path: &Path, buffer_size: usize) -> std::io::Result<Self> {
        let file = File::open(path)?;
        let metadata = file.metadata()?;
        let snapshot = FileSnapshot {
            modified: metadata.modified().ok(),
            len: metadata.len(),
        };

        let mut reader = BufReader::with_capacity(buffer_size.max(1024), file);
        let mut lines: HashSet<Box<[u8]>, RandomState> = HashSet::default();
        let mut line_bytes = 0usize;
        let mut record = Vec::new();

        loop {
            record.clear();
            let n = reader.read_until(b'\n', &mut record)?;
            if n == 0 {
                break;
            }
            let line = trim_record(&record);
            if line.is_empty() {
                continue;
            }
            if lines.insert(line.into()) {
                line_bytes += line.len();
            }
        }

        // The filter is sized from the final distinct count, so it is
        // populated in a second pass over the set rather than during the
        // file scan.
        let mut bloom = Bloom::new(lines.len(), BLOOM_FPR);
        for line in &lines {
            bloom.insert(line);
        }

        info!(
            path = %path.display(),
            lines = lines.len(),
            line_bytes,
            file_bytes = snapshot.len,
            "line index built"
        );
        debug!(
            bloom_bits = bloom.num_bits(),
            bloom_hashes = bloom.num_hashes(),
            "negative fast path sized"
        );

        Ok(Self {
            lines,
            bloom,
            snapshot,
            line_bytes,
        })
    }

    /// Exact full-line membership test.
    #[inline]
    pub fn contains(&self, query: &[u8]) -> bool {
        if !self.bloom.might_contain(query) {
            return false;
        }
        self.lines.contains(query)
    }

    /// Number of distinct indexed lines.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// True when the data file had no non-empty lines.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The file identity this index was built from.
    pub fn snapshot(&self) -> FileSnapshot {
        self.snapshot
    }

    /// Approximate heap bytes held by the indexed lines themselves.
    pub fn line_bytes(&self) -> usize {
        self.line_bytes
    }
}

impl std::fmt::Debug for LineIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineIndex")
            .field("lines", &self.lines.len())
            .field("line_bytes", &self.line_bytes)
            .field("snapshot", &self.snapshot)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn index_of(content: &[u8]) -> LineIndex {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        LineIndex::build(file.path(), 64 * 1024).unwrap()
    }

    #[test]
    fn indexes_full_lines() {
        let index = index_of(b"7;0;6;28;0;23;5;0;\n1;0;6;16;0;19;3;0;\nhello world\n");
        assert_eq!(index.len(), 3);
        assert!(index.contains(b"7;0;6;28;0;23;5;0;"));
        assert!(index.contains(b"hello world"));
        assert!(!index.contains(b"hello worl"));
        assert!(!index.contains(b"hello world "));
    }

    #[test]
    fn prefix_of_a_line_is_not_a_member() {
        let index = index_of(b"abcdef\n");
        assert!(index.contains(b"abcdef"));
        assert!(!index.contains(b"abc"));
        assert!(!index.contains(b""));
    }

    #[test]
    fn crlf_terminators_are_normalized() {
        let index = index_of(b"first\r\nsecond\r\n");
        assert_eq!(index.len(), 2);
        assert!(index.contains(b"first"));
        assert!(index.contains(b"second"));
        // The \r belongs to the terminator, not the line.
        assert!(!index.contains(b"first\r"));
    }

    #[test]
    fn final_record_without_newline_is_indexed() {
        let index = index_of(b"first\nlast-no-newline");
        assert_eq!(index.len(), 2);
        assert!(index.contains(b"last-no-newline"));
    }

    #[test]
    fn empty_records_are_discarded() {
        let index = index_of(b"\n\na\n\r\n\nb\n\n");
        assert_eq!(index.len(), 2);
        assert!(index.contains(b"a"));
        assert!(index.contains(b"b"));
        assert!(!index.contains(b""));
    }

    #[test]
    fn duplicates_collapse() {
        let index = index_of(b"same\nsame\nsame\n");
        assert_eq!(index.len(), 1);
        assert_eq!(index.line_bytes(), 4);
    }

    #[test]
    fn non_utf8_lines_are_matched_byte_exact() {
        let index = index_of(b"\xff\xfe\x00binary\n");
        assert!(index.contains(b"\xff\xfe\x00binary"));
        assert!(!index.contains(b"\xff\xfe"));
    }

    #[test]
    fn empty_file_builds_empty_index() {
        let index = index_of(b"");
        assert!(index.is_empty());
        assert!(!index.contains(b"anything"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = LineIndex::build(Path::new("/nonexistent/really/not-here.txt"), 4096);
        assert!(err.is_err());
    }

    #[test]
    fn snapshot_records_file_length() {
        let content = b"one\ntwo\n";
        let index = index_of(content);
        assert_eq!(index.snapshot().len, content.len() as u64);
    }

    #[test]
    fn trim_record_rules() {
        assert_eq!(trim_record(b"abc\n"), b"abc");
        assert_eq!(trim_record(b"abc\r\n"), b"abc");
        assert_eq!(trim_record(b"abc\r\r\n"), b"abc\r");
        assert_eq!(trim_record(b"abc"), b"abc");
        assert_eq!(trim_record(b"\n"), b"");
        // A CRLF file missing its final newline still sheds the \r.
        assert_eq!(trim_record(b"abc\r"), b"abc");
    }
}
