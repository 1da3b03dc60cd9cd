//! Search Module
//!
//! Everything that turns a query into a membership verdict:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       QueryEngine                           │
//! │                                                             │
//! │   ┌─────────────┐        ┌────────────────────────────┐    │
//! │   │ LookupCache │        │        DataSource          │    │
//! │   │ (fast mode) │        │  ┌──────────┐ ┌─────────┐  │    │
//! │   └─────────────┘        │  │LineIndex │ │ Reread  │  │    │
//! │                          │  │ + Bloom  │ │ scanner │  │    │
//! │                          │  └──────────┘ └─────────┘  │    │
//! │                          └────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! - [`LineIndex`]: immutable hash set of the data file's distinct lines,
//!   fronted by a bloom filter as a negative fast path
//! - [`DataSource`]: the fast/reread mode switch with one `contains` op
//! - [`QueryEngine`]: cache + source composed into the per-query lookup

pub mod bloom;
pub mod engine;
pub mod index;
pub mod source;

// Re-export commonly used types
pub use bloom::Bloom;
pub use engine::QueryEngine;
pub use index::{FileSnapshot, LineIndex};
pub use source::DataSource;
