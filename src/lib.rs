//! YetiSearch: an embedded, single-node full-text search library over SQLite, with
//! a native FTS5 inverted index, geo-aware ranking, and consensus-based fuzzy
//! correction.
//!
//! ```text
//! SearchEngine
//!   ├─ storage   (C2) schema, upsert/delete, planned-query execution
//!   ├─ spatial   (C1) rtree/table bounding-box index, distance math
//!   ├─ fuzzy     (C3) vocabulary + consensus corrector
//!   ├─ query     (C4) query planner: tokens -> MATCH expression
//!   └─ result    (C5) score pipeline, highlighting, dedup, facets, result cache
//! ```
//!
//! Tokenization, stemming and stop-word lists are supplied by the caller through
//! the [`analyzer::Analyzer`] trait; a minimal [`analyzer::SimpleAnalyzer`] is
//! included so the crate works out of the box.

pub mod analyzer;
pub mod config;
pub mod engine;
pub mod error;
pub mod fuzzy;
pub mod query;
pub mod result;
pub mod spatial;
pub mod storage;
pub mod types;

pub use config::{FuzzyAlgorithm, IndexerConfig, SearchConfig, StorageConfig, YetiSearchConfig};
pub use engine::SearchEngine;
pub use error::{Error, Result};
pub use types::{
    BBox, Document, Filter, FilterValue, FuzzyCorrectionMode, GeoBounds, GeoPoint, IndexOptions, Operator, SchemaMode,
    SearchQuery, SearchResultItem, SearchResults, SortDirection, SortField, Suggestion, Units,
};
