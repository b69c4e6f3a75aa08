//! Crate-wide error taxonomy.
//!
//! Mirrors the failure classes a search core actually needs to distinguish:
//! storage failures are fatal to the current operation, invalid input is a caller
//! mistake, and search errors are internal invariant violations that should not occur
//! once the query planner has run. Soft failures (synonym file missing, one facet
//! failing, one suggestion variant failing) are logged and swallowed by the callers
//! that can tolerate them rather than represented here.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Connection failure, write conflict, disk error, schema mismatch.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Malformed MATCH expression or a type-cast failure on a metadata filter.
    /// Should not occur once the planner has built the query, but storage surfaces
    /// it verbatim rather than panic.
    #[error("search error: {0}")]
    Search(String),

    /// Unknown language, unknown operator, unknown index, or similar caller mistake.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
