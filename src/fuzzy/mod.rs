//! C3 — Fuzzy Correction Engine: multi-algorithm consensus over a term vocabulary.
//!
//! [`algorithms`] holds the five similarity primitives, [`vocabulary`] the
//! in-memory term-frequency view they run against, and [`corrector`] the ordered
//! decision procedure (quick phonetic table, vocabulary hit, prefix extension,
//! compound-split-vs-fuzzy, weighted consensus) that ties them together (§4.3).

pub mod algorithms;
pub mod corrector;
pub mod vocabulary;

pub use corrector::{merge_adjacent_tokens, FuzzyCorrector};
pub use vocabulary::Vocabulary;
