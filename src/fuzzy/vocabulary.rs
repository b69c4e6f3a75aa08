//! The term vocabulary view fuzzy correction runs against (§4.3 Inputs).
//!
//! Loaded once per search and cached with a TTL by the caller ([`crate::engine`]);
//! this type itself is just the in-memory index over `term -> document-frequency`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    terms: HashMap<String, u64>,
    loaded_at: Option<Instant>,
}

impl Vocabulary {
    pub fn from_terms(terms: impl IntoIterator<Item = (String, u64)>) -> Self {
        Self {
            terms: terms.into_iter().collect(),
            loaded_at: Some(Instant::now()),
        }
    }

    pub fn is_stale(&self, ttl: Duration) -> bool {
        match self.loaded_at {
            None => true,
            Some(t) => t.elapsed() > ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn contains(&self, term: &str) -> bool {
        self.terms.contains_key(term)
    }

    pub fn frequency(&self, term: &str) -> u64 {
        self.terms.get(term).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.terms.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Terms whose length is within `max_diff` characters of `len`.
    pub fn terms_near_length(&self, len: usize, max_diff: usize) -> Vec<(&str, u64)> {
        self.terms
            .iter()
            .filter(|(t, _)| (t.chars().count() as i64 - len as i64).unsigned_abs() as usize <= max_diff)
            .map(|(k, v)| (k.as_str(), *v))
            .collect()
    }

    /// Vocabulary terms that have `prefix` as a case-insensitive prefix and are
    /// `1..=max_extra` characters longer.
    pub fn prefix_extensions<'a>(&'a self, prefix: &str, max_extra: usize) -> Vec<(&'a str, u64)> {
        let prefix_lower = prefix.to_lowercase();
        self.terms
            .iter()
            .filter(|(t, _)| {
                let tl = t.to_lowercase();
                if !tl.starts_with(&prefix_lower) {
                    return false;
                }
                let extra = t.chars().count().saturating_sub(prefix.chars().count());
                extra >= 1 && extra <= max_extra
            })
            .map(|(k, v)| (k.as_str(), *v))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_extensions_respects_extra_length_bounds() {
        let v = Vocabulary::from_terms([
            ("cat".to_string(), 10),
            ("category".to_string(), 50),
            ("catastrophe".to_string(), 3),
        ]);
        // "category" is 5 extra chars over "cat", within default 1..5
        let exts = v.prefix_extensions("cat", 5);
        let names: Vec<_> = exts.iter().map(|(t, _)| *t).collect();
        assert!(names.contains(&"category"));
        assert!(!names.contains(&"catastrophe")); // 8 extra chars, out of range
    }

    #[test]
    fn staleness_without_load_is_stale() {
        let v = Vocabulary::default();
        assert!(v.is_stale(Duration::from_secs(300)));
    }
}
