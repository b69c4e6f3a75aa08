//! Synonym expansion (§4.4 "Synonyms"), applied in both correction and expansion
//! rewriting modes.

use std::collections::HashMap;

use crate::config::SearchConfig;

pub struct SynonymExpander<'a> {
    config: &'a SearchConfig,
    /// lowercased term -> synonyms, built once when matching is case-insensitive so
    /// lookups don't re-lowercase the whole map per token.
    folded: Option<HashMap<String, Vec<String>>>,
}

impl<'a> SynonymExpander<'a> {
    pub fn new(config: &'a SearchConfig) -> Self {
        let folded = if config.enable_synonyms && !config.synonyms_case_sensitive {
            Some(
                config
                    .synonyms
                    .iter()
                    .map(|(k, v)| (k.to_lowercase(), v.clone()))
                    .collect(),
            )
        } else {
            None
        };
        Self { config, folded }
    }

    /// Up to `synonyms_max_expansions` synonyms for one token. `language` is accepted
    /// for forward compatibility with per-language synonym scoping but is currently
    /// unused — the configuration carries one flat `term -> synonyms` map.
    pub fn expand(&self, token: &str, _language: Option<&str>) -> Vec<String> {
        if !self.config.enable_synonyms {
            return Vec::new();
        }
        let hits = match &self.folded {
            Some(folded) => folded.get(&token.to_lowercase()),
            None => self.config.synonyms.get(token),
        };
        hits.into_iter()
            .flatten()
            .take(self.config.synonyms_max_expansions)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_case_insensitively_by_default() {
        let mut config = SearchConfig::default();
        config.enable_synonyms = true;
        config.synonyms.insert("car".to_string(), vec!["automobile".to_string(), "vehicle".to_string()]);
        let expander = SynonymExpander::new(&config);
        assert_eq!(expander.expand("CAR", None), vec!["automobile".to_string(), "vehicle".to_string()]);
    }

    #[test]
    fn disabled_returns_nothing() {
        let config = SearchConfig::default();
        let expander = SynonymExpander::new(&config);
        assert!(expander.expand("car", None).is_empty());
    }
}
