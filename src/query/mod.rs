//! C4 — Query Planner: turns a [`SearchQuery`] into exactly one MATCH expression
//! plus the structured filter/sort payload handed to [`crate::storage::Storage`]
//! (§4.4).

mod synonyms;

use std::collections::BTreeSet;

use crate::analyzer::Analyzer;
use crate::config::SearchConfig;
use crate::error::Result;
use crate::fuzzy::{merge_adjacent_tokens, FuzzyCorrector, Vocabulary};
use crate::types::{FuzzyCorrectionMode, IndexOptions, PlannedQuery, SearchQuery};

pub use synonyms::SynonymExpander;

pub struct QueryPlanner<'a> {
    analyzer: &'a dyn Analyzer,
    corrector: &'a FuzzyCorrector,
    config: &'a SearchConfig,
}

impl<'a> QueryPlanner<'a> {
    pub fn new(analyzer: &'a dyn Analyzer, corrector: &'a FuzzyCorrector, config: &'a SearchConfig) -> Self {
        Self { analyzer, corrector, config }
    }

    pub fn plan(&self, query: &SearchQuery, vocab: &Vocabulary, index_options: &IndexOptions) -> Result<PlannedQuery> {
        let mut planned = PlannedQuery {
            filters: query.filters.clone(),
            sort: query.sort.clone(),
            language: query.language.clone(),
            field_weights: query.field_weights.clone(),
            fields: query.fields.clone(),
            geo: query.geo.clone(),
            limit: query.limit,
            offset: query.offset,
            bypass_cache: query.bypass_cache,
            two_pass_search: self.config.two_pass_search,
            ..Default::default()
        };

        let Some(text) = query.text.as_deref().filter(|t| !t.trim().is_empty()) else {
            return Ok(planned);
        };

        let raw_tokens = self.analyzer.tokenize(text);
        let tokens = self.analyzer.remove_stop_words(raw_tokens, query.language.as_deref());
        if tokens.is_empty() {
            return Ok(planned);
        }
        let tokens = if self.config.enable_fuzzy {
            merge_adjacent_tokens(&tokens, vocab)
        } else {
            tokens
        };

        planned.original_tokens = tokens.clone();
        let synonym_expander = SynonymExpander::new(self.config);
        let last_idx = tokens.len() - 1;

        let (match_expr, fuzzy_tokens) = match self.config.fuzzy_correction_mode {
            FuzzyCorrectionMode::Correction => self.build_correction_mode(&tokens, last_idx, vocab, index_options, &synonym_expander, query),
            FuzzyCorrectionMode::Expansion => self.build_expansion_mode(&tokens, last_idx, vocab, index_options, &synonym_expander, query),
        };

        planned.match_expr = Some(match_expr);
        planned.fuzzy_tokens = fuzzy_tokens;
        Ok(planned)
    }

    fn should_correct(&self, idx: usize, last_idx: usize) -> bool {
        self.config.enable_fuzzy && (!self.config.fuzzy_last_token_only || idx == last_idx)
    }

    fn build_correction_mode(
        &self,
        tokens: &[String],
        last_idx: usize,
        vocab: &Vocabulary,
        index_options: &IndexOptions,
        synonyms: &SynonymExpander,
        query: &SearchQuery,
    ) -> (String, Vec<String>) {
        let mut fuzzy_tokens = Vec::new();
        let mut parts = Vec::with_capacity(tokens.len());
        let mut syn_budget = global_synonym_budget(self.config);

        for (idx, tok) in tokens.iter().enumerate() {
            let corrected = if self.should_correct(idx, last_idx) {
                self.corrector.correct(tok, vocab)
            } else {
                tok.clone()
            };
            if corrected != *tok {
                fuzzy_tokens.push(corrected.clone());
            }

            let mut syns = synonyms.expand(tok, query.language.as_deref());
            syns.truncate(syn_budget);
            syn_budget -= syns.len();

            let mut term = escape_token(&corrected);
            if idx == last_idx && self.config.prefix_last_token && !index_options.prefix.is_empty() {
                term.push('*');
            }

            if syns.is_empty() {
                parts.push(term);
            } else {
                let mut group = vec![term];
                group.extend(syns.iter().map(|s| escape_token(s)));
                parts.push(format!("({})", group.join(" OR ")));
            }
        }

        (parts.join(" "), fuzzy_tokens)
    }

    fn build_expansion_mode(
        &self,
        tokens: &[String],
        last_idx: usize,
        vocab: &Vocabulary,
        index_options: &IndexOptions,
        synonyms: &SynonymExpander,
        query: &SearchQuery,
    ) -> (String, Vec<String>) {
        let mut budget = self.config.fuzzy_total_max_variations;
        let mut syn_budget = global_synonym_budget(self.config);
        let mut variations: BTreeSet<String> = BTreeSet::new();
        let mut fuzzy_tokens = Vec::new();

        for (idx, tok) in tokens.iter().enumerate() {
            if self.should_correct(idx, last_idx) && budget > 0 {
                let vs = self.corrector.variations(tok, self.config.fuzzy_algorithm, vocab);
                for v in vs.into_iter().take(budget) {
                    if v != *tok && variations.insert(v.clone()) {
                        fuzzy_tokens.push(v);
                        budget = budget.saturating_sub(1);
                    }
                }
            }
            for syn in synonyms.expand(tok, query.language.as_deref()) {
                if syn_budget == 0 {
                    break;
                }
                if variations.insert(syn.clone()) {
                    syn_budget -= 1;
                }
            }
        }

        let last_term = if self.config.prefix_last_token && !index_options.prefix.is_empty() {
            format!("{}*", tokens[last_idx])
        } else {
            tokens[last_idx].clone()
        };
        let mut ordered_tokens = tokens.to_vec();
        ordered_tokens[last_idx] = last_term;

        let fuzzy_group = if variations.is_empty() {
            None
        } else {
            Some(format!("({})", variations.iter().map(|v| escape_token(v)).collect::<Vec<_>>().join(" OR ")))
        };

        let expr = if ordered_tokens.len() > 1 {
            let phrase = format!("\"{}\"", ordered_tokens.join(" ").replace('\'', "''"));
            let near = format!("NEAR({}, 10)", ordered_tokens.iter().map(|t| escape_token(t)).collect::<Vec<_>>().join(" "));
            match fuzzy_group {
                Some(g) => format!("{phrase} OR {near} OR {g}"),
                None => format!("{phrase} OR {near}"),
            }
        } else {
            let mut alts = vec![escape_token(&ordered_tokens[0])];
            alts.extend(variations.iter().map(|v| escape_token(v)));
            format!("({})", alts.join(" OR "))
        };

        (expr, fuzzy_tokens)
    }
}

/// Query-wide synonym ceiling (§4.4 "Synonyms": "a global cap of `max(5,
/// per_term·10)` additions"), independent of the fuzzy-variation budget.
fn global_synonym_budget(config: &SearchConfig) -> usize {
    (config.synonyms_max_expansions * 10).max(5)
}

/// Wrap a token that contains an apostrophe in a quoted phrase (doubling internal
/// quotes) so no FTS5 operator leaks from raw user input (§4.4 "Token escaping").
fn escape_token(t: &str) -> String {
    if t.contains('\'') || t.contains('"') {
        format!("\"{}\"", t.replace('"', "\"\"").replace('\'', "''"))
    } else {
        t.to_string()
    }
}
