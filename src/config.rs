//! Recognised configuration keys (§6) grouped the way the teacher groups config:
//! small `serde`-derived structs with a `Default` impl carrying the documented
//! defaults, composed into one top-level struct.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{FuzzyCorrectionMode, Units};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FuzzyAlgorithm {
    Basic,
    Levenshtein,
    JaroWinkler,
    Trigram,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: String,
    pub external_content: bool,
    pub exclusive_lock: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "yetisearch.db".to_string(),
            external_content: true,
            exclusive_lock: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConfig {
    #[serde(default = "default_boost")]
    pub boost: f64,
    #[serde(default = "default_true")]
    pub store: bool,
}

fn default_boost() -> f64 {
    1.0
}
fn default_true() -> bool {
    true
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            boost: default_boost(),
            store: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    pub fields: BTreeMap<String, FieldConfig>,
    pub multi_column: bool,
    pub prefix: Vec<u32>,
    pub detail: String,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            fields: BTreeMap::new(),
            multi_column: false,
            prefix: Vec::new(),
            detail: "full".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub min_score: f64,
    pub max_results: usize,
    pub cache_ttl: u64,

    pub enable_fuzzy: bool,
    pub fuzzy_algorithm: FuzzyAlgorithm,
    pub fuzzy_correction_mode: FuzzyCorrectionMode,
    pub correction_threshold: f64,
    pub trigram_size: usize,
    pub trigram_threshold: f64,
    pub jaro_winkler_threshold: f64,
    pub levenshtein_threshold: usize,
    pub max_fuzzy_variations: usize,
    pub min_term_frequency: u64,
    pub indexed_terms_cache_ttl: u64,
    pub max_indexed_terms: usize,
    pub fuzzy_last_token_only: bool,
    pub prefix_last_token: bool,
    pub fuzzy_score_penalty: f64,
    pub fuzzy_total_max_variations: usize,

    pub enable_synonyms: bool,
    pub synonyms: BTreeMap<String, Vec<String>>,
    pub synonyms_case_sensitive: bool,
    pub synonyms_max_expansions: usize,

    pub enable_suggestions: bool,
    pub enable_highlighting: bool,
    pub highlight_tag: String,
    pub highlight_tag_close: String,
    pub snippet_length: usize,

    pub distance_weight: f64,
    pub distance_decay_k: f64,
    pub geo_units: Units,

    pub two_pass_search: bool,
    pub primary_fields: Vec<String>,
    pub primary_field_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_score: 0.0,
            max_results: 1000,
            cache_ttl: 300,

            enable_fuzzy: true,
            fuzzy_algorithm: FuzzyAlgorithm::Trigram,
            fuzzy_correction_mode: FuzzyCorrectionMode::Correction,
            correction_threshold: 0.65,
            trigram_size: 3,
            trigram_threshold: 0.35,
            jaro_winkler_threshold: 0.85,
            levenshtein_threshold: 2,
            max_fuzzy_variations: 5,
            min_term_frequency: 1,
            indexed_terms_cache_ttl: 300,
            max_indexed_terms: 50_000,
            fuzzy_last_token_only: false,
            prefix_last_token: false,
            fuzzy_score_penalty: 0.3,
            fuzzy_total_max_variations: 30,

            enable_synonyms: false,
            synonyms: BTreeMap::new(),
            synonyms_case_sensitive: false,
            synonyms_max_expansions: 3,

            enable_suggestions: true,
            enable_highlighting: true,
            highlight_tag: "<mark>".to_string(),
            highlight_tag_close: "</mark>".to_string(),
            snippet_length: 200,

            distance_weight: 0.0,
            distance_decay_k: 0.001,
            geo_units: Units::Meters,

            two_pass_search: false,
            primary_fields: vec![
                "title".to_string(),
                "h1".to_string(),
                "name".to_string(),
                "label".to_string(),
            ],
            primary_field_limit: 5,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct YetiSearchConfig {
    pub storage: StorageConfig,
    pub indexer: IndexerConfig,
    pub search: SearchConfig,
}
