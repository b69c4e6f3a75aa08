//! `SearchEngine`: orchestrates C2 (Storage) -> C3 (Fuzzy/Vocabulary) -> C4 (Query
//! Planner) -> C5 (Result Processor) behind the public search/count/suggest API
//! (§6). Owns the two caches the spec's "Shared-resource policy" describes: the
//! per-index term vocabulary (TTL-bound) and the per-engine query result cache
//! (invalidated wholesale for an index on any write to it).

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use serde_json::Value as Json;

use crate::analyzer::{Analyzer, SimpleAnalyzer};
use crate::config::{IndexerConfig, SearchConfig, StorageConfig};
use crate::error::Result;
use crate::fuzzy::{FuzzyCorrector, Vocabulary};
use crate::query::QueryPlanner;
use crate::result::{dedupe_by_route, ResultCache, ResultProcessor};
use crate::storage::Storage;
use crate::types::{
    Document, FacetBucket, FacetRequest, FacetResult, FtsDetail, IndexOptions, SchemaMode, SearchQuery, SearchResults,
    Suggestion,
};

pub struct SearchEngine {
    storage: Storage,
    analyzer: Box<dyn Analyzer>,
    config: RwLock<SearchConfig>,
    vocab_cache: Mutex<HashMap<String, Vocabulary>>,
    result_cache: Mutex<ResultCache>,
    /// `storage.external_content` (§6): whether a single-column index defaults to
    /// external-content mode or legacy mode. Multi-column indices are always legacy
    /// (external-content is single-column-only, §4.2) regardless of this flag.
    external_content: bool,
}

impl SearchEngine {
    /// Open (or create) the database at `storage_config.path` with a built-in
    /// [`SimpleAnalyzer`]. Use [`Self::with_analyzer`] to supply a stemmer-aware one.
    pub fn open(storage_config: &StorageConfig, search_config: SearchConfig) -> Result<Self> {
        Self::with_analyzer(storage_config, search_config, Box::new(SimpleAnalyzer::new()))
    }

    pub fn with_analyzer(storage_config: &StorageConfig, search_config: SearchConfig, analyzer: Box<dyn Analyzer>) -> Result<Self> {
        let storage = Storage::connect(storage_config)?;
        let ttl = search_config.cache_ttl;
        Ok(Self {
            storage,
            analyzer,
            config: RwLock::new(search_config),
            vocab_cache: Mutex::new(HashMap::new()),
            result_cache: Mutex::new(ResultCache::new(ttl)),
            external_content: storage_config.external_content,
        })
    }

    #[cfg(test)]
    pub fn open_in_memory(search_config: SearchConfig) -> Result<Self> {
        let storage = Storage::open_in_memory()?;
        let ttl = search_config.cache_ttl;
        Ok(Self {
            storage,
            analyzer: Box::new(SimpleAnalyzer::new()),
            config: RwLock::new(search_config),
            vocab_cache: Mutex::new(HashMap::new()),
            result_cache: Mutex::new(ResultCache::new(ttl)),
            external_content: true,
        })
    }

    pub fn create_index(&self, name: &str, indexer: &IndexerConfig) -> Result<()> {
        let options = index_options_from_config(indexer, self.external_content);
        self.storage.create_index(name, &options)?;
        self.invalidate(name);
        Ok(())
    }

    pub fn drop_index(&self, name: &str) -> Result<()> {
        self.storage.drop_index(name)?;
        self.invalidate(name);
        Ok(())
    }

    pub fn index_exists(&self, name: &str) -> Result<bool> {
        self.storage.index_exists(name)
    }

    pub fn list_indices(&self) -> Result<Vec<String>> {
        self.storage.list_indices()
    }

    pub fn insert(&self, index: &str, doc: &Document) -> Result<()> {
        self.storage.insert(index, doc)?;
        self.invalidate(index);
        Ok(())
    }

    pub fn insert_batch(&self, index: &str, docs: &[Document]) -> Result<()> {
        self.storage.insert_batch(index, docs)?;
        self.invalidate(index);
        Ok(())
    }

    pub fn update(&self, index: &str, doc: &Document) -> Result<()> {
        self.storage.update(index, doc)?;
        self.invalidate(index);
        Ok(())
    }

    pub fn delete(&self, index: &str, id: &str) -> Result<()> {
        self.storage.delete(index, id)?;
        self.invalidate(index);
        Ok(())
    }

    pub fn clear(&self, index: &str) -> Result<()> {
        self.storage.clear(index)?;
        self.invalidate(index);
        Ok(())
    }

    /// Replace the active search configuration and drop every cached vocabulary and
    /// result, since thresholds, weights and cache TTLs baked into those caches may
    /// no longer be valid (§5 "Shared-resource policy").
    pub fn update_config(&self, new_config: SearchConfig) {
        let ttl = new_config.cache_ttl;
        *self.config.write() = new_config;
        self.vocab_cache.lock().clear();
        *self.result_cache.lock() = ResultCache::new(ttl);
    }

    pub fn search(&self, query: &SearchQuery) -> Result<SearchResults> {
        let config = self.config.read().clone();
        let cache_key = ResultCache::key(&query.index, &canonical_query(query), "");
        if !query.bypass_cache {
            if let Some(cached) = self.result_cache.lock().get(&cache_key) {
                return Ok(cached);
            }
        }

        let index_options = self.storage.load_index_options(&query.index)?;
        let vocab = self.vocabulary(&query.index, &config)?;
        let corrector = FuzzyCorrector::new(&config);
        let planner = QueryPlanner::new(self.analyzer.as_ref(), &corrector, &config);
        let mut planned = planner.plan(query, &vocab, &index_options)?;
        apply_default_field_boosts(&mut planned.field_weights, &index_options.field_boosts);

        // Over-fetch when route dedup will collapse multiple rows into one result so
        // the caller still gets a full page.
        let requested_limit = planned.limit;
        if query.unique_by_route {
            planned.limit = (planned.limit * 3).min(config.max_results);
        }

        let rows = self.storage.search(&query.index, &planned)?;
        let processor = ResultProcessor::new(&config);
        let mut items = processor.process(rows, &planned);

        if query.unique_by_route {
            items = dedupe_by_route(items);
            items.truncate(requested_limit);
        }

        // An explicit distance ordering request (`distance_sort`, or a `nearest`
        // k-NN query with no text) is honored as-is; otherwise rank by the blended
        // score C5 just computed rather than the raw SQL row order.
        let explicit_distance_order = planned.geo.distance_sort.is_some() || (planned.geo.nearest.is_some() && planned.match_expr.is_none());
        if !explicit_distance_order {
            items.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        }

        processor.highlight(&mut items, &planned);
        strip_unstored_fields(&mut items, &index_options.unstored_fields);

        let total = self.storage.count(&query.index, &planned).ok();

        let suggestion = if items.is_empty() && config.enable_suggestions {
            self.best_suggestion(query, &vocab, &corrector)
        } else {
            None
        };

        let facets = self.compute_facets(query, &planned, &config)?;

        let results = SearchResults { items, total, facets, suggestion };
        if !query.bypass_cache {
            self.result_cache.lock().put(cache_key, results.clone());
        }
        Ok(results)
    }

    pub fn count(&self, query: &SearchQuery) -> Result<usize> {
        let config = self.config.read().clone();
        let index_options = self.storage.load_index_options(&query.index)?;
        let vocab = self.vocabulary(&query.index, &config)?;
        let corrector = FuzzyCorrector::new(&config);
        let planner = QueryPlanner::new(self.analyzer.as_ref(), &corrector, &config);
        let planned = planner.plan(query, &vocab, &index_options)?;
        self.storage.count(&query.index, &planned)
    }

    /// `(text, score, count)` spelling suggestions for one raw term (§6
    /// `suggest(term, options) -> [(text, score, count)]`).
    pub fn suggest(&self, index: &str, term: &str, k: usize) -> Result<Vec<(String, f64, u64)>> {
        let config = self.config.read().clone();
        let vocab = self.vocabulary(index, &config)?;
        let corrector = FuzzyCorrector::new(&config);
        Ok(corrector.suggest_ranked(term, k, &vocab))
    }

    /// Ranked [`Suggestion`]s for a query's text (§6 `generateSuggestions(query, k) ->
    /// [Suggestion]`), scored via the same consensus pipeline as [`Self::suggest`].
    pub fn generate_suggestions(&self, query: &SearchQuery, k: usize) -> Result<Vec<Suggestion>> {
        let config = self.config.read().clone();
        let vocab = self.vocabulary(&query.index, &config)?;
        let corrector = FuzzyCorrector::new(&config);
        let term = query.text.as_deref().unwrap_or("").trim();
        if term.is_empty() {
            return Ok(Vec::new());
        }
        Ok(corrector.suggest(term, k, &vocab))
    }

    fn vocabulary(&self, index: &str, config: &SearchConfig) -> Result<Vocabulary> {
        let ttl = Duration::from_secs(config.indexed_terms_cache_ttl);
        {
            let cache = self.vocab_cache.lock();
            if let Some(v) = cache.get(index) {
                if !v.is_stale(ttl) {
                    return Ok(v.clone());
                }
            }
        }
        let terms = self.storage.get_indexed_terms(index, config.min_term_frequency, config.max_indexed_terms)?;
        let vocab = Vocabulary::from_terms(terms);
        self.vocab_cache.lock().insert(index.to_string(), vocab.clone());
        Ok(vocab)
    }

    fn best_suggestion(&self, query: &SearchQuery, vocab: &Vocabulary, corrector: &FuzzyCorrector) -> Option<String> {
        let text = query.text.as_deref()?.trim();
        if text.is_empty() {
            return None;
        }
        let corrected: Vec<String> = self
            .analyzer
            .tokenize(text)
            .into_iter()
            .map(|t| corrector.correct(&t, vocab))
            .collect();
        let joined = corrected.join(" ");
        if joined.eq_ignore_ascii_case(text) {
            None
        } else {
            Some(joined)
        }
    }

    /// Re-issue the filtered query without a limit/offset and tally facet values in
    /// memory (§4.5 "Facets") — the reserved `distance` facet bins by the request's
    /// thresholds; any other field is treated as a `metadata.<field>` histogram.
    fn compute_facets(&self, query: &SearchQuery, planned: &crate::types::PlannedQuery, config: &SearchConfig) -> Result<Vec<FacetResult>> {
        if query.facets.is_empty() {
            return Ok(Vec::new());
        }
        let mut unbounded = planned.clone();
        unbounded.limit = config.max_results;
        unbounded.offset = 0;
        let rows = self.storage.search(&query.index, &unbounded)?;

        let out = query.facets.par_iter().map(|facet| compute_one_facet(facet, &rows)).collect();
        Ok(out)
    }

    fn invalidate(&self, index: &str) {
        self.vocab_cache.lock().remove(index);
        self.result_cache.lock().invalidate_index(index);
    }
}

fn compute_one_facet(facet: &FacetRequest, rows: &[crate::types::RawRow]) -> FacetResult {
    if facet.field == "distance" {
        let thresholds = facet.distance_thresholds.clone().unwrap_or_default();
        let mut counts = vec![0u64; thresholds.len() + 1];
        for row in rows {
            let Some(d) = row.distance else { continue };
            let bucket = thresholds.iter().position(|t| d <= *t).unwrap_or(thresholds.len());
            counts[bucket] += 1;
        }
        let buckets = counts
            .into_iter()
            .enumerate()
            .map(|(i, count)| {
                let label = if i < thresholds.len() {
                    format!("<= {}", thresholds[i])
                } else {
                    format!("> {}", thresholds.last().copied().unwrap_or(0.0))
                };
                FacetBucket { value: label, count }
            })
            .filter(|b| b.count >= facet.min_count)
            .collect();
        return FacetResult { field: facet.field.clone(), buckets };
    }

    let mut tally: BTreeMap<String, u64> = BTreeMap::new();
    for row in rows {
        let value = row.metadata.get(&facet.field).or_else(|| row.content.get(&facet.field));
        let Some(value) = value else { continue };
        for label in facet_labels(value) {
            *tally.entry(label).or_insert(0) += 1;
        }
    }
    let mut buckets: Vec<FacetBucket> = tally
        .into_iter()
        .filter(|(_, count)| *count >= facet.min_count)
        .map(|(value, count)| FacetBucket { value, count })
        .collect();
    buckets.sort_by(|a, b| b.count.cmp(&a.count));
    FacetResult { field: facet.field.clone(), buckets }
}

fn facet_labels(value: &Json) -> Vec<String> {
    match value {
        Json::String(s) => vec![s.clone()],
        Json::Number(n) => vec![n.to_string()],
        Json::Bool(b) => vec![b.to_string()],
        Json::Array(items) => items.iter().flat_map(facet_labels).collect(),
        _ => Vec::new(),
    }
}

/// Drops `indexer.fields.{name}.store == false` fields from the content returned to
/// the caller. These fields are still indexed and scored; they're only withheld
/// from the result payload (§6).
fn strip_unstored_fields(items: &mut [crate::types::SearchResultItem], unstored: &std::collections::BTreeSet<String>) {
    if unstored.is_empty() {
        return;
    }
    for item in items {
        for field in unstored {
            item.content.remove(field);
        }
    }
}

/// Fills in `indexer.fields.{name}.boost` for any field the query didn't already
/// supply its own weight for (§6 `field_weights` overrides the index default).
fn apply_default_field_boosts(field_weights: &mut BTreeMap<String, f64>, field_boosts: &BTreeMap<String, f64>) {
    for (field, boost) in field_boosts {
        field_weights.entry(field.clone()).or_insert(*boost);
    }
}

fn canonical_query(query: &SearchQuery) -> String {
    serde_json::to_string(query).unwrap_or_default()
}

fn index_options_from_config(indexer: &IndexerConfig, external_content: bool) -> IndexOptions {
    let fts_columns: Vec<String> = if indexer.fields.is_empty() {
        vec!["content".to_string()]
    } else {
        indexer.fields.keys().cloned().collect()
    };
    IndexOptions {
        // Multi-column FTS needs one FTS column per field, which external-content
        // mode (single FTS column only, §4.2) cannot express, so multi-column always
        // forces legacy regardless of the `external_content` setting.
        schema_mode: if indexer.multi_column || !external_content { SchemaMode::Legacy } else { SchemaMode::External },
        multi_column: indexer.multi_column,
        prefix: indexer.prefix.clone(),
        spatial_enabled: true,
        fts_detail: match indexer.detail.as_str() {
            "column" => FtsDetail::Column,
            "none" => FtsDetail::None,
            _ => FtsDetail::Full,
        },
        fts_columns,
        field_boosts: indexer.fields.iter().map(|(name, field)| (name.clone(), field.boost)).collect(),
        unstored_fields: indexer.fields.iter().filter(|(_, field)| !field.store).map(|(name, _)| name.clone()).collect(),
    }
}

/// Bearing/cardinal helpers re-exported for convenience; a caller that only has raw
/// points (no search result) can still compute a direction (§4.1).
pub use crate::spatial::{bearing_degrees, cardinal_direction};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Filter, Operator};
    use serde_json::json;

    fn engine() -> SearchEngine {
        let engine = SearchEngine::open_in_memory(SearchConfig::default()).unwrap();
        engine.create_index("docs", &IndexerConfig::default()).unwrap();
        engine
    }

    #[test]
    fn insert_then_search_finds_document() {
        let engine = engine();
        engine.insert("docs", &Document::new("a", 1000).with_field("content", json!("rocket propulsion"))).unwrap();

        let mut query = SearchQuery::new("docs");
        query.text = Some("rocket".to_string());
        let results = engine.search(&query).unwrap();
        assert_eq!(results.items.len(), 1);
        assert_eq!(results.items[0].id, "a");
    }

    #[test]
    fn fuzzy_correction_finds_misspelled_term() {
        let engine = engine();
        engine.insert("docs", &Document::new("a", 1000).with_field("content", json!("call my phone"))).unwrap();
        engine
            .insert("docs", &Document::new("b", 1000).with_field("content", json!("phone phone phone phone phone")))
            .unwrap();

        let mut query = SearchQuery::new("docs");
        query.text = Some("fone".to_string());
        let results = engine.search(&query).unwrap();
        assert!(!results.items.is_empty());
    }

    #[test]
    fn metadata_filter_narrows_results() {
        let engine = engine();
        let mut doc = Document::new("a", 1000).with_field("content", json!("hello"));
        doc.metadata = json!({"route": "/a"});
        engine.insert("docs", &doc).unwrap();

        let mut query = SearchQuery::new("docs");
        query.filters.push(Filter::new("metadata.route", Operator::Eq, "/a"));
        let results = engine.search(&query).unwrap();
        assert_eq!(results.items.len(), 1);
    }

    #[test]
    fn update_config_clears_caches() {
        let engine = engine();
        engine.insert("docs", &Document::new("a", 1000).with_field("content", json!("hello world"))).unwrap();
        let mut query = SearchQuery::new("docs");
        query.text = Some("hello".to_string());
        let _ = engine.search(&query).unwrap();
        assert!(!engine.vocab_cache.lock().is_empty());
        engine.update_config(SearchConfig::default());
        assert!(engine.vocab_cache.lock().is_empty());
    }

    #[test]
    fn route_dedup_merges_chunks_into_one_result() {
        let engine = engine();
        let mut a = Document::new("a1", 1000).with_field("content", json!("rocket launch day one"));
        a.metadata = json!({"route": "/page"});
        let mut b = Document::new("a2", 1000).with_field("content", json!("rocket launch day two"));
        b.metadata = json!({"route": "/page"});
        engine.insert_batch("docs", &[a, b]).unwrap();

        let mut query = SearchQuery::new("docs");
        query.text = Some("rocket".to_string());
        query.unique_by_route = true;
        let results = engine.search(&query).unwrap();
        assert_eq!(results.items.len(), 1);
        assert_eq!(results.items[0].chunk_count, Some(2));
    }

    #[test]
    fn unstored_field_is_searchable_but_absent_from_results() {
        let engine = SearchEngine::open_in_memory(SearchConfig::default()).unwrap();
        let mut fields = BTreeMap::new();
        fields.insert("title".to_string(), crate::config::FieldConfig::default());
        fields.insert("secret".to_string(), crate::config::FieldConfig { boost: 1.0, store: false });
        engine.create_index("docs", &IndexerConfig { fields, ..Default::default() }).unwrap();

        let mut doc = Document::new("a", 1000);
        doc.content.insert("title".to_string(), json!("rocket launch"));
        doc.content.insert("secret".to_string(), json!("classified payload"));
        engine.insert("docs", &doc).unwrap();

        let mut query = SearchQuery::new("docs");
        query.text = Some("classified".to_string());
        let results = engine.search(&query).unwrap();
        assert_eq!(results.items.len(), 1, "unstored field should still be searchable");
        assert!(!results.items[0].content.contains_key("secret"));
    }

    #[test]
    fn index_field_boost_ranks_title_hit_above_body_hit() {
        let engine = SearchEngine::open_in_memory(SearchConfig::default()).unwrap();
        let mut fields = BTreeMap::new();
        fields.insert("title".to_string(), crate::config::FieldConfig { boost: 5.0, store: true });
        fields.insert("body".to_string(), crate::config::FieldConfig { boost: 1.0, store: true });
        engine.create_index("docs", &IndexerConfig { fields, multi_column: true, ..Default::default() }).unwrap();

        let mut in_title = Document::new("in-title", 1000);
        in_title.content.insert("title".to_string(), json!("rocket propulsion"));
        in_title.content.insert("body".to_string(), json!("general overview"));
        let mut in_body = Document::new("in-body", 1000);
        in_body.content.insert("title".to_string(), json!("general overview"));
        in_body.content.insert("body".to_string(), json!("mentions rocket propulsion in passing"));
        engine.insert_batch("docs", &[in_title, in_body]).unwrap();

        let mut query = SearchQuery::new("docs");
        query.text = Some("rocket propulsion".to_string());
        let results = engine.search(&query).unwrap();
        assert_eq!(results.items[0].id, "in-title");
    }

    #[test]
    fn suggest_returns_text_score_count_tuples() {
        let engine = engine();
        for _ in 0..5 {
            engine.insert("docs", &Document::new("a", 1000).with_field("content", json!("phone phone"))).unwrap();
        }
        let suggestions = engine.suggest("docs", "fone", 3).unwrap();
        assert!(!suggestions.is_empty());
        let (text, score, count) = &suggestions[0];
        assert_eq!(text, "phone");
        assert!(*score > 0.0);
        assert!(*count > 0);
    }

    #[test]
    fn generate_suggestions_takes_full_query_and_returns_suggestion_structs() {
        let engine = engine();
        engine.insert("docs", &Document::new("a", 1000).with_field("content", json!("rocket propulsion phone"))).unwrap();

        let mut query = SearchQuery::new("docs");
        query.text = Some("fone".to_string());
        let suggestions = engine.generate_suggestions(&query, 3).unwrap();
        assert!(!suggestions.is_empty());
        assert_eq!(suggestions[0].text, "phone");
    }

    #[test]
    fn generate_suggestions_on_empty_query_text_is_empty() {
        let engine = engine();
        let query = SearchQuery::new("docs");
        let suggestions = engine.generate_suggestions(&query, 3).unwrap();
        assert!(suggestions.is_empty());
    }
}
