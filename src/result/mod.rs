//! C5 — Result Processor: turns storage's [`RawRow`]s into scored, highlighted,
//! deduplicated [`SearchResultItem`]s (§4.5).

mod cache;
mod dedup;
mod highlight;

pub use cache::ResultCache;
pub use dedup::dedupe_by_route;

use std::collections::BTreeMap;

use serde_json::Value as Json;

use crate::config::SearchConfig;
use crate::fuzzy::algorithms::{jaro_winkler_similarity, levenshtein_distance};
use crate::spatial::{bearing_degrees, cardinal_direction};
use crate::types::{GeoPoint, PlannedQuery, RawRow, SearchResultItem};

pub struct ResultProcessor<'a> {
    config: &'a SearchConfig,
}

impl<'a> ResultProcessor<'a> {
    pub fn new(config: &'a SearchConfig) -> Self {
        Self { config }
    }

    /// Run the full score pipeline (§4.5 steps 1-6) over one page of raw rows and
    /// attach highlights. `origin` is the reference point used for distance blending
    /// and bearing, when the planned query carries one.
    pub fn process(&self, rows: Vec<RawRow>, planned: &PlannedQuery) -> Vec<SearchResultItem> {
        let origin = planned
            .geo
            .near
            .as_ref()
            .map(|n| n.point)
            .or_else(|| planned.geo.distance_sort.as_ref().map(|s| s.from));

        // Step 1: drop rows whose text rank falls below the floor.
        let survivors: Vec<RawRow> = rows
            .into_iter()
            .filter(|r| match r.rank {
                Some(rank) => rank.abs() >= self.config.min_score,
                None => true,
            })
            .collect();

        // Step 2: normalize the raw (sign-flipped) BM25 rank to a 0-100 scale.
        let raw_scores: Vec<f64> = survivors.iter().map(|r| r.rank.map(|rank| -rank).unwrap_or(0.0)).collect();
        let max_raw = raw_scores.iter().cloned().fold(0.0_f64, f64::max);

        survivors
            .into_iter()
            .zip(raw_scores)
            .map(|(row, raw)| self.score_row(row, raw, max_raw, planned, origin))
            .collect()
    }

    fn score_row(&self, row: RawRow, raw: f64, max_raw: f64, planned: &PlannedQuery, origin: Option<GeoPoint>) -> SearchResultItem {
        let norm = if max_raw > 0.0 { 100.0 * raw / max_raw } else { 0.0 };

        // Step 3: fuzzy penalty.
        let body = row.concatenated_content().to_lowercase();
        let penalty = if row.rank.is_some() && !planned.original_tokens.is_empty() {
            fuzzy_penalty(&planned.original_tokens, &planned.fuzzy_tokens, &body, self.config.fuzzy_score_penalty)
        } else {
            0.0
        };
        let after_penalty = norm * (1.0 - penalty);

        // Step 4: field-weighted re-score.
        let boost = field_boost(&row.content, &planned.original_tokens, &planned.field_weights, &self.config.primary_fields, self.config.primary_field_limit);
        let after_fields = after_penalty * (1.0 + boost);

        // Step 5: distance blending.
        let (final_score, distance) = match row.distance {
            Some(d) => {
                let weight = planned_distance_weight(planned, self.config);
                let d_score = 100.0 * (-self.config.distance_decay_k * d / 1000.0).exp();
                // Scoring always works in meters (the decay curve is calibrated against
                // them); only the value reported back to the caller honors `geo_units`.
                ((1.0 - weight) * after_fields + weight * d_score, Some(self.config.geo_units.from_meters(d)))
            }
            None => (after_fields, None),
        };

        // Step 6: bearing / cardinal direction.
        let (bearing, cardinal) = match (origin, row.centroid) {
            (Some(from), Some(to)) => {
                let b = bearing_degrees(from, to);
                (Some(b), Some(cardinal_direction(b).to_string()))
            }
            _ => (None, None),
        };

        let route = route_from_metadata(&row.metadata);

        SearchResultItem {
            id: row.id,
            score: final_score,
            content: row.content,
            metadata: row.metadata,
            distance,
            bearing,
            cardinal,
            highlights: BTreeMap::new(),
            route,
            chunk_count: None,
        }
    }

    /// Attach highlighted snippets per content field (§4.5 "Highlighting"). Run
    /// separately from [`Self::process`] since highlighting only makes sense once the
    /// caller has decided which page of (already deduplicated) items to show.
    pub fn highlight(&self, items: &mut [SearchResultItem], planned: &PlannedQuery) {
        if !self.config.enable_highlighting {
            return;
        }
        let mut tokens = planned.original_tokens.clone();
        tokens.extend(planned.fuzzy_tokens.iter().cloned());
        if tokens.is_empty() {
            return;
        }
        for item in items.iter_mut() {
            for (field, value) in &item.content {
                let Json::String(text) = value else { continue };
                if let Some(snippet) = highlight::highlight_field(text, &tokens, &self.config.highlight_tag, &self.config.highlight_tag_close, self.config.snippet_length) {
                    item.highlights.entry(field.clone()).or_default().push(snippet);
                }
            }
        }
    }
}

fn planned_distance_weight(planned: &PlannedQuery, config: &SearchConfig) -> f64 {
    // Neither `SearchQuery` nor `PlannedQuery` currently forwards a per-query
    // override into the planned payload beyond what config carries; once one is
    // threaded through (`SearchQuery::distance_weight`) this is the seam to read it.
    let _ = planned;
    config.distance_weight
}

fn route_from_metadata(metadata: &Json) -> Option<String> {
    metadata.get("route").and_then(|v| v.as_str()).map(|s| s.to_string())
}

/// §4.5 step 3: five-tier fuzzy penalty, as a multiplicative discount in `[0, 1]`.
fn fuzzy_penalty(original_tokens: &[String], fuzzy_tokens: &[String], body_lower: &str, base: f64) -> f64 {
    if original_tokens.is_empty() {
        return 0.0;
    }
    let present: Vec<bool> = original_tokens.iter().map(|t| body_lower.contains(&t.to_lowercase())).collect();
    let present_count = present.iter().filter(|p| **p).count();
    let exact_ratio = present_count as f64 / original_tokens.len() as f64;
    let fuzzy_present = fuzzy_tokens.iter().any(|t| body_lower.contains(&t.to_lowercase()));

    let full_phrase = original_tokens.len() > 1 && body_lower.contains(&original_tokens.join(" ").to_lowercase());
    if full_phrase {
        return 0.05;
    }
    if present_count == original_tokens.len() && !fuzzy_present {
        return 0.10;
    }
    if exact_ratio >= 0.75 {
        return 0.20;
    }
    if present_count > 0 && fuzzy_present {
        return base * (1.0 - 0.5 * exact_ratio);
    }
    if present_count == 0 && fuzzy_present {
        let best_jw = original_tokens
            .iter()
            .flat_map(|o| fuzzy_tokens.iter().map(move |f| jaro_winkler_similarity(o, f)))
            .fold(0.0_f64, f64::max);
        if best_jw >= 0.95 {
            return base * 0.7;
        }
        if best_jw >= 0.85 {
            return base * 0.85;
        }
        let best_lev = original_tokens
            .iter()
            .flat_map(|o| fuzzy_tokens.iter().map(move |f| levenshtein_distance(o, f)))
            .min()
            .unwrap_or(usize::MAX);
        return if best_lev <= 1 { base * 0.7 } else if best_lev == 2 { base * 0.85 } else { base };
    }
    base
}

/// §4.5 step 4: field-weighted re-score, returning the `scaled * k` boost to apply
/// multiplicatively to the penalty-adjusted score.
fn field_boost(
    content: &BTreeMap<String, Json>,
    original_tokens: &[String],
    field_weights: &BTreeMap<String, f64>,
    primary_fields: &[String],
    primary_field_limit: usize,
) -> f64 {
    if field_weights.is_empty() || original_tokens.is_empty() {
        return 0.0;
    }
    let mut best_weighted = 0.0_f64;
    let mut best_k = 0.0_f64;

    for (field, weight) in field_weights {
        let Some(text) = content.get(field).and_then(field_text) else { continue };
        let (mut raw, k) = field_match_tier(&text, original_tokens);
        let is_primary = primary_fields.iter().any(|p| p == field) || *weight >= primary_field_limit as f64;
        if is_primary {
            raw *= 2.0;
        }
        let weighted = raw * weight;
        if weighted > best_weighted {
            best_weighted = weighted;
            best_k = k;
        }
    }

    if best_weighted <= 0.0 {
        return 0.0;
    }
    let scaled = (best_weighted / 10.0).powf(1.5);
    scaled * best_k
}

fn field_text(value: &Json) -> Option<String> {
    match value {
        Json::String(s) => Some(s.clone()),
        Json::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `(raw_score, k)` for one field against the query tokens: exact full field (100,
/// 10), exact phrase (50 + proximity, 10), all terms present (20 + proximity, 5),
/// partial terms (scaled, 2), no match (0, 0).
fn field_match_tier(text: &str, tokens: &[String]) -> (f64, f64) {
    let lower = text.to_lowercase();
    let phrase = tokens.join(" ").to_lowercase();
    let words: Vec<&str> = lower.split_whitespace().collect();

    if !phrase.is_empty() && lower.trim() == phrase.trim() {
        return (100.0, 10.0);
    }
    if lower.contains(&phrase) {
        return (50.0 + proximity_bonus(&words, tokens), 10.0);
    }
    if tokens.iter().all(|t| lower.contains(&t.to_lowercase())) {
        return (20.0 + proximity_bonus(&words, tokens), 5.0);
    }
    let matched = tokens.iter().filter(|t| lower.contains(&t.to_lowercase())).count();
    if matched > 0 {
        return (5.0 * (matched as f64 / tokens.len() as f64), 2.0);
    }
    (0.0, 0.0)
}

/// Up to 20 bonus points for matches occurring early in the field.
fn proximity_bonus(words: &[&str], tokens: &[String]) -> f64 {
    let earliest = words
        .iter()
        .position(|w| tokens.iter().any(|t| w.contains(t.to_lowercase().as_str())));
    match earliest {
        Some(idx) => {
            let ratio = idx as f64 / words.len().saturating_sub(1).max(1) as f64;
            (20.0 * (1.0 - ratio)).max(0.0)
        }
        None => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(rank: Option<f64>, content: &str) -> RawRow {
        RawRow {
            id: "a".to_string(),
            content: BTreeMap::from([("content".to_string(), json!(content))]),
            metadata: json!({}),
            language: None,
            doc_type: "default".to_string(),
            timestamp: 0,
            rank,
            distance: None,
            centroid: None,
        }
    }

    #[test]
    fn min_score_drops_low_rank_rows() {
        let mut config = SearchConfig::default();
        config.min_score = 5.0;
        let processor = ResultProcessor::new(&config);
        let rows = vec![row(Some(-1.0), "x"), row(Some(-10.0), "y")];
        let planned = PlannedQuery { limit: 20, ..Default::default() };
        let out = processor.process(rows, &planned);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn top_raw_score_normalizes_to_one_hundred() {
        let config = SearchConfig::default();
        let processor = ResultProcessor::new(&config);
        let rows = vec![row(Some(-10.0), "rocket propulsion"), row(Some(-2.0), "other text")];
        let mut planned = PlannedQuery { limit: 20, ..Default::default() };
        planned.original_tokens = vec!["rocket".to_string()];
        let out = processor.process(rows, &planned);
        let top = out.iter().find(|i| i.id == "a").unwrap();
        assert!(top.score > 0.0);
    }

    #[test]
    fn exact_full_phrase_gets_lightest_penalty() {
        let config = SearchConfig::default();
        let body = "rocket propulsion systems";
        let penalty = fuzzy_penalty(&["rocket".to_string(), "propulsion".to_string()], &[], body, config.fuzzy_score_penalty);
        assert_eq!(penalty, 0.05);
    }

    #[test]
    fn only_fuzzy_token_present_scales_by_similarity() {
        let config = SearchConfig::default();
        let penalty = fuzzy_penalty(&["fone".to_string()], &["phone".to_string()], "a phone rings", config.fuzzy_score_penalty);
        assert!(penalty > 0.0 && penalty <= config.fuzzy_score_penalty);
    }

    #[test]
    fn highlight_attaches_snippet_for_matched_field() {
        let mut config = SearchConfig::default();
        config.enable_highlighting = true;
        let processor = ResultProcessor::new(&config);
        let mut items = vec![SearchResultItem {
            id: "a".to_string(),
            score: 10.0,
            content: BTreeMap::from([("content".to_string(), json!("the rocket launched"))]),
            metadata: json!({}),
            distance: None,
            bearing: None,
            cardinal: None,
            highlights: BTreeMap::new(),
            route: None,
            chunk_count: None,
        }];
        let mut planned = PlannedQuery::default();
        planned.original_tokens = vec!["rocket".to_string()];
        processor.highlight(&mut items, &planned);
        assert!(items[0].highlights.get("content").unwrap()[0].contains("<mark>rocket</mark>"));
    }

    #[test]
    fn bearing_attached_when_origin_and_centroid_present() {
        let config = SearchConfig::default();
        let processor = ResultProcessor::new(&config);
        let mut r = row(None, "x");
        r.centroid = Some(GeoPoint { lat: 1.0, lng: 0.0 });
        let mut planned = PlannedQuery { limit: 20, ..Default::default() };
        planned.geo.near = Some(crate::types::NearFilter {
            point: GeoPoint { lat: 0.0, lng: 0.0 },
            radius: 1000.0,
            units: crate::types::Units::Meters,
        });
        let out = processor.process(vec![r], &planned);
        assert_eq!(out[0].bearing, Some(0.0));
        assert_eq!(out[0].cardinal.as_deref(), Some("N"));
    }

    #[test]
    fn reported_distance_honors_configured_units() {
        let mut config = SearchConfig::default();
        config.geo_units = crate::types::Units::Kilometers;
        let processor = ResultProcessor::new(&config);
        let mut r = row(None, "x");
        r.distance = Some(2500.0);
        let planned = PlannedQuery { limit: 20, ..Default::default() };
        let out = processor.process(vec![r], &planned);
        assert_eq!(out[0].distance, Some(2.5));
    }
}
