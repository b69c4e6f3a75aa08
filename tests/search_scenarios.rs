//! End-to-end scenarios exercising `SearchEngine` against an in-memory database.

use std::collections::BTreeMap;

use serde_json::json;
use yetisearch::{Document, FilterValue, GeoPoint, IndexerConfig, Operator, SearchConfig, SearchEngine, SearchQuery, StorageConfig};
use yetisearch::config::FieldConfig;
use yetisearch::types::{Filter, GeoFilters, NearFilter, Units};

fn memory_engine(search_config: SearchConfig) -> SearchEngine {
    let storage = StorageConfig { path: ":memory:".to_string(), ..Default::default() };
    SearchEngine::open(&storage, search_config).unwrap()
}

/// S1: a multi-column index ranks a match in a primary (title) field above the
/// same term only appearing in the body.
#[test]
fn multi_column_primary_field_ranks_first() {
    let engine = memory_engine(SearchConfig::default());
    let mut fields = BTreeMap::new();
    fields.insert("title".to_string(), FieldConfig::default());
    fields.insert("body".to_string(), FieldConfig::default());
    let indexer = IndexerConfig { fields, multi_column: true, ..Default::default() };
    engine.create_index("docs", &indexer).unwrap();

    let mut in_title = Document::new("in-title", 1000);
    in_title.content.insert("title".to_string(), json!("rocket propulsion systems"));
    in_title.content.insert("body".to_string(), json!("general overview of aerospace engineering"));

    let mut in_body = Document::new("in-body", 1000);
    in_body.content.insert("title".to_string(), json!("general overview"));
    in_body.content.insert("body".to_string(), json!("this article mentions rocket propulsion in passing"));

    engine.insert_batch("docs", &[in_title, in_body]).unwrap();

    let mut query = SearchQuery::new("docs");
    query.text = Some("rocket propulsion".to_string());
    query.field_weights.insert("title".to_string(), 2.0);
    query.field_weights.insert("body".to_string(), 1.0);

    let results = engine.search(&query).unwrap();
    assert_eq!(results.items.len(), 2);
    assert_eq!(results.items[0].id, "in-title");
}

/// S2: a single misspelled token is corrected against the indexed vocabulary.
#[test]
fn single_token_fuzzy_correction_finds_the_right_document() {
    let engine = memory_engine(SearchConfig::default());
    engine.create_index("docs", &IndexerConfig::default()).unwrap();
    for i in 0..6 {
        engine
            .insert(
                "docs",
                &Document::new(format!("phone-{i}"), 1000).with_field("content", json!("our phone support line is open")),
            )
            .unwrap();
    }

    let mut query = SearchQuery::new("docs");
    query.text = Some("fone".to_string());
    let results = engine.search(&query).unwrap();
    assert!(!results.items.is_empty(), "expected the quick-correction table to fix 'fone' -> 'phone'");
}

/// S3: a compound misspelling ("madmax") resolves to a two-word split when both
/// halves are well represented in the vocabulary.
#[test]
fn compound_term_splits_when_both_halves_are_frequent() {
    let engine = memory_engine(SearchConfig::default());
    engine.create_index("docs", &IndexerConfig::default()).unwrap();
    for i in 0..6 {
        engine
            .insert("docs", &Document::new(format!("d-{i}"), 1000).with_field("content", json!("mad max fury road")))
            .unwrap();
    }

    let mut query = SearchQuery::new("docs");
    query.text = Some("madmax".to_string());
    let results = engine.search(&query).unwrap();
    assert!(!results.items.is_empty(), "expected 'madmax' to split into 'mad max' and match");
}

/// S4: nearest-neighbour search without a text query returns points ordered by
/// distance from the origin.
#[test]
fn k_nearest_neighbor_orders_by_distance() {
    let engine = memory_engine(SearchConfig::default());
    engine.create_index("docs", &IndexerConfig::default()).unwrap();

    let mut near = Document::new("near", 1000).with_field("content", json!("closest"));
    near.geo = Some(GeoPoint { lat: 0.01, lng: 0.0 });
    let mut mid = Document::new("mid", 1000).with_field("content", json!("middle"));
    mid.geo = Some(GeoPoint { lat: 0.05, lng: 0.0 });
    let mut far = Document::new("far", 1000).with_field("content", json!("farthest"));
    far.geo = Some(GeoPoint { lat: 0.2, lng: 0.0 });
    engine.insert_batch("docs", &[far, near, mid]).unwrap();

    let mut query = SearchQuery::new("docs");
    query.geo = GeoFilters {
        nearest: Some(2),
        near: Some(NearFilter { point: GeoPoint { lat: 0.0, lng: 0.0 }, radius: 50_000.0, units: Units::Meters }),
        ..Default::default()
    };
    let results = engine.search(&query).unwrap();
    assert_eq!(results.items.iter().map(|i| i.id.clone()).collect::<Vec<_>>(), vec!["near".to_string(), "mid".to_string()]);
}

/// S5: chunks sharing a route are merged into one result with a summed score.
#[test]
fn unique_by_route_merges_chunk_scores() {
    let engine = memory_engine(SearchConfig::default());
    engine.create_index("docs", &IndexerConfig::default()).unwrap();

    let mut chunk_a = Document::new("chunk-a", 1000).with_field("content", json!("rocket engines part one"));
    chunk_a.metadata = json!({"route": "/guide/rockets"});
    let mut chunk_b = Document::new("chunk-b", 1000).with_field("content", json!("rocket engines part two"));
    chunk_b.metadata = json!({"route": "/guide/rockets"});
    engine.insert_batch("docs", &[chunk_a, chunk_b]).unwrap();

    let mut query = SearchQuery::new("docs");
    query.text = Some("rocket".to_string());
    query.unique_by_route = true;
    let results = engine.search(&query).unwrap();

    assert_eq!(results.items.len(), 1);
    assert_eq!(results.items[0].route.as_deref(), Some("/guide/rockets"));
    assert_eq!(results.items[0].chunk_count, Some(2));
}

/// S6: a document close to the search origin outranks a lexically-perfect match
/// that is far away, once distance blending is weighted in.
#[test]
fn distance_blending_favors_nearby_match_when_weighted() {
    let mut config = SearchConfig::default();
    config.distance_weight = 0.8;
    let engine = memory_engine(config);
    engine.create_index("docs", &IndexerConfig::default()).unwrap();

    let mut nearby = Document::new("nearby", 1000).with_field("content", json!("coffee shop"));
    nearby.geo = Some(GeoPoint { lat: 0.001, lng: 0.0 });
    let mut far = Document::new("far", 1000).with_field("content", json!("coffee shop coffee shop coffee"));
    far.geo = Some(GeoPoint { lat: 5.0, lng: 0.0 });
    engine.insert_batch("docs", &[far, nearby]).unwrap();

    let mut query = SearchQuery::new("docs");
    query.text = Some("coffee".to_string());
    query.geo = GeoFilters {
        near: Some(NearFilter { point: GeoPoint { lat: 0.0, lng: 0.0 }, radius: 1_000_000.0, units: Units::Meters }),
        ..Default::default()
    };
    let results = engine.search(&query).unwrap();
    assert_eq!(results.items[0].id, "nearby");
}

#[test]
fn metadata_numeric_filter_casts_for_comparison() {
    let engine = memory_engine(SearchConfig::default());
    engine.create_index("docs", &IndexerConfig::default()).unwrap();

    let mut cheap = Document::new("cheap", 1000).with_field("content", json!("widget"));
    cheap.metadata = json!({"price": 5});
    let mut pricey = Document::new("pricey", 1000).with_field("content", json!("widget"));
    pricey.metadata = json!({"price": 500});
    engine.insert_batch("docs", &[cheap, pricey]).unwrap();

    let mut query = SearchQuery::new("docs");
    query.filters.push(Filter::new("metadata.price", Operator::Lt, FilterValue::Number(100.0)));
    let results = engine.search(&query).unwrap();
    assert_eq!(results.items.iter().map(|i| i.id.clone()).collect::<Vec<_>>(), vec!["cheap".to_string()]);
}
