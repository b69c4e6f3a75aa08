//! Core data model: documents, indexes, queries and results.
//!
//! These types are storage-agnostic; [`crate::storage`] is the only module that knows
//! how to turn them into SQL.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// A geographic point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// An axis-aligned geographic bounding box. `west > east` denotes an antimeridian
/// crossing (§4.1 of the spec) and must be split before it is turned into predicates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl GeoBounds {
    pub fn crosses_antimeridian(&self) -> bool {
        self.west > self.east
    }

    pub fn centroid(&self) -> GeoPoint {
        GeoPoint {
            lat: (self.north + self.south) / 2.0,
            lng: (self.east + self.west) / 2.0,
        }
    }
}

/// A document submitted for indexing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    /// field -> string or nested mapping; modeled as JSON since both shapes need to
    /// survive a round trip through storage.
    pub content: BTreeMap<String, Json>,
    #[serde(default)]
    pub metadata: Json,
    pub language: Option<String>,
    #[serde(default = "default_doc_type")]
    pub doc_type: String,
    pub timestamp: i64,
    pub geo: Option<GeoPoint>,
    pub geo_bounds: Option<GeoBounds>,
}

fn default_doc_type() -> String {
    "default".to_string()
}

impl Document {
    pub fn new(id: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id: id.into(),
            content: BTreeMap::new(),
            metadata: Json::Object(Default::default()),
            language: None,
            doc_type: default_doc_type(),
            timestamp,
            geo: None,
            geo_bounds: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<Json>) -> Self {
        self.content.insert(field.into(), value.into());
        self
    }

    /// Flatten nested content mappings into a single string for single-column FTS
    /// indexing. Depth-first, field values joined by whitespace.
    pub fn concatenated_content(&self) -> String {
        let mut out = String::new();
        for value in self.content.values() {
            flatten_json_text(value, &mut out);
        }
        out
    }
}

fn flatten_json_text(value: &Json, out: &mut String) {
    match value {
        Json::String(s) => {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(s);
        }
        Json::Object(map) => {
            for v in map.values() {
                flatten_json_text(v, out);
            }
        }
        Json::Array(items) => {
            for v in items {
                flatten_json_text(v, out);
            }
        }
        Json::Number(n) => {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(&n.to_string());
        }
        _ => {}
    }
}

/// Schema mode for an index, fixed at creation time (§3 Index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemaMode {
    /// FTS table carries the string id as an UNINDEXED column.
    Legacy,
    /// FTS table is `content=docs, content_rowid=doc_id`.
    External,
}

/// SQLite FTS5 `detail` setting, controlling how much position/column
/// information the index keeps per token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FtsDetail {
    Full,
    Column,
    None,
}

impl FtsDetail {
    pub fn as_sql(&self) -> &'static str {
        match self {
            FtsDetail::Full => "full",
            FtsDetail::Column => "column",
            FtsDetail::None => "none",
        }
    }
}

/// Persistent per-index configuration (`docs_meta`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexOptions {
    pub schema_mode: SchemaMode,
    pub fts_columns: Vec<String>,
    pub multi_column: bool,
    pub prefix: Vec<u32>,
    pub spatial_enabled: bool,
    pub fts_detail: FtsDetail,
    /// Per-field default BM25/re-score weight from `indexer.fields.{name}.boost`,
    /// used when a query doesn't supply its own `field_weights` override.
    #[serde(default)]
    pub field_boosts: std::collections::BTreeMap<String, f64>,
    /// Fields with `indexer.fields.{name}.store == false`: still indexed and
    /// scored, but stripped from the content a result carries back to the caller.
    #[serde(default)]
    pub unstored_fields: std::collections::BTreeSet<String>,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            schema_mode: SchemaMode::External,
            fts_columns: vec!["content".to_string()],
            multi_column: false,
            prefix: Vec::new(),
            spatial_enabled: true,
            fts_detail: FtsDetail::Full,
            field_boosts: std::collections::BTreeMap::new(),
            unstored_fields: std::collections::BTreeSet::new(),
        }
    }
}

/// A filter operator (§6 planned-query payload).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
    In,
    Contains,
    Exists,
}

/// A scalar or array value carried by a [`Filter`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Text(String),
    Number(f64),
    Bool(bool),
    List(Vec<FilterValue>),
    Null,
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        FilterValue::Text(s.to_string())
    }
}
impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        FilterValue::Text(s)
    }
}
impl From<f64> for FilterValue {
    fn from(n: f64) -> Self {
        FilterValue::Number(n)
    }
}
impl From<i64> for FilterValue {
    fn from(n: i64) -> Self {
        FilterValue::Number(n as f64)
    }
}

/// A structured filter: a direct column (`type`, `language`, `id`, `timestamp`) or a
/// `metadata.<path>` JSON path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub operator: Operator,
    pub value: FilterValue,
}

impl Filter {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<FilterValue>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    /// `metadata.<path>` filters address JSON-extracted fields; direct columns are
    /// `id`, `type`, `language`, `timestamp`.
    pub fn is_metadata(&self) -> bool {
        self.field.starts_with("metadata.")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortField {
    pub field: String,
    pub direction: SortDirection,
}

/// Distance units accepted on geo filters (§6 `units`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Units {
    #[default]
    Meters,
    Kilometers,
    Miles,
}

impl Units {
    pub fn to_meters(&self, value: f64) -> f64 {
        match self {
            Units::Meters => value,
            Units::Kilometers => value * 1000.0,
            Units::Miles => value * 1609.344,
        }
    }

    pub fn from_meters(&self, meters: f64) -> f64 {
        match self {
            Units::Meters => meters,
            Units::Kilometers => meters / 1000.0,
            Units::Miles => meters / 1609.344,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NearFilter {
    pub point: GeoPoint,
    pub radius: f64,
    #[serde(default)]
    pub units: Units,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistanceSort {
    pub from: GeoPoint,
    pub direction: SortDirection,
}

/// The `geoFilters` block of the planned-query payload (§6, §4.2.1).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeoFilters {
    pub near: Option<NearFilter>,
    pub within: Option<GeoBounds>,
    pub distance_sort: Option<DistanceSort>,
    pub nearest: Option<usize>,
    pub max_distance: Option<f64>,
    #[serde(default)]
    pub units: Units,
    pub candidate_cap: Option<usize>,
}

impl GeoFilters {
    pub fn is_empty(&self) -> bool {
        self.near.is_none()
            && self.within.is_none()
            && self.distance_sort.is_none()
            && self.nearest.is_none()
            && self.max_distance.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FuzzyCorrectionMode {
    /// Each token is replaced by its single best correction (default).
    Correction,
    /// Each token keeps its original form plus up to N fuzzy variations.
    Expansion,
}

/// A facet request: either a term histogram over a field, or the reserved
/// `distance` facet binned by caller-supplied thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacetRequest {
    pub field: String,
    #[serde(default)]
    pub min_count: u64,
    pub distance_thresholds: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacetBucket {
    pub value: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacetResult {
    pub field: String,
    pub buckets: Vec<FacetBucket>,
}

/// A caller-supplied structured search request (the input to
/// [`crate::engine::SearchEngine::search`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub index: String,
    pub text: Option<String>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub sort: Vec<SortField>,
    pub language: Option<String>,
    #[serde(default)]
    pub field_weights: BTreeMap<String, f64>,
    pub fields: Option<Vec<String>>,
    #[serde(default)]
    pub geo: GeoFilters,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub bypass_cache: bool,
    #[serde(default)]
    pub unique_by_route: bool,
    #[serde(default)]
    pub facets: Vec<FacetRequest>,
    #[serde(default)]
    pub distance_weight: Option<f64>,
}

fn default_limit() -> usize {
    20
}

impl SearchQuery {
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            text: None,
            filters: Vec::new(),
            sort: Vec::new(),
            language: None,
            field_weights: BTreeMap::new(),
            fields: None,
            geo: GeoFilters::default(),
            limit: default_limit(),
            offset: 0,
            bypass_cache: false,
            unique_by_route: false,
            facets: Vec::new(),
            distance_weight: None,
        }
    }
}

/// The C4 -> C2 planned-query payload (§6).
#[derive(Debug, Clone, Default)]
pub struct PlannedQuery {
    pub match_expr: Option<String>,
    pub filters: Vec<Filter>,
    pub sort: Vec<SortField>,
    pub language: Option<String>,
    pub field_weights: BTreeMap<String, f64>,
    pub fields: Option<Vec<String>>,
    pub geo: GeoFilters,
    pub limit: usize,
    pub offset: usize,
    pub bypass_cache: bool,
    /// original (uncorrected) query tokens, carried through for the fuzzy penalty
    /// and highlighting stages in C5.
    pub original_tokens: Vec<String>,
    /// tokens that only exist because of fuzzy correction/expansion.
    pub fuzzy_tokens: Vec<String>,
    /// `search.two_pass_search`: whether a combined text+distance-sort query may
    /// widen its SQL candidate set and re-sort by distance in memory (§4.2). When
    /// `false`, such a query falls back to the single-pass distance ordering.
    pub two_pass_search: bool,
}

/// A single raw row returned by [`crate::storage::Storage::search`], before C5
/// re-scoring.
#[derive(Debug, Clone)]
pub struct RawRow {
    pub id: String,
    pub content: BTreeMap<String, Json>,
    pub metadata: Json,
    pub language: Option<String>,
    pub doc_type: String,
    pub timestamp: i64,
    pub rank: Option<f64>,
    pub distance: Option<f64>,
    /// Centroid of the document's spatial row, when a spatial join was made, used by
    /// C5 to attach a bearing/cardinal-direction to results (§4.5 step 6).
    pub centroid: Option<GeoPoint>,
}

impl RawRow {
    /// Flattened searchable text, mirroring [`Document::concatenated_content`], used
    /// by C5's fuzzy-penalty and highlighting passes which only see raw storage rows.
    pub fn concatenated_content(&self) -> String {
        let mut out = String::new();
        for value in self.content.values() {
            flatten_json_text(value, &mut out);
        }
        out
    }
}

/// One scored, enriched result item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResultItem {
    pub id: String,
    pub score: f64,
    pub content: BTreeMap<String, Json>,
    pub metadata: Json,
    pub distance: Option<f64>,
    pub bearing: Option<f64>,
    pub cardinal: Option<String>,
    #[serde(default)]
    pub highlights: BTreeMap<String, Vec<String>>,
    pub route: Option<String>,
    pub chunk_count: Option<usize>,
}

/// The final packaged result of a search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResults {
    pub items: Vec<SearchResultItem>,
    pub total: Option<usize>,
    #[serde(default)]
    pub facets: Vec<FacetResult>,
    pub suggestion: Option<String>,
}

/// A ranked spelling suggestion (§6 `generateSuggestions`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub text: String,
    pub confidence: f64,
    pub correction_type: String,
}

/// Bounding-box shape used by the spatial index (C1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BBox {
    pub fn from_point(p: GeoPoint) -> Self {
        Self {
            min_lat: p.lat,
            max_lat: p.lat,
            min_lng: p.lng,
            max_lng: p.lng,
        }
    }

    pub fn from_bounds(b: GeoBounds) -> Self {
        Self {
            min_lat: b.south,
            max_lat: b.north,
            min_lng: b.west,
            max_lng: b.east,
        }
    }

    pub fn centroid(&self) -> GeoPoint {
        GeoPoint {
            lat: (self.min_lat + self.max_lat) / 2.0,
            lng: (self.min_lng + self.max_lng) / 2.0,
        }
    }

    pub fn intersects(&self, other: &BBox) -> bool {
        self.min_lat <= other.max_lat
            && self.max_lat >= other.min_lat
            && self.min_lng <= other.max_lng
            && self.max_lng >= other.min_lng
    }
}
