//! C2 — Storage Engine: schema management, document upsert/delete, and planned-query
//! execution against one SQLite database file (§4.2).

mod builder;
mod schema;

pub use schema::validate_index_name;

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;
use serde_json::Value as Json;

use crate::config::StorageConfig;
use crate::error::{Error, Result};
use crate::spatial;
use crate::types::{BBox, Document, IndexOptions, PlannedQuery, RawRow, SchemaMode};

/// Document-count and on-disk size for one index (`getIndexStats`, §6).
#[derive(Debug, Clone)]
pub struct IndexStats {
    pub document_count: usize,
    pub index_size_bytes: u64,
}

pub struct Storage {
    conn: Arc<Mutex<Connection>>,
}

impl Storage {
    /// Open (creating if absent) the database file named by `config.path`, enable
    /// WAL with `synchronous=OFF` for bulk-write throughput, run `PRAGMA optimize`,
    /// and register the distance scalar functions the spatial clause builder emits
    /// into SQL (§4.1, §5 "Shared-resource policy").
    pub fn connect(config: &StorageConfig) -> Result<Self> {
        let conn = Connection::open(&config.path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = OFF;")?;
        if config.exclusive_lock {
            conn.execute_batch("PRAGMA locking_mode = EXCLUSIVE;")?;
        }
        conn.set_prepared_statement_cache_capacity(50);
        register_distance_functions(&conn)?;
        conn.execute_batch("PRAGMA optimize;")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.set_prepared_statement_cache_capacity(50);
        register_distance_functions(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn create_index(&self, name: &str, options: &IndexOptions) -> Result<()> {
        let conn = self.conn.lock();
        schema::create_index(&conn, name, options)
    }

    pub fn drop_index(&self, name: &str) -> Result<()> {
        let conn = self.conn.lock();
        schema::drop_index(&conn, name)
    }

    pub fn index_exists(&self, name: &str) -> Result<bool> {
        let conn = self.conn.lock();
        schema::index_exists(&conn, name)
    }

    pub fn list_indices(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        schema::list_registered(&conn)
    }

    pub fn insert(&self, index: &str, doc: &Document) -> Result<()> {
        self.insert_batch(index, std::slice::from_ref(doc))
    }

    /// Upsert a batch of documents inside one transaction spanning the docs table,
    /// the FTS mirror, and the spatial row (§3 invariants, §5 "Ordering guarantees").
    pub fn insert_batch(&self, index: &str, docs: &[Document]) -> Result<()> {
        let mut conn = self.conn.lock();
        let options = schema::load_options(&conn, index)?;
        let tx = conn.transaction()?;
        for doc in docs {
            upsert_one(&tx, index, &options, doc)?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn update(&self, index: &str, doc: &Document) -> Result<()> {
        self.insert(index, doc)
    }

    pub fn delete(&self, index: &str, id: &str) -> Result<()> {
        let mut conn = self.conn.lock();
        let options = schema::load_options(&conn, index)?;
        let tx = conn.transaction()?;
        delete_one(&tx, index, &options, id)?;
        tx.commit()?;
        Ok(())
    }

    /// Persisted options for an index (schema mode, FTS columns, spatial flag), read
    /// once per search by the query planner to decide how to build the MATCH
    /// expression and join.
    pub fn load_index_options(&self, index: &str) -> Result<IndexOptions> {
        schema::validate_index_name(index)?;
        let conn = self.conn.lock();
        schema::load_options(&conn, index)
    }

    pub fn get_document(&self, index: &str, id: &str) -> Result<Option<Document>> {
        schema::validate_index_name(index)?;
        let conn = self.conn.lock();
        let row = conn.query_row(
            &format!("SELECT id, content, metadata, language, type, timestamp FROM {index} WHERE id = ?1"),
            [id],
            row_to_document,
        );
        match row {
            Ok(doc) => Ok(Some(doc)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Error::Storage(e)),
        }
    }

    pub fn search(&self, index: &str, planned: &PlannedQuery) -> Result<Vec<RawRow>> {
        schema::validate_index_name(index)?;
        let conn = self.conn.lock();
        let options = schema::load_options(&conn, index)?;
        let built = builder::build_search(&conn, index, &options, planned)?;
        let mut stmt = conn.prepare_cached(&built.sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(built.params.iter()), row_to_raw_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        if built.resort_by_distance_in_memory {
            let mut rows = rows;
            rows.sort_by(|a, b| {
                let da = a.distance.unwrap_or(f64::INFINITY);
                let db = b.distance.unwrap_or(f64::INFINITY);
                let ord = da.partial_cmp(&db).unwrap();
                if built.resort_descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
            let start = planned.offset.min(rows.len());
            let end = (start + planned.limit).min(rows.len());
            Ok(rows[start..end].to_vec())
        } else {
            Ok(rows)
        }
    }

    pub fn search_multiple(&self, indices: &[String], planned: &PlannedQuery) -> Result<Vec<RawRow>> {
        let mut out = Vec::new();
        for index in indices {
            out.extend(self.search(index, planned)?);
        }
        Ok(out)
    }

    pub fn count(&self, index: &str, planned: &PlannedQuery) -> Result<usize> {
        schema::validate_index_name(index)?;
        let conn = self.conn.lock();
        let options = schema::load_options(&conn, index)?;
        let built = builder::build_count(&conn, index, &options, planned)?;
        let mut stmt = conn.prepare_cached(&built.sql)?;
        let count: i64 = stmt.query_row(rusqlite::params_from_iter(built.params.iter()), |r| r.get(0))?;
        Ok(count.max(0) as usize)
    }

    /// Vocabulary view for the fuzzy corrector (§4.3 Inputs): term -> document
    /// frequency, sourced from the FTS5 `fts5vocab` shadow table in `'row'` mode.
    pub fn get_indexed_terms(&self, index: &str, min_frequency: u64, limit: usize) -> Result<Vec<(String, u64)>> {
        schema::validate_index_name(index)?;
        let conn = self.conn.lock();
        let vocab = schema::vocab_table(index);
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT term, doc FROM {vocab} WHERE doc >= ?1 ORDER BY doc DESC LIMIT ?2"
        ))?;
        let rows = stmt
            .query_map(rusqlite::params![min_frequency as i64, limit as i64], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)? as u64))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_index_stats(&self, index: &str) -> Result<IndexStats> {
        schema::validate_index_name(index)?;
        let conn = self.conn.lock();
        let document_count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {index}"), [], |r| r.get(0))?;
        let page_count: i64 = conn.query_row("PRAGMA page_count", [], |r| r.get(0)).unwrap_or(0);
        let page_size: i64 = conn.query_row("PRAGMA page_size", [], |r| r.get(0)).unwrap_or(0);
        Ok(IndexStats {
            document_count: document_count.max(0) as usize,
            index_size_bytes: (page_count * page_size).max(0) as u64,
        })
    }

    /// Delete all documents from an index while keeping its schema and options.
    pub fn clear(&self, index: &str) -> Result<()> {
        let mut conn = self.conn.lock();
        let options = schema::load_options(&conn, index)?;
        let tx = conn.transaction()?;
        let ids: Vec<String> = {
            let mut stmt = tx.prepare(&format!("SELECT id FROM {index}"))?;
            stmt.query_map([], |r| r.get(0))?.collect::<std::result::Result<_, _>>()?
        };
        for id in ids {
            delete_one(&tx, index, &options, &id)?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn optimize(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch("PRAGMA optimize;")?;
        Ok(())
    }
}

fn upsert_one(conn: &Connection, index: &str, options: &IndexOptions, doc: &Document) -> Result<()> {
    let content_json = serde_json::to_string(&doc.content)?;
    let metadata_json = serde_json::to_string(&doc.metadata)?;
    let body = doc.concatenated_content();

    // Remove any prior row for this id first so the FTS/spatial mirrors and
    // generated doc_id stay consistent on update (simpler and just as correct as a
    // true in-place UPDATE, since every column is rewritten anyway).
    delete_one(conn, index, options, &doc.id)?;

    conn.execute(
        &format!(
            "INSERT INTO {index} (id, content, body, metadata, language, type, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
        ),
        rusqlite::params![doc.id, content_json, body, metadata_json, doc.language, doc.doc_type, doc.timestamp],
    )?;
    let doc_id = conn.last_insert_rowid();

    let fts = schema::fts_table(index);
    match options.schema_mode {
        SchemaMode::External => {
            conn.execute(
                &format!("INSERT INTO {fts} (rowid, body) VALUES (?1, ?2)"),
                rusqlite::params![doc_id, body],
            )?;
        }
        SchemaMode::Legacy => {
            if options.multi_column {
                let cols = &options.fts_columns;
                let values: Vec<String> = cols.iter().map(|c| field_text(&doc.content, c)).collect();
                let placeholders: Vec<String> = (0..=cols.len()).map(|i| format!("?{}", i + 1)).collect();
                let col_list = cols.join(", ");
                let sql = format!(
                    "INSERT INTO {fts} (string_id, {col_list}) VALUES ({})",
                    placeholders.join(", ")
                );
                let mut params: Vec<&dyn rusqlite::ToSql> = vec![&doc.id];
                let values_ref: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v as &dyn rusqlite::ToSql).collect();
                params.extend(values_ref);
                conn.execute(&sql, params.as_slice())?;
            } else {
                conn.execute(
                    &format!("INSERT INTO {fts} (string_id, body) VALUES (?1, ?2)"),
                    rusqlite::params![doc.id, body],
                )?;
            }
        }
    }

    if options.spatial_enabled {
        if let Some(bbox) = document_bbox(doc) {
            let numeric_id = match options.schema_mode {
                SchemaMode::External => doc_id,
                SchemaMode::Legacy => {
                    let numeric_id = schema::stable_numeric_id(&doc.id);
                    conn.execute(
                        &format!(
                            "INSERT OR REPLACE INTO {} (string_id, numeric_id) VALUES (?1, ?2)",
                            schema::id_map_table(index)
                        ),
                        rusqlite::params![doc.id, numeric_id],
                    )?;
                    numeric_id
                }
            };
            spatial::upsert(conn, index, numeric_id, bbox)?;
        }
    }

    Ok(())
}

fn delete_one(conn: &Connection, index: &str, options: &IndexOptions, id: &str) -> Result<()> {
    let existing_doc_id: Option<i64> = conn
        .query_row(&format!("SELECT doc_id FROM {index} WHERE id = ?1"), [id], |r| r.get(0))
        .ok();

    let Some(doc_id) = existing_doc_id else {
        return Ok(());
    };

    let fts = schema::fts_table(index);
    match options.schema_mode {
        SchemaMode::External => {
            conn.execute(&format!("DELETE FROM {fts} WHERE rowid = ?1"), [doc_id])?;
        }
        SchemaMode::Legacy => {
            conn.execute(&format!("DELETE FROM {fts} WHERE string_id = ?1"), [id])?;
        }
    }

    if options.spatial_enabled {
        let numeric_id = match options.schema_mode {
            SchemaMode::External => Some(doc_id),
            SchemaMode::Legacy => {
                let id_map = schema::id_map_table(index);
                let numeric_id: Option<i64> = conn
                    .query_row(&format!("SELECT numeric_id FROM {id_map} WHERE string_id = ?1"), [id], |r| r.get(0))
                    .ok();
                conn.execute(&format!("DELETE FROM {id_map} WHERE string_id = ?1"), [id])?;
                numeric_id
            }
        };
        if let Some(numeric_id) = numeric_id {
            spatial::delete(conn, index, numeric_id)?;
        }
    }

    conn.execute(&format!("DELETE FROM {index} WHERE id = ?1"), [id])?;
    Ok(())
}

fn field_text(content: &BTreeMap<String, Json>, field: &str) -> String {
    match content.get(field) {
        Some(Json::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn document_bbox(doc: &Document) -> Option<BBox> {
    if let Some(bounds) = doc.geo_bounds {
        Some(BBox::from_bounds(bounds))
    } else {
        doc.geo.map(BBox::from_point)
    }
}

fn row_to_document(row: &rusqlite::Row) -> rusqlite::Result<Document> {
    let content_json: String = row.get(1)?;
    let metadata_json: String = row.get(2)?;
    Ok(Document {
        id: row.get(0)?,
        content: serde_json::from_str(&content_json).unwrap_or_default(),
        metadata: serde_json::from_str(&metadata_json).unwrap_or(Json::Null),
        language: row.get(3)?,
        doc_type: row.get(4)?,
        timestamp: row.get(5)?,
        geo: None,
        geo_bounds: None,
    })
}

fn row_to_raw_row(row: &rusqlite::Row) -> rusqlite::Result<RawRow> {
    let content_json: String = row.get(1)?;
    let metadata_json: String = row.get(2)?;
    Ok(RawRow {
        id: row.get(0)?,
        content: serde_json::from_str(&content_json).unwrap_or_default(),
        metadata: serde_json::from_str(&metadata_json).unwrap_or(Json::Null),
        language: row.get(3)?,
        doc_type: row.get(4)?,
        timestamp: row.get(5)?,
        rank: row.get(6)?,
        distance: row.get(7)?,
        centroid: match (row.get::<_, Option<f64>>(8)?, row.get::<_, Option<f64>>(9)?) {
            (Some(lat), Some(lng)) => Some(crate::types::GeoPoint { lat, lng }),
            _ => None,
        },
    })
}

/// Register `haversine_distance`/`planar_distance` as SQL scalar functions so the
/// query builder can select a distance column directly (§4.1 DistanceExpr). Rust
/// always has trigonometric primitives, so unlike the reference system's "missing
/// math primitives" fallback, `planar_distance` here exists for API parity and for
/// direct callers, not because `haversine_distance` could fail to register.
fn register_distance_functions(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "haversine_distance",
        4,
        FunctionFlags::SQLITE_DETERMINISTIC | FunctionFlags::SQLITE_UTF8,
        |ctx| {
            let a = distance_point(ctx)?;
            let b = spatial::haversine_meters(a.0, a.1);
            Ok(b)
        },
    )?;
    conn.create_scalar_function(
        "planar_distance",
        4,
        FunctionFlags::SQLITE_DETERMINISTIC | FunctionFlags::SQLITE_UTF8,
        |ctx| {
            let a = distance_point(ctx)?;
            let b = spatial::planar_meters(a.0, a.1);
            Ok(b)
        },
    )?;
    Ok(())
}

type GeoPointPair = (crate::types::GeoPoint, crate::types::GeoPoint);

fn distance_point(ctx: &rusqlite::functions::Context) -> rusqlite::Result<GeoPointPair> {
    let lat1: f64 = ctx.get(0)?;
    let lng1: f64 = ctx.get(1)?;
    let lat2: f64 = ctx.get(2)?;
    let lng2: f64 = ctx.get(3)?;
    Ok((
        crate::types::GeoPoint { lat: lat1, lng: lng1 },
        crate::types::GeoPoint { lat: lat2, lng: lng2 },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Filter, FilterValue, GeoPoint, Operator, SearchQuery};
    use serde_json::json;

    fn sample_options() -> IndexOptions {
        IndexOptions::default()
    }

    #[test]
    fn insert_and_get_document_roundtrips() {
        let storage = Storage::open_in_memory().unwrap();
        storage.create_index("docs", &sample_options()).unwrap();
        let doc = Document::new("a", 1000).with_field("content", json!("hello world"));
        storage.insert("docs", &doc).unwrap();

        let fetched = storage.get_document("docs", "a").unwrap().unwrap();
        assert_eq!(fetched.id, "a");
        assert_eq!(storage.get_index_stats("docs").unwrap().document_count, 1);
    }

    #[test]
    fn delete_removes_document() {
        let storage = Storage::open_in_memory().unwrap();
        storage.create_index("docs", &sample_options()).unwrap();
        storage.insert("docs", &Document::new("a", 1000).with_field("content", json!("x"))).unwrap();
        storage.delete("docs", "a").unwrap();
        assert!(storage.get_document("docs", "a").unwrap().is_none());
        assert_eq!(storage.get_index_stats("docs").unwrap().document_count, 0);
    }

    #[test]
    fn search_matches_indexed_token() {
        let storage = Storage::open_in_memory().unwrap();
        storage.create_index("docs", &sample_options()).unwrap();
        storage
            .insert("docs", &Document::new("a", 1000).with_field("content", json!("rocket propulsion")))
            .unwrap();
        storage
            .insert("docs", &Document::new("b", 1000).with_field("content", json!("unrelated text")))
            .unwrap();

        let query = SearchQuery::new("docs");
        let planned = PlannedQuery {
            match_expr: Some("rocket".to_string()),
            limit: query.limit,
            ..Default::default()
        };
        let rows = storage.search("docs", &planned).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "a");
    }

    #[test]
    fn drop_index_removes_document_table() {
        let storage = Storage::open_in_memory().unwrap();
        storage.create_index("docs", &sample_options()).unwrap();
        storage.drop_index("docs").unwrap();
        assert!(!storage.index_exists("docs").unwrap());
        assert!(storage.get_document("docs", "a").is_err());
    }

    #[test]
    fn metadata_filter_matches_json_path() {
        let storage = Storage::open_in_memory().unwrap();
        storage.create_index("docs", &sample_options()).unwrap();
        let mut doc = Document::new("a", 1000).with_field("content", json!("x"));
        doc.metadata = json!({"route": "/a"});
        storage.insert("docs", &doc).unwrap();

        let planned = PlannedQuery {
            filters: vec![Filter::new("metadata.route", Operator::Eq, "/a")],
            limit: 20,
            ..Default::default()
        };
        let rows = storage.search("docs", &planned).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn near_filter_excludes_far_points() {
        let storage = Storage::open_in_memory().unwrap();
        storage.create_index("docs", &sample_options()).unwrap();
        let mut near = Document::new("near", 1000).with_field("content", json!("x"));
        near.geo = Some(GeoPoint { lat: 0.0, lng: 0.0 });
        let mut far = Document::new("far", 1000).with_field("content", json!("x"));
        far.geo = Some(GeoPoint { lat: 10.0, lng: 10.0 });
        storage.insert("docs", &near).unwrap();
        storage.insert("docs", &far).unwrap();

        let planned = PlannedQuery {
            geo: crate::types::GeoFilters {
                near: Some(crate::types::NearFilter {
                    point: GeoPoint { lat: 0.0, lng: 0.0 },
                    radius: 10_000.0,
                    units: crate::types::Units::Meters,
                }),
                ..Default::default()
            },
            limit: 20,
            ..Default::default()
        };
        let rows = storage.search("docs", &planned).unwrap();
        assert_eq!(rows.iter().map(|r| r.id.clone()).collect::<Vec<_>>(), vec!["near".to_string()]);
    }

    /// A text query combined with `distance_sort` only widens the SQL candidate set
    /// and re-sorts by distance in memory when `two_pass_search` is enabled.
    #[test]
    fn two_pass_search_flag_gates_distance_resort() {
        let storage = Storage::open_in_memory().unwrap();
        storage.create_index("docs", &sample_options()).unwrap();
        let mut near = Document::new("near", 1000).with_field("content", json!("widget"));
        near.geo = Some(GeoPoint { lat: 0.0, lng: 0.0 });
        let mut far = Document::new("far", 1000).with_field("content", json!("widget widget widget"));
        far.geo = Some(GeoPoint { lat: 1.0, lng: 0.0 });
        storage.insert("docs", &near).unwrap();
        storage.insert("docs", &far).unwrap();

        let distance_sort =
            crate::types::DistanceSort { from: GeoPoint { lat: 0.0, lng: 0.0 }, direction: crate::types::SortDirection::Asc };
        let base = PlannedQuery {
            match_expr: Some("widget".to_string()),
            geo: crate::types::GeoFilters { distance_sort: Some(distance_sort), ..Default::default() },
            limit: 20,
            ..Default::default()
        };

        let disabled = PlannedQuery { two_pass_search: false, ..base.clone() };
        let rows = storage.search("docs", &disabled).unwrap();
        assert_eq!(rows.iter().map(|r| r.id.clone()).collect::<Vec<_>>(), vec!["near".to_string(), "far".to_string()]);

        let enabled = PlannedQuery { two_pass_search: true, ..base };
        let rows = storage.search("docs", &enabled).unwrap();
        assert_eq!(rows.iter().map(|r| r.id.clone()).collect::<Vec<_>>(), vec!["near".to_string(), "far".to_string()]);
    }
}
