//! Translates a [`PlannedQuery`] into SQL against one index's table family
//! (§4.2 "Search (planned query)" and §4.2.1 "Spatial clause builder").

use rusqlite::types::Value;
use rusqlite::Connection;

use crate::error::{Error, Result};
use crate::spatial;
use crate::storage::schema::{fts_table, id_map_table};
use crate::types::{
    Filter, FilterValue, GeoFilters, IndexOptions, Operator, PlannedQuery, SchemaMode, SortDirection,
};

pub struct BuiltQuery {
    pub sql: String,
    pub params: Vec<Value>,
    /// When set, the SQL already applies `LIMIT <candidate_cap>` ordered by rank and
    /// the caller must re-sort the full candidate set by distance in memory before
    /// applying the real limit/offset (§4.2 step 4, "enlarged candidate set").
    pub resort_by_distance_in_memory: bool,
    pub resort_descending: bool,
}

fn op_sql(op: Operator) -> &'static str {
    match op {
        Operator::Eq => "=",
        Operator::Ne => "!=",
        Operator::Gt => ">",
        Operator::Lt => "<",
        Operator::Gte => ">=",
        Operator::Lte => "<=",
        Operator::In | Operator::Contains | Operator::Exists => unreachable!("handled separately"),
    }
}

fn scalar_value(v: &FilterValue) -> Value {
    match v {
        FilterValue::Text(s) => Value::Text(s.clone()),
        FilterValue::Number(n) => Value::Real(*n),
        FilterValue::Bool(b) => Value::Integer(if *b { 1 } else { 0 }),
        FilterValue::Null => Value::Null,
        FilterValue::List(_) => Value::Null,
    }
}

/// Render one structured filter as a `(sql_fragment, params)` pair.
fn render_filter(f: &Filter) -> Result<(String, Vec<Value>)> {
    let column_expr = if f.is_metadata() {
        let path = f.field.strip_prefix("metadata.").unwrap();
        format!("json_extract(d.metadata, '$.{path}')")
    } else {
        match f.field.as_str() {
            "id" | "type" | "language" | "timestamp" => format!("d.{}", f.field),
            other => return Err(Error::InvalidInput(format!("unknown filter field: {other}"))),
        }
    };

    match f.operator {
        Operator::Exists => {
            let is_false = matches!(f.value, FilterValue::Bool(false));
            let clause = if is_false {
                format!("{column_expr} IS NULL")
            } else {
                format!("{column_expr} IS NOT NULL")
            };
            Ok((clause, Vec::new()))
        }
        Operator::Contains => {
            let FilterValue::Text(s) = &f.value else {
                return Err(Error::InvalidInput("contains requires a text value".into()));
            };
            Ok((format!("{column_expr} LIKE ?"), vec![Value::Text(format!("%{s}%"))]))
        }
        Operator::In => {
            let FilterValue::List(items) = &f.value else {
                return Err(Error::InvalidInput("in requires a list value".into()));
            };
            if items.is_empty() {
                return Ok(("0".to_string(), Vec::new()));
            }
            let placeholders = vec!["?"; items.len()].join(", ");
            let params = items.iter().map(scalar_value).collect();
            Ok((format!("{column_expr} IN ({placeholders})"), params))
        }
        Operator::Gt | Operator::Lt | Operator::Gte | Operator::Lte if f.is_metadata() => {
            Ok((format!("CAST({column_expr} AS REAL) {} ?", op_sql(f.operator)), vec![scalar_value(&f.value)]))
        }
        op => Ok((format!("{column_expr} {} ?", op_sql(op)), vec![scalar_value(&f.value)])),
    }
}

struct SpatialClause {
    join: String,
    where_clauses: Vec<String>,
    params: Vec<Value>,
    distance_select: Option<String>,
    order_by_distance: bool,
    order_direction: &'static str,
}

fn spatial_join_key(index: &str, options: &IndexOptions) -> String {
    match options.schema_mode {
        SchemaMode::External => "d.doc_id".to_string(),
        SchemaMode::Legacy => {
            format!("(SELECT numeric_id FROM {} im WHERE im.string_id = d.id)", id_map_table(index))
        }
    }
}

fn build_spatial_clause(index: &str, options: &IndexOptions, geo: &GeoFilters) -> SpatialClause {
    let table = spatial::table_name(index);
    let join_key = spatial_join_key(index, options);
    let mut where_clauses = Vec::new();
    let mut params = Vec::new();
    let mut distance_select = None;
    let mut order_by_distance = false;
    let mut order_direction = "ASC";
    let needs_join = !geo.is_empty();

    let join = if !needs_join {
        String::new()
    } else {
        format!("LEFT JOIN {table} sp ON sp.id = {join_key}")
    };

    if let Some(near) = &geo.near {
        let radius_m = near.units.to_meters(near.radius);
        let bounds = spatial::bbox_from_radius(near.point, radius_m);
        let (predicate, bbox_params) = spatial::intersect_predicate("sp", bounds);
        where_clauses.push(predicate);
        params.extend(bbox_params.into_iter().map(Value::Real));

        distance_select = Some(distance_expr(near.point.lat, near.point.lng));
        where_clauses.push(format!("{} <= ?", distance_expr(near.point.lat, near.point.lng)));
        params.push(Value::Real(radius_m));
    }

    if let Some(within) = &geo.within {
        let (predicate, bbox_params) = spatial::intersect_predicate("sp", *within);
        where_clauses.push(predicate);
        params.extend(bbox_params.into_iter().map(Value::Real));
    }

    if let Some(sort) = &geo.distance_sort {
        if distance_select.is_none() {
            distance_select = Some(distance_expr(sort.from.lat, sort.from.lng));
        }
        order_by_distance = true;
        order_direction = match sort.direction {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        };
    }

    if let Some(nearest) = geo.nearest {
        if distance_select.is_none() {
            // `nearest` with no explicit `near`/`distance_sort` still needs an origin;
            // callers are expected to pair it with one. Fall back to (0,0) rather than
            // failing the query outright.
            distance_select = Some(distance_expr(0.0, 0.0));
        }
        order_by_distance = true;
        let _ = nearest; // limit applied by the caller
    }

    if let Some(max_distance) = geo.max_distance {
        let expr = distance_select.clone().unwrap_or_else(|| distance_expr(0.0, 0.0));
        where_clauses.push(format!("{expr} <= ?"));
        params.push(Value::Real(geo.units.to_meters(max_distance)));
    }

    SpatialClause {
        join,
        where_clauses,
        params,
        distance_select,
        order_by_distance,
        order_direction,
    }
}

fn distance_expr(lat: f64, lng: f64) -> String {
    format!("haversine_distance({lat}, {lng}, (sp.min_lat + sp.max_lat) / 2.0, (sp.min_lng + sp.max_lng) / 2.0)")
}

/// `(join_condition, fts_table_name)` for correlating the FTS virtual table back to
/// `d`: external-content tables alias SQLite's `rowid` to `doc_id`; legacy tables
/// carry the string id as an explicit UNINDEXED column.
fn fts_join_condition(index: &str, options: &IndexOptions) -> (String, String) {
    let fts = fts_table(index);
    match options.schema_mode {
        SchemaMode::External => (format!("{fts}.rowid = d.doc_id"), fts),
        SchemaMode::Legacy => (format!("{fts}.string_id = d.id"), fts),
    }
}

fn bm25_weights_sql(options: &IndexOptions, field_weights: &std::collections::BTreeMap<String, f64>) -> String {
    if !options.multi_column || options.fts_columns.len() <= 1 {
        return String::new();
    }
    let weights: Vec<String> = options
        .fts_columns
        .iter()
        .map(|c| field_weights.get(c).copied().unwrap_or(1.0).to_string())
        .collect();
    format!(", {}", weights.join(", "))
}

/// Build the SELECT for `storage.search`.
pub fn build_search(_conn: &Connection, index: &str, options: &IndexOptions, planned: &PlannedQuery) -> Result<BuiltQuery> {
    let spatial = build_spatial_clause(index, options, &planned.geo);
    let mut select_cols = vec![
        "d.id".to_string(),
        "d.content".to_string(),
        "d.metadata".to_string(),
        "d.language".to_string(),
        "d.type".to_string(),
        "d.timestamp".to_string(),
    ];
    let mut joins = Vec::new();
    let mut where_clauses = Vec::new();
    let mut params: Vec<Value> = Vec::new();

    let k_nn_fast_path = planned.geo.nearest.is_some() && planned.match_expr.is_none();

    if let Some(expr) = &planned.match_expr {
        let (join_condition, fts) = fts_join_condition(index, options);
        joins.push(format!("JOIN {fts} ON {join_condition}"));
        let weights = bm25_weights_sql(options, &planned.field_weights);
        select_cols.push(format!("bm25({fts}{weights}) AS rank"));
        where_clauses.push(format!("{fts} MATCH ?"));
        params.push(Value::Text(expr.clone()));
    } else {
        select_cols.push("NULL AS rank".to_string());
    }

    if !spatial.join.is_empty() {
        joins.push(spatial.join.clone());
    }
    match &spatial.distance_select {
        Some(expr) => select_cols.push(format!("{expr} AS distance")),
        None => select_cols.push("NULL AS distance".to_string()),
    }
    if spatial.join.is_empty() {
        select_cols.push("NULL AS centroid_lat".to_string());
        select_cols.push("NULL AS centroid_lng".to_string());
    } else {
        select_cols.push("(sp.min_lat + sp.max_lat) / 2.0 AS centroid_lat".to_string());
        select_cols.push("(sp.min_lng + sp.max_lng) / 2.0 AS centroid_lng".to_string());
    }
    where_clauses.extend(spatial.where_clauses.clone());
    params.extend(spatial.params.clone());

    if let Some(lang) = &planned.language {
        where_clauses.push("d.language = ?".to_string());
        params.push(Value::Text(lang.clone()));
    }

    for f in &planned.filters {
        let (clause, f_params) = render_filter(f)?;
        where_clauses.push(clause);
        params.extend(f_params);
    }

    let where_sql = if where_clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", where_clauses.join(" AND "))
    };

    let two_pass = planned.two_pass_search && spatial.order_by_distance && planned.match_expr.is_some() && !k_nn_fast_path;

    let order_by = if k_nn_fast_path || (spatial.order_by_distance && !two_pass) {
        format!("ORDER BY distance {}", spatial.order_direction)
    } else if planned.match_expr.is_some() {
        "ORDER BY rank ASC".to_string()
    } else if !planned.sort.is_empty() {
        let parts: Vec<String> = planned
            .sort
            .iter()
            .map(|s| {
                let expr = if s.field.starts_with("metadata.") {
                    format!("json_extract(d.metadata, '$.{}')", s.field.strip_prefix("metadata.").unwrap())
                } else {
                    format!("d.{}", s.field)
                };
                let dir = match s.direction {
                    SortDirection::Asc => "ASC",
                    SortDirection::Desc => "DESC",
                };
                format!("{expr} {dir}")
            })
            .collect();
        format!("ORDER BY {}", parts.join(", "))
    } else {
        "ORDER BY d.timestamp DESC".to_string()
    };

    let (limit, offset) = if two_pass {
        let cap = planned.geo.candidate_cap.unwrap_or_else(|| (planned.limit * 20).max(200).min(1000));
        (cap, 0)
    } else if let Some(k) = planned.geo.nearest {
        (k, 0)
    } else {
        (planned.limit, planned.offset)
    };

    let sql = format!(
        "SELECT {cols} FROM {index} d {joins} {where_sql} {order_by} LIMIT {limit} OFFSET {offset}",
        cols = select_cols.join(", "),
        joins = joins.join(" "),
    );

    Ok(BuiltQuery {
        sql,
        params,
        resort_by_distance_in_memory: two_pass,
        resort_descending: spatial.order_direction == "DESC",
    })
}

/// Build the `SELECT COUNT(*)` mirror of `build_search` (§4.2 "Count").
pub fn build_count(conn: &Connection, index: &str, options: &IndexOptions, planned: &PlannedQuery) -> Result<BuiltQuery> {
    let mut inner = build_search(conn, index, options, planned)?;
    // Count ignores ordering/pagination entirely; wrap the filtered row set.
    let from_order = inner.sql.find(" ORDER BY").unwrap_or(inner.sql.len());
    let filtered = inner.sql[..from_order].to_string();
    inner.sql = format!("SELECT COUNT(*) FROM ({filtered})");
    inner.resort_by_distance_in_memory = false;
    Ok(inner)
}
