//! C1 — Spatial Index: bounding-box R-tree (or table fallback) and distance math.
//!
//! SQLite's bundled build compiles in the `rtree` virtual table module, so the
//! common path creates one `<index>_spatial` R-tree per spatial-enabled index. The
//! fallback (module missing, or the host SQLite build was not compiled with RTREE)
//! keeps the identical row shape in an ordinary table and answers intersection with
//! inequality predicates instead of the R-tree's native search.

mod distance;

pub use distance::{bearing_degrees, cardinal_direction, haversine_meters, planar_meters};

use rusqlite::Connection;

use crate::types::{BBox, GeoBounds, GeoPoint};

/// Which backing store a given index's spatial table uses. Decided once, at index
/// creation, by probing whether `CREATE VIRTUAL TABLE ... USING rtree(...)` succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpatialCapability {
    Rtree,
    Fallback,
}

/// Detect whether the connection's SQLite build supports the `rtree` module by
/// attempting to create (and immediately drop) a throwaway virtual table. Never
/// surfaced as an error (§7 "Missing capability") — on failure we silently report
/// [`SpatialCapability::Fallback`].
pub fn detect_capability(conn: &Connection) -> SpatialCapability {
    let probe = "__yetisearch_rtree_probe";
    let created = conn
        .execute_batch(&format!(
            "CREATE VIRTUAL TABLE {probe} USING rtree(id, minX, maxX, minY, maxY);
             DROP TABLE {probe};"
        ))
        .is_ok();
    if created {
        SpatialCapability::Rtree
    } else {
        log::debug!("rtree module unavailable, falling back to table-based spatial index");
        SpatialCapability::Fallback
    }
}

/// Name of the spatial table for a given index.
pub fn table_name(index: &str) -> String {
    format!("{index}_spatial")
}

pub fn create_table_sql(index: &str, capability: SpatialCapability) -> String {
    let table = table_name(index);
    match capability {
        SpatialCapability::Rtree => format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS {table} USING rtree(
                id,
                min_lat, max_lat,
                min_lng, max_lng
            )"
        ),
        SpatialCapability::Fallback => format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY,
                min_lat REAL NOT NULL,
                max_lat REAL NOT NULL,
                min_lng REAL NOT NULL,
                max_lng REAL NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_{table}_lat ON {table}(min_lat, max_lat);
            CREATE INDEX IF NOT EXISTS idx_{table}_lng ON {table}(min_lng, max_lng);"
        ),
    }
}

pub fn upsert(conn: &Connection, index: &str, numeric_id: i64, bbox: BBox) -> rusqlite::Result<()> {
    let table = table_name(index);
    conn.execute(
        &format!(
            "INSERT OR REPLACE INTO {table} (id, min_lat, max_lat, min_lng, max_lng)
             VALUES (?1, ?2, ?3, ?4, ?5)"
        ),
        rusqlite::params![numeric_id, bbox.min_lat, bbox.max_lat, bbox.min_lng, bbox.max_lng],
    )?;
    Ok(())
}

pub fn delete(conn: &Connection, index: &str, numeric_id: i64) -> rusqlite::Result<()> {
    let table = table_name(index);
    conn.execute(&format!("DELETE FROM {table} WHERE id = ?1"), [numeric_id])?;
    Ok(())
}

/// Split a bounding box that crosses the antimeridian (`west > east`) into the two
/// ranges `(west..+180]` and `[-180..east)`. Non-crossing boxes come back as a
/// single-element vector.
pub fn split_antimeridian(bounds: GeoBounds) -> Vec<BBox> {
    if !bounds.crosses_antimeridian() {
        return vec![BBox::from_bounds(bounds)];
    }
    vec![
        BBox {
            min_lat: bounds.south,
            max_lat: bounds.north,
            min_lng: bounds.west,
            max_lng: 180.0,
        },
        BBox {
            min_lat: bounds.south,
            max_lat: bounds.north,
            min_lng: -180.0,
            max_lng: bounds.east,
        },
    ]
}

/// A rough bounding box enclosing a circle of `radius_m` around `center`, used to
/// prefilter candidates before the exact Haversine `distance <= radius` predicate is
/// applied. One degree of latitude is ~111,320 m; longitude is scaled by `cos(lat)`.
pub fn bbox_from_radius(center: GeoPoint, radius_m: f64) -> GeoBounds {
    const METERS_PER_DEGREE_LAT: f64 = 111_320.0;
    let lat_delta = radius_m / METERS_PER_DEGREE_LAT;
    let lng_scale = (center.lat.to_radians().cos()).max(1e-6);
    let lng_delta = radius_m / (METERS_PER_DEGREE_LAT * lng_scale);

    let mut north = center.lat + lat_delta;
    let mut south = center.lat - lat_delta;
    north = north.min(90.0);
    south = south.max(-90.0);

    let mut east = center.lng + lng_delta;
    let mut west = center.lng - lng_delta;
    // wrap into [-180, 180]
    if east > 180.0 {
        east -= 360.0;
    }
    if west < -180.0 {
        west += 360.0;
    }

    GeoBounds { north, south, east, west }
}

/// Builds the `WHERE` fragment + bound params for an intersection predicate against
/// the spatial table's aliased columns, handling the antimeridian split as an OR of
/// ranges.
pub fn intersect_predicate(alias: &str, bounds: GeoBounds) -> (String, Vec<f64>) {
    let boxes = split_antimeridian(bounds);
    let mut clauses = Vec::new();
    let mut params = Vec::new();
    for b in boxes {
        clauses.push(format!(
            "({alias}.min_lat <= ? AND {alias}.max_lat >= ? AND {alias}.min_lng <= ? AND {alias}.max_lng >= ?)"
        ));
        params.extend([b.max_lat, b.min_lat, b.max_lng, b.min_lng]);
    }
    (format!("({})", clauses.join(" OR ")), params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn antimeridian_split_produces_two_boxes() {
        let bounds = GeoBounds {
            north: 10.0,
            south: -10.0,
            east: -170.0,
            west: 170.0,
        };
        let boxes = split_antimeridian(bounds);
        assert_eq!(boxes.len(), 2);
        assert!(boxes[0].max_lng <= 180.0);
        assert!(boxes[1].min_lng >= -180.0);
    }

    #[test]
    fn non_crossing_bounds_single_box() {
        let bounds = GeoBounds {
            north: 10.0,
            south: 0.0,
            east: 20.0,
            west: 10.0,
        };
        assert_eq!(split_antimeridian(bounds).len(), 1);
    }

    #[test]
    fn bbox_from_radius_contains_center() {
        let center = GeoPoint { lat: 40.0, lng: -73.0 };
        let bounds = bbox_from_radius(center, 5_000.0);
        assert!(bounds.north > center.lat);
        assert!(bounds.south < center.lat);
        assert!(bounds.east > center.lng);
        assert!(bounds.west < center.lng);
    }
}
