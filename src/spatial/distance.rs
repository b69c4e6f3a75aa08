//! Great-circle and planar distance, plus bearing/cardinal-direction helpers.

use crate::types::GeoPoint;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two points, in metres.
pub fn haversine_meters(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();

    let sin_dlat = (dlat / 2.0).sin();
    let sin_dlng = (dlng / 2.0).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlng * sin_dlng;
    let c = 2.0 * h.sqrt().asin();
    EARTH_RADIUS_M * c
}

/// Planar (equirectangular) approximation, scaled by `cos(lat)`, used when the
/// runtime has no trigonometric primitives available (§4.1 Fallback). Accurate for
/// short distances and small spans; degrades near the poles.
pub fn planar_meters(a: GeoPoint, b: GeoPoint) -> f64 {
    const METERS_PER_DEGREE_LAT: f64 = 111_320.0;
    let mean_lat = ((a.lat + b.lat) / 2.0).to_radians();
    let dx = (b.lng - a.lng) * METERS_PER_DEGREE_LAT * mean_lat.cos();
    let dy = (b.lat - a.lat) * METERS_PER_DEGREE_LAT;
    (dx * dx + dy * dy).sqrt()
}

/// Initial bearing from `from` to `to`, in degrees `[0, 360)`.
pub fn bearing_degrees(from: GeoPoint, to: GeoPoint) -> f64 {
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let dlng = (to.lng - from.lng).to_radians();

    let y = dlng.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlng.cos();
    let theta = y.atan2(x).to_degrees();
    (theta + 360.0) % 360.0
}

const CARDINALS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];

/// Map a bearing in degrees to one of eight cardinal/intercardinal labels.
pub fn cardinal_direction(bearing: f64) -> &'static str {
    let idx = (((bearing % 360.0) + 360.0) % 360.0 / 45.0).round() as usize % 8;
    CARDINALS[idx]
}
