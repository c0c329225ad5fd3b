use crate::models::{BoundingBox, Coordinate};

/// Earth's radius in kilometers
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Earth's radius in miles
const EARTH_RADIUS_MI: f64 = 3959.0;

/// Unit for distance computations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceUnit {
    Kilometers,
    Miles,
}

/// Calculate the Haversine (great-circle) distance between two points
/// in kilometers
///
/// Symmetric and deterministic; zero iff both points are equal.
#[inline]
pub fn haversine_distance(a: Coordinate, b: Coordinate) -> f64 {
    haversine_distance_in(a, b, DistanceUnit::Kilometers)
}

/// Haversine distance in the requested unit
pub fn haversine_distance_in(a: Coordinate, b: Coordinate, unit: DistanceUnit) -> f64 {
    let lat1_rad = a.latitude.to_radians();
    let lat2_rad = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lon = (b.longitude - a.longitude).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    let radius = match unit {
        DistanceUnit::Kilometers => EARTH_RADIUS_KM,
        DistanceUnit::Miles => EARTH_RADIUS_MI,
    };

    radius * c
}

/// Calculate a bounding box around a center point
///
/// This is much faster than Haversine for pre-filtering candidate pools.
/// 1° latitude ≈ 111km, 1° longitude ≈ 111km * cos(latitude)
pub fn calculate_bounding_box(center: Coordinate, radius_km: f64) -> BoundingBox {
    // 1 degree latitude is approximately 111 km
    let lat_delta = radius_km / 111.0;

    // 1 degree longitude varies by latitude
    let lon_delta = radius_km / (111.0 * center.latitude.to_radians().cos().abs());

    BoundingBox {
        min_lat: center.latitude - lat_delta,
        max_lat: center.latitude + lat_delta,
        min_lon: center.longitude - lon_delta,
        max_lon: center.longitude + lon_delta,
    }
}

/// Check if a point is within a bounding box
#[inline]
pub fn is_within_bounding_box(point: Coordinate, bbox: &BoundingBox) -> bool {
    point.latitude >= bbox.min_lat
        && point.latitude <= bbox.max_lat
        && point.longitude >= bbox.min_lon
        && point.longitude <= bbox.max_lon
}

/// Check if a point lies within `radius_km` of a center (exact, not bbox)
#[inline]
pub fn is_within_radius(center: Coordinate, point: Coordinate, radius_km: f64) -> bool {
    haversine_distance(center, point) <= radius_km
}

/// Arithmetic centroid of a set of points, None for an empty set
pub fn centroid(points: &[Coordinate]) -> Option<Coordinate> {
    if points.is_empty() {
        return None;
    }

    let n = points.len() as f64;
    let lat_sum: f64 = points.iter().map(|p| p.latitude).sum();
    let lon_sum: f64 = points.iter().map(|p| p.longitude).sum();

    Some(Coordinate {
        latitude: lat_sum / n,
        longitude: lon_sum / n,
    })
}

/// Index and distance (km) of the candidate nearest to `from`
///
/// Ties resolve to the lowest index so the result is reproducible.
pub fn nearest_point(from: Coordinate, candidates: &[Coordinate]) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;

    for (idx, point) in candidates.iter().enumerate() {
        let d = haversine_distance(from, *point);
        match best {
            Some((_, best_d)) if d >= best_d => {}
            _ => best = Some((idx, d)),
        }
    }

    best
}
