//! Geospatial matching helpers
//!
//! Pure functions only: great-circle distance, radius filtering, a bounding
//! box used to prefilter candidates in the store, and a stable
//! nearest-first sort.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometres
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A WGS84 point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Whether the coordinates are finite and inside the valid ranges
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// Haversine distance between two points in kilometres
pub fn distance_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    // Clamp guards asin against h drifting past 1.0 for antipodal points
    let c = 2.0 * h.sqrt().min(1.0).asin();

    EARTH_RADIUS_KM * c
}

pub fn within_radius(center: GeoPoint, point: GeoPoint, radius_km: f64) -> bool {
    distance_km(center, point) <= radius_km
}

/// Axis-aligned box that fully contains the circle of `radius_km` around a
/// center. Used as a cheap SQL prefilter; callers still apply [`distance_km`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn around(center: GeoPoint, radius_km: f64) -> Self {
        let angular = radius_km / EARTH_RADIUS_KM;
        let d_lat = angular.to_degrees();
        let min_lat = (center.lat - d_lat).max(-90.0);
        let max_lat = (center.lat + d_lat).min(90.0);

        // Widest longitude extent of a spherical cap; degenerates near the poles
        let cos_lat = center.lat.to_radians().cos();
        let ratio = angular.sin() / cos_lat;
        let (min_lon, max_lon) = if max_lat >= 90.0 || min_lat <= -90.0 || ratio >= 1.0 {
            (-180.0, 180.0)
        } else {
            let d_lon = ratio.asin().to_degrees();
            (center.lon - d_lon, center.lon + d_lon)
        };

        Self {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        }
    }

    /// Whether the box crosses the antimeridian
    pub fn wraps(&self) -> bool {
        self.min_lon < -180.0 || self.max_lon > 180.0
    }

    pub fn contains(&self, point: GeoPoint) -> bool {
        if point.lat < self.min_lat || point.lat > self.max_lat {
            return false;
        }
        let in_span = |lon: f64| lon >= self.min_lon && lon <= self.max_lon;
        if self.wraps() {
            return in_span(point.lon) || in_span(point.lon + 360.0) || in_span(point.lon - 360.0);
        }
        in_span(point.lon)
    }
}

/// Keep the items within `radius_km` of `center`, paired with their distance
/// and sorted nearest first. Ties keep their input order.
pub fn nearest_within<T, F>(items: Vec<T>, center: GeoPoint, radius_km: f64, locate: F) -> Vec<(T, f64)>
where
    F: Fn(&T) -> GeoPoint,
{
    let mut matched: Vec<(T, f64)> = items
        .into_iter()
        .filter_map(|item| {
            let distance = distance_km(center, locate(&item));
            (distance <= radius_km).then_some((item, distance))
        })
        .collect();

    sort_by_distance(&mut matched);
    matched
}

/// Stable ascending sort on the distance component
pub fn sort_by_distance<T>(items: &mut [(T, f64)]) {
    items.sort_by(|a, b| a.1.total_cmp(&b.1));
}
