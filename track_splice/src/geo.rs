//! Coordinate values and the distance models used to compare them.

use serde::{Deserialize, Serialize};

/// Mean Earth radius used by the haversine model.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Meters per degree-equivalent unit for the flat-plane model.
pub const LINEAR_METERS_PER_DEGREE: f64 = 1000.0 * 10_000.0 / 90.0;

/// A latitude/longitude pair in degrees. Values are not range checked.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Great-circle distance to `other` in meters.
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        haversine_distance(*self, *other)
    }

    /// Whether this point's latitude lies within the latitude span of `a`..`b`
    /// or its longitude lies within their longitude span.
    ///
    /// This is a bounding hint, not an on-segment test: either axis matching
    /// is enough.
    pub fn is_between(&self, a: &GeoPoint, b: &GeoPoint) -> bool {
        within(self.lat, a.lat, b.lat) || within(self.lng, a.lng, b.lng)
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lng)
    }
}

fn within(value: f64, a: f64, b: f64) -> bool {
    value >= a.min(b) && value <= a.max(b)
}

pub fn haversine_distance(a: GeoPoint, b: GeoPoint) -> f64 {
    let to_rad = |deg: f64| deg.to_radians();
    let dlat = to_rad(b.lat - a.lat);
    let dlon = to_rad(b.lng - a.lng);
    let h = (dlat / 2.0).sin().powi(2)
        + to_rad(a.lat).cos() * to_rad(b.lat).cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_M * c
}

/// Euclidean distance in degree space, scaled to meters. Only meaningful for
/// comparison against [`haversine_distance`] over short spans.
pub fn linear_distance(a: GeoPoint, b: GeoPoint) -> f64 {
    let dlat = b.lat - a.lat;
    let dlng = b.lng - a.lng;
    (dlat * dlat + dlng * dlng).sqrt() * LINEAR_METERS_PER_DEGREE
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum DistanceModel {
    #[default]
    Haversine,
    Linear,
}

impl DistanceModel {
    pub fn distance(&self, a: GeoPoint, b: GeoPoint) -> f64 {
        match self {
            DistanceModel::Haversine => haversine_distance(a, b),
            DistanceModel::Linear => linear_distance(a, b),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DistanceModel::Haversine => "haversine",
            DistanceModel::Linear => "linear",
        }
    }
}
