//! Geodesy helpers
//!
//! Plain spherical-earth math; the pipeline works at walking-distance scale where
//! the spherical approximation error is far below source accuracy.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Mean earth radius in kilometres (IUGG)
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Golden angle in degrees, used to spread offsets without collisions
const GOLDEN_ANGLE_DEG: f64 = 137.507_764;

/// Validated latitude/longitude pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    /// Create a point, rejecting NaN and out-of-range values
    pub fn new(lat: f64, lng: f64) -> Result<Self> {
        if is_valid_coordinate(lat, lng) {
            Ok(Self { lat, lng })
        } else {
            Err(Error::InvalidCoordinate { lat, lng })
        }
    }

    /// Great-circle distance to `other` in kilometres
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        haversine_km(self.lat, self.lng, other.lat, other.lng)
    }

    /// Point `distance_m` metres away along `bearing_deg` (0 = north, clockwise)
    pub fn offset(&self, distance_m: f64, bearing_deg: f64) -> GeoPoint {
        let bearing = bearing_deg.to_radians();
        let d_lat_m = distance_m * bearing.cos();
        let d_lng_m = distance_m * bearing.sin();

        let lat = self.lat + (d_lat_m / 1000.0 / EARTH_RADIUS_KM).to_degrees();
        let cos_lat = self.lat.to_radians().cos().max(1e-6);
        let lng = self.lng + (d_lng_m / 1000.0 / (EARTH_RADIUS_KM * cos_lat)).to_degrees();

        GeoPoint {
            lat: lat.clamp(-90.0, 90.0),
            lng: wrap_longitude(lng),
        }
    }

    /// Deterministic small offset for the `index`-th point sharing this anchor
    ///
    /// Index 0 is the anchor itself. Later indices follow a sunflower spiral
    /// (`step_m * sqrt(index)` at golden-angle bearings) so no two indices coincide.
    pub fn spiral_offset(&self, index: usize, step_m: f64) -> GeoPoint {
        if index == 0 {
            return *self;
        }
        let distance = step_m * (index as f64).sqrt();
        let bearing = (index as f64 * GOLDEN_ANGLE_DEG) % 360.0;
        self.offset(distance, bearing)
    }
}

/// True when `lat`/`lng` are finite and within -90..=90 / -180..=180
pub fn is_valid_coordinate(lat: f64, lng: f64) -> bool {
    lat.is_finite()
        && lng.is_finite()
        && (-90.0..=90.0).contains(&lat)
        && (-180.0..=180.0).contains(&lng)
}

/// Haversine great-circle distance in kilometres
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lng2 - lng1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
}

fn wrap_longitude(lng: f64) -> f64 {
    let mut wrapped = (lng + 180.0) % 360.0;
    if wrapped < 0.0 {
        wrapped += 360.0;
    }
    wrapped - 180.0
}

/// Axis-aligned latitude/longitude box (no antimeridian crossing)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    pub const fn new(min_lat: f64, max_lat: f64, min_lng: f64, max_lng: f64) -> Self {
        Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        }
    }

    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat) && (self.min_lng..=self.max_lng).contains(&lng)
    }

    pub fn center(&self) -> GeoPoint {
        GeoPoint {
            lat: (self.min_lat + self.max_lat) / 2.0,
            lng: (self.min_lng + self.max_lng) / 2.0,
        }
    }
}
