//! Geodesic helpers shared by the planner, the supervisor and the simulator.
//!
//! All conversions use a spherical earth. Altitudes are relative to home and
//! pass through unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Equatorial radius used for north/east offsets, metres.
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    /// Metres above the home position.
    pub altitude_m: f64,
}

impl GeoPoint {
    pub const fn new(latitude_deg: f64, longitude_deg: f64, altitude_m: f64) -> Self {
        Self {
            latitude_deg,
            longitude_deg,
            altitude_m,
        }
    }

    pub fn with_altitude(self, altitude_m: f64) -> Self {
        Self { altitude_m, ..self }
    }

    pub fn is_finite(&self) -> bool {
        self.latitude_deg.is_finite() && self.longitude_deg.is_finite() && self.altitude_m.is_finite()
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:.7}, {:.7}, {:.1} m)",
            self.latitude_deg, self.longitude_deg, self.altitude_m
        )
    }
}

/// Moves `origin` by `north_m` / `east_m` metres. Altitude is kept.
pub fn offset(origin: GeoPoint, north_m: f64, east_m: f64) -> GeoPoint {
    let d_lat = north_m / EARTH_RADIUS_M;
    let d_lon = east_m / (EARTH_RADIUS_M * origin.latitude_deg.to_radians().cos());
    GeoPoint {
        latitude_deg: origin.latitude_deg + d_lat.to_degrees(),
        longitude_deg: origin.longitude_deg + d_lon.to_degrees(),
        altitude_m: origin.altitude_m,
    }
}

/// Inverse of [`offset`]: north/east metres from `from` to `to`.
pub fn local_delta(from: GeoPoint, to: GeoPoint) -> (f64, f64) {
    let north = (to.latitude_deg - from.latitude_deg).to_radians() * EARTH_RADIUS_M;
    let east = (to.longitude_deg - from.longitude_deg).to_radians()
        * EARTH_RADIUS_M
        * from.latitude_deg.to_radians().cos();
    (north, east)
}

/// Haversine great-circle distance in metres, ignoring altitude.
pub fn distance_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.latitude_deg - a.latitude_deg).to_radians();
    let d_lon = (b.longitude_deg - a.longitude_deg).to_radians();
    let lat1 = a.latitude_deg.to_radians();
    let lat2 = b.latitude_deg.to_radians();

    let h = (d_lat * 0.5).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon * 0.5).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Initial bearing from `a` to `b`, degrees clockwise from north in [0, 360).
pub fn bearing_deg(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.latitude_deg.to_radians();
    let lat2 = b.latitude_deg.to_radians();
    let d_lon = (b.longitude_deg - a.longitude_deg).to_radians();
    let y = d_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lon.cos();
    y.atan2(x).to_degrees().rem_euclid(360.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl BoundingBox {
    /// Smallest box holding every point, or `None` for an empty input.
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = GeoPoint>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let seed = Self {
            north: first.latitude_deg,
            south: first.latitude_deg,
            east: first.longitude_deg,
            west: first.longitude_deg,
        };
        Some(iter.fold(seed, |bbox, point| Self {
            north: bbox.north.max(point.latitude_deg),
            south: bbox.south.min(point.latitude_deg),
            east: bbox.east.max(point.longitude_deg),
            west: bbox.west.min(point.longitude_deg),
        }))
    }

    pub fn contains(&self, point: GeoPoint) -> bool {
        point.latitude_deg <= self.north
            && point.latitude_deg >= self.south
            && point.longitude_deg <= self.east
            && point.longitude_deg >= self.west
    }
}
