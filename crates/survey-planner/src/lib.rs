//! Waypoint strategies: what a mission flies, decided once home is known.
//!
//! - [`CoverageWaypointPlanner`]: boustrophedon survey of a rectangle
//! - [`FixedWaypoints`]: an explicit list of absolute points
//! - [`HoldPosition`]: climb and hold above home
//!
//! Every strategy is pure and synchronous.

pub mod coverage;
pub mod fixed;

use serde::{Deserialize, Serialize};
use survey_core::{GeoPoint, MissionResult, Waypoint};
use survey_geo::BoundingBox;

pub use coverage::{CoverageWaypointPlanner, DEFAULT_OVERLAP_FRACTION, build, footprint_width_m};
pub use fixed::{FixedWaypoints, HoldPosition};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverageSummary {
    pub footprint_width_m: f64,
    pub lane_spacing_m: f64,
    pub lane_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedRoute {
    pub waypoints: Vec<Waypoint>,
    /// Set when the range budget cut the route short.
    pub range_limited: bool,
    /// Home to first waypoint, then leg by leg.
    pub path_length_m: f64,
    /// Ground speed requested for every leg; `None` keeps the cruise speed.
    pub speed_m_s: Option<f64>,
    pub coverage: Option<CoverageSummary>,
}

impl PlannedRoute {
    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn bounds(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(self.waypoints.iter().map(|waypoint| waypoint.point))
    }
}

pub trait WaypointStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Altitude the vehicle climbs to before the first waypoint.
    fn takeoff_altitude_m(&self) -> f64;

    fn plan(&self, home: GeoPoint) -> MissionResult<PlannedRoute>;
}

pub(crate) fn validate_altitude(altitude_m: f64) -> MissionResult<()> {
    if altitude_m.is_finite() && altitude_m > 0.0 {
        Ok(())
    } else {
        Err(survey_core::MissionError::invalid_geometry(format!(
            "altitude must be positive, got {altitude_m}"
        )))
    }
}
