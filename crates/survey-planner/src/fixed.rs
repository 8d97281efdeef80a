use crate::{PlannedRoute, WaypointStrategy, validate_altitude};
use survey_core::{GeoPoint, MissionError, MissionResult, Waypoint};
use survey_geo::distance_m;

/// Flies an explicit list of absolute points in order.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedWaypoints {
    pub points: Vec<GeoPoint>,
    pub altitude_m: f64,
    pub speed_m_s: Option<f64>,
}

impl FixedWaypoints {
    pub fn new(points: Vec<GeoPoint>, altitude_m: f64) -> Self {
        Self {
            points,
            altitude_m,
            speed_m_s: None,
        }
    }

    pub fn with_speed(self, speed_m_s: f64) -> Self {
        Self {
            speed_m_s: Some(speed_m_s),
            ..self
        }
    }
}

impl WaypointStrategy for FixedWaypoints {
    fn name(&self) -> &'static str {
        "goto"
    }

    fn takeoff_altitude_m(&self) -> f64 {
        self.altitude_m
    }

    fn plan(&self, home: GeoPoint) -> MissionResult<PlannedRoute> {
        validate_altitude(self.altitude_m)?;
        if let Some(speed) = self.speed_m_s {
            if !(speed.is_finite() && speed > 0.0) {
                return Err(MissionError::invalid_geometry(format!(
                    "leg speed must be positive, got {speed}"
                )));
            }
        }
        for (index, point) in self.points.iter().enumerate() {
            if !point.is_finite()
                || point.latitude_deg.abs() > 90.0
                || point.longitude_deg.abs() > 180.0
            {
                return Err(MissionError::invalid_geometry(format!(
                    "waypoint {index} is not a valid position: {point}"
                )));
            }
            validate_altitude(point.altitude_m)?;
        }

        let mut path_length_m = 0.0;
        let mut previous = home;
        let waypoints: Vec<Waypoint> = self
            .points
            .iter()
            .enumerate()
            .map(|(index, point)| {
                path_length_m += distance_m(previous, *point);
                previous = *point;
                Waypoint::new(index, *point)
            })
            .collect();

        Ok(PlannedRoute {
            waypoints,
            range_limited: false,
            path_length_m,
            speed_m_s: self.speed_m_s,
            coverage: None,
        })
    }
}

/// Climbs over home and stays there; pairs with a hold duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoldPosition {
    pub altitude_m: f64,
}

impl WaypointStrategy for HoldPosition {
    fn name(&self) -> &'static str {
        "arm-and-hold"
    }

    fn takeoff_altitude_m(&self) -> f64 {
        self.altitude_m
    }

    fn plan(&self, home: GeoPoint) -> MissionResult<PlannedRoute> {
        validate_altitude(self.altitude_m)?;
        Ok(PlannedRoute {
            waypoints: vec![Waypoint::new(0, home.with_altitude(self.altitude_m))],
            range_limited: false,
            path_length_m: 0.0,
            speed_m_s: None,
            coverage: None,
        })
    }
}
