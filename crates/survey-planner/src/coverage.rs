//! Boustrophedon (lawnmower) coverage of a rectangular survey area.
//!
//! Lanes run along the area's length (north) and are stacked along its
//! width (east). Consecutive lanes alternate direction so each turn-around is
//! a single lane spacing. The camera footprint sets the spacing:
//!
//! ```text
//! footprint = 2 * altitude * tan(fov / 2)
//! spacing   = footprint * (1 - overlap)
//! ```
//!
//! Path length is measured in the local north/east frame that
//! [`survey_geo::offset`] projects from, starting at home.

use crate::{CoverageSummary, PlannedRoute, WaypointStrategy, validate_altitude};
use survey_core::{GeoPoint, MissionError, MissionResult, SurveyArea, Waypoint};
use survey_geo::offset;

pub const DEFAULT_OVERLAP_FRACTION: f64 = 0.2;

/// Upper bound on lanes; beyond this the inputs are almost certainly wrong.
const MAX_LANES: usize = 10_000;

/// Ground width seen by the camera at `altitude_m`.
pub fn footprint_width_m(altitude_m: f64, fov_deg: f64) -> MissionResult<f64> {
    validate_altitude(altitude_m)?;
    if !(fov_deg.is_finite() && fov_deg > 0.0 && fov_deg < 180.0) {
        return Err(MissionError::invalid_geometry(format!(
            "camera field of view must be in (0, 180) degrees, got {fov_deg}"
        )));
    }
    Ok(2.0 * altitude_m * (fov_deg / 2.0).to_radians().tan())
}

/// Plans a survey with the default overlap fraction.
pub fn build(
    home: GeoPoint,
    area: SurveyArea,
    fov_deg: f64,
    altitude_m: f64,
    max_range_m: f64,
) -> MissionResult<PlannedRoute> {
    CoverageWaypointPlanner::new(area, fov_deg, altitude_m, max_range_m).build(home)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverageWaypointPlanner {
    pub area: SurveyArea,
    pub fov_deg: f64,
    pub altitude_m: f64,
    pub max_range_m: f64,
    pub overlap_fraction: f64,
}

impl CoverageWaypointPlanner {
    pub fn new(area: SurveyArea, fov_deg: f64, altitude_m: f64, max_range_m: f64) -> Self {
        Self {
            area,
            fov_deg,
            altitude_m,
            max_range_m,
            overlap_fraction: DEFAULT_OVERLAP_FRACTION,
        }
    }

    pub fn with_overlap(self, overlap_fraction: f64) -> Self {
        Self {
            overlap_fraction,
            ..self
        }
    }

    pub fn build(&self, home: GeoPoint) -> MissionResult<PlannedRoute> {
        self.area.validate()?;
        if !home.is_finite() {
            return Err(MissionError::invalid_geometry("home position is not finite"));
        }
        if !(self.overlap_fraction >= 0.0 && self.overlap_fraction < 1.0) {
            return Err(MissionError::invalid_geometry(format!(
                "overlap fraction must be in [0, 1), got {}",
                self.overlap_fraction
            )));
        }
        if self.max_range_m.is_nan() || self.max_range_m < 0.0 {
            return Err(MissionError::invalid_geometry(format!(
                "maximum range must be non-negative, got {}",
                self.max_range_m
            )));
        }

        let footprint = footprint_width_m(self.altitude_m, self.fov_deg)?;
        let spacing = footprint * (1.0 - self.overlap_fraction);
        let single_lane = self.area.width_m <= footprint;
        let lane_count = if single_lane {
            1
        } else {
            let lanes = (self.area.width_m / spacing).ceil();
            if !lanes.is_finite() || lanes > MAX_LANES as f64 {
                return Err(MissionError::invalid_geometry(format!(
                    "survey needs more than {MAX_LANES} lanes at {spacing:.3} m spacing"
                )));
            }
            (lanes as usize).max(1)
        };

        let corners = self.lane_corners(lane_count, spacing, single_lane);

        let mut waypoints = Vec::with_capacity(corners.len());
        let mut path_length_m = 0.0;
        let mut range_limited = false;
        let mut previous = (0.0, 0.0);
        for (north, east) in corners {
            let leg = (north - previous.0).hypot(east - previous.1);
            if path_length_m + leg > self.max_range_m {
                range_limited = true;
                break;
            }
            path_length_m += leg;
            previous = (north, east);
            let point = offset(home, north, east).with_altitude(self.altitude_m);
            waypoints.push(Waypoint::new(waypoints.len(), point));
        }

        Ok(PlannedRoute {
            waypoints,
            range_limited,
            path_length_m,
            speed_m_s: None,
            coverage: Some(CoverageSummary {
                footprint_width_m: footprint,
                lane_spacing_m: spacing,
                lane_count,
            }),
        })
    }

    /// Entry and exit corner of every lane as (north, east) metres from home.
    fn lane_corners(&self, lane_count: usize, spacing: f64, single_lane: bool) -> Vec<(f64, f64)> {
        let near = self.area.origin_north_m;
        let far = self.area.origin_north_m + self.area.length_m;
        (0..lane_count)
            .flat_map(|lane| {
                let east = if single_lane {
                    self.area.origin_east_m + self.area.width_m / 2.0
                } else {
                    self.area.origin_east_m + lane as f64 * spacing
                };
                let (entry, exit) = if lane % 2 == 0 { (near, far) } else { (far, near) };
                [(entry, east), (exit, east)]
            })
            .collect()
    }
}

impl WaypointStrategy for CoverageWaypointPlanner {
    fn name(&self) -> &'static str {
        "survey"
    }

    fn takeoff_altitude_m(&self) -> f64 {
        self.altitude_m
    }

    fn plan(&self, home: GeoPoint) -> MissionResult<PlannedRoute> {
        self.build(home)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use survey_core::ErrorCode;
    use survey_geo::{distance_m, local_delta};

    const HOME: GeoPoint = GeoPoint::new(0.0, 0.0, 0.0);

    /// +1 for a northbound lane, -1 for southbound, one entry per lane.
    fn lane_directions(home: GeoPoint, route: &PlannedRoute) -> Vec<i8> {
        route
            .waypoints
            .chunks(2)
            .filter(|pair| pair.len() == 2)
            .map(|pair| {
                let (entry, _) = local_delta(home, pair[0].point);
                let (exit, _) = local_delta(home, pair[1].point);
                if exit > entry { 1 } else { -1 }
            })
            .collect()
    }

    #[test]
    fn footprint_matches_field_of_view() {
        let footprint = footprint_width_m(10.0, 90.0).unwrap();
        assert!((footprint - 20.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_bad_geometry() {
        let area = SurveyArea::new(20.0, 60.0);
        let cases = [
            CoverageWaypointPlanner::new(area, 90.0, 0.0, 500.0),
            CoverageWaypointPlanner::new(area, 90.0, -5.0, 500.0),
            CoverageWaypointPlanner::new(area, 0.0, 10.0, 500.0),
            CoverageWaypointPlanner::new(area, 180.0, 10.0, 500.0),
            CoverageWaypointPlanner::new(area, f64::NAN, 10.0, 500.0),
            CoverageWaypointPlanner::new(SurveyArea::new(-1.0, 60.0), 90.0, 10.0, 500.0),
            CoverageWaypointPlanner::new(area, 90.0, 10.0, -1.0),
            CoverageWaypointPlanner::new(area, 90.0, 10.0, 500.0).with_overlap(1.0),
            CoverageWaypointPlanner::new(area, 90.0, 10.0, 500.0).with_overlap(-0.1),
        ];
        for planner in cases {
            let err = planner.build(HOME).unwrap_err();
            assert_eq!(err.code, ErrorCode::InvalidGeometry, "{planner:?}");
        }
    }

    #[test]
    fn reference_scenario_two_lanes_four_waypoints() {
        let route = build(HOME, SurveyArea::new(20.0, 60.0), 90.0, 10.0, 1_000.0).unwrap();
        let coverage = route.coverage.unwrap();
        assert!((coverage.footprint_width_m - 20.0).abs() < 1e-9);
        assert!((coverage.lane_spacing_m - 16.0).abs() < 1e-9);
        assert_eq!(coverage.lane_count, 2);
        assert_eq!(route.len(), 4);
        assert!(!route.range_limited);
        assert_eq!(lane_directions(HOME, &route), vec![1, -1]);

        let indices: Vec<usize> = route.waypoints.iter().map(|waypoint| waypoint.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert!(route.waypoints.iter().all(|waypoint| waypoint.point.altitude_m == 10.0));

        // 60 up, 16 across, 60 back.
        assert!((route.path_length_m - 136.0).abs() < 1e-6);
    }

    #[test]
    fn narrow_area_flies_single_centerline_lane() {
        for width in [0.5, 5.0, 10.0, 19.0] {
            let route = build(HOME, SurveyArea::new(width, 40.0), 90.0, 10.0, 1_000.0).unwrap();
            assert_eq!(route.len(), 2, "width {width}");
            assert_eq!(route.coverage.unwrap().lane_count, 1);
            let (_, east) = local_delta(HOME, route.waypoints[0].point);
            assert!((east - width / 2.0).abs() < 1e-6);
        }
    }

    #[test]
    fn lanes_alternate_direction() {
        let route = build(HOME, SurveyArea::new(130.0, 80.0), 60.0, 25.0, 10_000.0).unwrap();
        let directions = lane_directions(HOME, &route);
        assert!(directions.len() > 3);
        for pair in directions.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
    }

    #[test]
    fn lane_count_covers_width() {
        let planner = CoverageWaypointPlanner::new(SurveyArea::new(90.0, 50.0), 90.0, 10.0, 10_000.0)
            .with_overlap(0.0);
        let route = planner.build(HOME).unwrap();
        // 20 m spacing -> ceil(90 / 20) = 5 lanes.
        assert_eq!(route.coverage.unwrap().lane_count, 5);
        assert_eq!(route.len(), 10);
        let (_, last_east) = local_delta(HOME, route.waypoints[9].point);
        assert!((last_east - 80.0).abs() < 1e-6);
    }

    #[test]
    fn build_is_deterministic() {
        let area = SurveyArea::new(75.0, 120.0).with_origin(10.0, -5.0);
        let home = GeoPoint::new(47.397742, 8.545594, 0.0);
        let first = build(home, area, 70.0, 30.0, 600.0).unwrap();
        let second = build(home, area, 70.0, 30.0, 600.0).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn larger_range_never_loses_waypoints() {
        let area = SurveyArea::new(200.0, 150.0);
        let mut previous = 0;
        for range in (0..=3_000).step_by(50) {
            let route = build(HOME, area, 84.0, 20.0, range as f64).unwrap();
            assert!(route.len() >= previous, "range {range}");
            assert!(route.path_length_m <= range as f64 + 1e-9);
            previous = route.len();
        }
    }

    #[test]
    fn range_budget_truncates_and_flags() {
        // Full route is 136 m; 100 m reaches the second lane's entry only.
        let route = build(HOME, SurveyArea::new(20.0, 60.0), 90.0, 10.0, 100.0).unwrap();
        assert!(route.range_limited);
        assert_eq!(route.len(), 3);
        assert!((route.path_length_m - 76.0).abs() < 1e-6);
    }

    #[test]
    fn unreachable_first_waypoint_yields_empty_route() {
        let area = SurveyArea::new(10.0, 40.0).with_origin(50.0, -5.0);
        let route = build(HOME, area, 90.0, 10.0, 5.0).unwrap();
        assert!(route.is_empty());
        assert!(route.range_limited);
        assert_eq!(route.path_length_m, 0.0);
    }

    #[test]
    fn area_origin_shifts_waypoints() {
        let area = SurveyArea::new(10.0, 40.0).with_origin(50.0, -5.0);
        let route = build(HOME, area, 90.0, 10.0, 1_000.0).unwrap();
        let first = route.waypoints[0].point;
        assert!((distance_m(HOME, first) - 50.0).abs() < 1e-6);
        let (north, east) = local_delta(HOME, route.waypoints[1].point);
        assert!((north - 90.0).abs() < 1e-6);
        assert!(east.abs() < 1e-6);
    }

    #[test]
    fn route_bounds_contain_every_waypoint() {
        let home = GeoPoint::new(-33.7, 151.2, 0.0);
        let route = build(home, SurveyArea::new(60.0, 60.0), 90.0, 15.0, 5_000.0).unwrap();
        let bounds = route.bounds().unwrap();
        assert!(route.waypoints.iter().all(|waypoint| bounds.contains(waypoint.point)));
    }

    #[test]
    fn absurd_lane_count_is_rejected() {
        let planner = CoverageWaypointPlanner::new(SurveyArea::new(1.0e9, 10.0), 1.0, 1.0, 1.0);
        let err = planner.build(HOME).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidGeometry);
    }
}
