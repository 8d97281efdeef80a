use crate::error::{MissionError, MissionResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use survey_geo::GeoPoint;

/// Rectangular area of interest, laid out north (length) by east (width)
/// from its near corner. The corner sits `origin_north_m` / `origin_east_m`
/// away from home.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurveyArea {
    pub width_m: f64,
    pub length_m: f64,
    #[serde(default)]
    pub origin_north_m: f64,
    #[serde(default)]
    pub origin_east_m: f64,
}

impl SurveyArea {
    pub fn new(width_m: f64, length_m: f64) -> Self {
        Self {
            width_m,
            length_m,
            origin_north_m: 0.0,
            origin_east_m: 0.0,
        }
    }

    pub fn with_origin(self, origin_north_m: f64, origin_east_m: f64) -> Self {
        Self {
            origin_north_m,
            origin_east_m,
            ..self
        }
    }

    pub fn validate(&self) -> MissionResult<()> {
        if !(self.width_m.is_finite() && self.width_m > 0.0) {
            return Err(MissionError::invalid_geometry(format!(
                "survey width must be positive, got {}",
                self.width_m
            )));
        }
        if !(self.length_m.is_finite() && self.length_m > 0.0) {
            return Err(MissionError::invalid_geometry(format!(
                "survey length must be positive, got {}",
                self.length_m
            )));
        }
        if !(self.origin_north_m.is_finite() && self.origin_east_m.is_finite()) {
            return Err(MissionError::invalid_geometry(
                "survey origin offset must be finite",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub index: usize,
    pub point: GeoPoint,
}

impl Waypoint {
    pub fn new(index: usize, point: GeoPoint) -> Self {
        Self { index, point }
    }
}

impl fmt::Display for Waypoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.index, self.point)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionState {
    #[default]
    Idle,
    PreArmCheck,
    Arming,
    TakingOff,
    EnRoute,
    Surveying,
    ReturningToLaunch,
    Landed,
    Aborted,
}

impl MissionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Landed | Self::Aborted)
    }

    /// States in which the vehicle may be off the ground and must be brought
    /// back rather than abandoned.
    pub fn is_airborne(self) -> bool {
        matches!(
            self,
            Self::TakingOff | Self::EnRoute | Self::Surveying | Self::ReturningToLaunch
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::PreArmCheck => "pre_arm_check",
            Self::Arming => "arming",
            Self::TakingOff => "taking_off",
            Self::EnRoute => "en_route",
            Self::Surveying => "surveying",
            Self::ReturningToLaunch => "returning_to_launch",
            Self::Landed => "landed",
            Self::Aborted => "aborted",
        }
    }

    /// Stable numeric code for the state gauge.
    pub fn code(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::PreArmCheck => 1,
            Self::Arming => 2,
            Self::TakingOff => 3,
            Self::EnRoute => 4,
            Self::Surveying => 5,
            Self::ReturningToLaunch => 6,
            Self::Landed => 7,
            Self::Aborted => 8,
        }
    }
}

impl fmt::Display for MissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandedState {
    #[default]
    Unknown,
    OnGround,
    TakingOff,
    InAir,
    Landing,
}

impl fmt::Display for LandedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Self::Unknown => "unknown",
            Self::OnGround => "on_ground",
            Self::TakingOff => "taking_off",
            Self::InAir => "in_air",
            Self::Landing => "landing",
        };
        f.write_str(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum MissionOutcome {
    Completed,
    Aborted(MissionError),
    RangeLimited,
}

impl MissionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Aborted(_) => "aborted",
            Self::RangeLimited => "range_limited",
        }
    }

    pub fn abort_reason(&self) -> Option<&MissionError> {
        match self {
            Self::Aborted(reason) => Some(reason),
            _ => None,
        }
    }
}

impl fmt::Display for MissionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aborted(reason) => write!(f, "aborted ({reason})"),
            other => f.write_str(other.as_str()),
        }
    }
}
