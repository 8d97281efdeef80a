use crate::state::Transition;
use serde::{Deserialize, Serialize};
use survey_core::{
    EpochMillis, GeoPoint, MissionId, MissionOutcome, MissionState, now_epoch_millis,
};

/// Live view of a running mission, published on every state change and
/// telemetry probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionProgress {
    pub mission_id: MissionId,
    pub state: MissionState,
    pub waypoints_reached: usize,
    pub waypoints_total: usize,
    /// Horizontal distance to the waypoint being flown to.
    pub distance_to_target_m: Option<f64>,
    pub altitude_m: Option<f64>,
    pub updated_at_ms: EpochMillis,
}

impl MissionProgress {
    pub fn new(mission_id: MissionId) -> Self {
        Self {
            mission_id,
            state: MissionState::Idle,
            waypoints_reached: 0,
            waypoints_total: 0,
            distance_to_target_m: None,
            altitude_m: None,
            updated_at_ms: now_epoch_millis(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionReport {
    pub mission_id: MissionId,
    pub strategy: String,
    pub outcome: MissionOutcome,
    pub final_state: MissionState,
    pub home: Option<GeoPoint>,
    pub waypoints_total: usize,
    pub waypoints_reached: usize,
    pub range_limited: bool,
    pub path_length_m: f64,
    pub transitions: Vec<Transition>,
    pub started_at_ms: EpochMillis,
    pub finished_at_ms: EpochMillis,
}

impl MissionReport {
    pub fn is_success(&self) -> bool {
        !matches!(self.outcome, MissionOutcome::Aborted(_))
    }
}
