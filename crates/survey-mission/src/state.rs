//! Flight phase state machine.
//!
//! Transitions are driven by events the supervisor derives from polled
//! telemetry. Faults and timeouts never lead back into Arming or TakingOff:
//! once the vehicle may be airborne they force a return, on the ground (or
//! when the return itself fails) they abort.

use serde::{Deserialize, Serialize};
use survey_core::MissionState;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionEvent {
    StartRequested,
    PreArmPassed,
    /// Planner inputs rejected or nothing to fly.
    PlanRejected,
    ArmConfirmed,
    AltitudeReached,
    WaypointDispatched,
    WaypointReached,
    RouteComplete,
    RangeLimitReached,
    /// Operator asked to end early with the vehicle brought home.
    AbortRequested,
    LandingConfirmed,
    Fault,
    Timeout,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: MissionState,
    pub event: MissionEvent,
    pub to: MissionState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("event {event:?} is not valid in state {state}")]
pub struct TransitionError {
    pub state: MissionState,
    pub event: MissionEvent,
}

#[derive(Debug, Clone, Default)]
pub struct MissionStateMachine {
    state: MissionState,
    history: Vec<Transition>,
}

impl MissionStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MissionState {
        self.state
    }

    pub fn history(&self) -> &[Transition] {
        &self.history
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Target state for `event` in `state`, or `None` if the pair is invalid.
    pub fn next_state(state: MissionState, event: MissionEvent) -> Option<MissionState> {
        use MissionEvent as E;
        use MissionState as S;

        if state.is_terminal() {
            return None;
        }

        match (state, event) {
            (_, E::Cancelled) => Some(S::Aborted),

            (S::Idle, E::StartRequested) => Some(S::PreArmCheck),
            (S::PreArmCheck, E::PreArmPassed) => Some(S::Arming),
            (S::PreArmCheck, E::PlanRejected) => Some(S::Aborted),
            (S::Arming, E::ArmConfirmed) => Some(S::TakingOff),
            (S::TakingOff, E::AltitudeReached) => Some(S::EnRoute),
            (S::EnRoute, E::WaypointDispatched) => Some(S::Surveying),
            (S::Surveying, E::WaypointReached) => Some(S::Surveying),
            (
                S::EnRoute | S::Surveying,
                E::RouteComplete | E::RangeLimitReached | E::AbortRequested,
            ) => Some(S::ReturningToLaunch),
            (S::TakingOff, E::AbortRequested) => Some(S::ReturningToLaunch),
            (S::ReturningToLaunch, E::LandingConfirmed) => Some(S::Landed),

            (S::TakingOff | S::EnRoute | S::Surveying, E::Fault | E::Timeout) => {
                Some(S::ReturningToLaunch)
            }
            (
                S::Idle | S::PreArmCheck | S::Arming | S::ReturningToLaunch,
                E::Fault | E::Timeout | E::AbortRequested,
            ) => Some(S::Aborted),

            _ => None,
        }
    }

    pub fn apply(&mut self, event: MissionEvent) -> Result<MissionState, TransitionError> {
        let from = self.state;
        let to = Self::next_state(from, event).ok_or(TransitionError { state: from, event })?;
        self.state = to;
        self.history.push(Transition { from, event, to });
        tracing::debug!(from = %from, to = %to, event = ?event, "Mission state transition");
        survey_observability::record_transition(from.as_str(), to.as_str(), to.code());
        Ok(to)
    }
}
