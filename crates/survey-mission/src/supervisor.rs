//! Drives one mission from pre-arm checks to touchdown.
//!
//! Every command is followed by a bounded poll that confirms its effect.
//! Failures in flight send the vehicle home; failures on the ground abort
//! before anything spins up.

use crate::mission::Mission;
use crate::poll::{CancelToken, PollError, PollPolicy, poll_until};
use crate::report::{MissionProgress, MissionReport};
use crate::state::{MissionEvent, MissionStateMachine};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use survey_config::FlightConfig;
use survey_core::{
    EpochMillis, ErrorCode, GeoPoint, LandedState, MissionError, MissionId, MissionOutcome,
    MissionResult, MissionState, now_epoch_millis,
};
use survey_geo::distance_m;
use survey_planner::WaypointStrategy;
use survey_vehicle::{VehicleError, VehicleHandle};
use tokio::sync::watch;
use tracing::{Instrument, error, info, info_span, warn};

/// How the vehicle is brought down once the route is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnAction {
    #[default]
    ReturnToLaunch,
    Land,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SupervisorConfig {
    pub poll_interval: Duration,
    pub prearm_timeout: Duration,
    pub arm_timeout: Duration,
    pub takeoff_timeout: Duration,
    /// Per waypoint, on top of the leg's expected flight time.
    pub waypoint_timeout: Duration,
    pub landing_timeout: Duration,
    pub arrival_tolerance_m: f64,
    /// Fraction of the takeoff altitude that counts as "reached".
    pub takeoff_altitude_ratio: f64,
    pub cruise_speed_m_s: Option<f64>,
    /// Time spent over the last waypoint before returning.
    pub hold: Duration,
    pub return_action: ReturnAction,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            prearm_timeout: Duration::from_secs(5),
            arm_timeout: Duration::from_secs(5),
            takeoff_timeout: Duration::from_secs(30),
            waypoint_timeout: Duration::from_secs(120),
            landing_timeout: Duration::from_secs(180),
            arrival_tolerance_m: 2.0,
            takeoff_altitude_ratio: 0.95,
            cruise_speed_m_s: Some(3.0),
            hold: Duration::ZERO,
            return_action: ReturnAction::ReturnToLaunch,
        }
    }
}

impl SupervisorConfig {
    pub fn from_flight_config(config: &FlightConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            prearm_timeout: Duration::from_millis(config.prearm_timeout_ms),
            arm_timeout: Duration::from_millis(config.arm_timeout_ms),
            takeoff_timeout: Duration::from_millis(config.takeoff_timeout_ms),
            waypoint_timeout: Duration::from_millis(config.waypoint_timeout_ms),
            landing_timeout: Duration::from_millis(config.landing_timeout_ms),
            arrival_tolerance_m: config.arrival_tolerance_m,
            takeoff_altitude_ratio: config.takeoff_altitude_ratio,
            cruise_speed_m_s: Some(config.cruise_speed_m_s).filter(|speed| *speed > 0.0),
            ..Self::default()
        }
    }

    pub fn with_hold(self, hold: Duration) -> Self {
        Self { hold, ..self }
    }

    pub fn with_return_action(self, return_action: ReturnAction) -> Self {
        Self {
            return_action,
            ..self
        }
    }

    /// Arrival allowance for a leg of `leg_m` metres flown at the leg speed,
    /// or the cruise speed when the leg has none.
    pub fn leg_timeout(&self, leg_m: f64, leg_speed_m_s: Option<f64>) -> Duration {
        let usable = |speed: &f64| speed.is_finite() && *speed > 0.0;
        let travel = leg_speed_m_s
            .filter(usable)
            .or(self.cruise_speed_m_s.filter(usable))
            .and_then(|speed| Duration::try_from_secs_f64(leg_m / speed).ok())
            .unwrap_or(Duration::ZERO);
        self.waypoint_timeout.saturating_add(travel)
    }

    fn policy(&self, timeout: Duration) -> PollPolicy {
        PollPolicy::new(self.poll_interval, timeout)
    }
}

pub struct MissionSupervisor {
    id: MissionId,
    vehicle: Arc<dyn VehicleHandle>,
    config: SupervisorConfig,
    machine: MissionStateMachine,
    cancel: CancelToken,
    return_request: CancelToken,
    progress: watch::Sender<MissionProgress>,
    mission: Option<Mission>,
    home: Option<GeoPoint>,
    abort_reason: Option<MissionError>,
}

impl MissionSupervisor {
    pub fn new(vehicle: Arc<dyn VehicleHandle>, config: SupervisorConfig) -> Self {
        let id = MissionId::new();
        let (progress, _) = watch::channel(MissionProgress::new(id));
        Self {
            id,
            vehicle,
            config,
            machine: MissionStateMachine::new(),
            cancel: CancelToken::never(),
            return_request: CancelToken::never(),
            progress,
            mission: None,
            home: None,
            abort_reason: None,
        }
    }

    pub fn with_cancellation(self, cancel: CancelToken) -> Self {
        Self { cancel, ..self }
    }

    /// Ends the mission early but still brings the vehicle home. On the
    /// ground the mission aborts without arming.
    pub fn with_return_request(self, return_request: CancelToken) -> Self {
        Self {
            return_request,
            ..self
        }
    }

    pub fn id(&self) -> MissionId {
        self.id
    }

    pub fn state(&self) -> MissionState {
        self.machine.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<MissionProgress> {
        self.progress.subscribe()
    }

    /// Flies `strategy` to completion. Never fails: every way a mission can
    /// end is described by the report's outcome.
    pub async fn run(mut self, strategy: &dyn WaypointStrategy) -> MissionReport {
        let span = info_span!("mission", mission_id = %self.id, strategy = strategy.name());
        self.execute(strategy).instrument(span).await
    }

    async fn execute(&mut self, strategy: &dyn WaypointStrategy) -> MissionReport {
        let started_at_ms = now_epoch_millis();
        info!("Mission starting");
        if let Err(reason) = self.fly(strategy).await {
            self.recover(reason).await;
        }
        self.report(strategy.name(), started_at_ms)
    }

    async fn fly(&mut self, strategy: &dyn WaypointStrategy) -> MissionResult<()> {
        self.apply(MissionEvent::StartRequested);
        self.wait_for_health().await?;

        let home = self.vehicle.position().await.map_err(vehicle_fault)?;
        self.home = Some(home);
        let route = strategy.plan(home)?;
        if route.is_empty() {
            return Err(MissionError::infeasible_survey(format!(
                "{} produced no reachable waypoints",
                strategy.name()
            )));
        }
        if route.range_limited {
            warn!(
                waypoints = route.len(),
                path_length_m = route.path_length_m,
                "Route truncated by range budget, area only partially covered"
            );
        }
        info!(
            home = %home,
            waypoints = route.len(),
            path_length_m = route.path_length_m,
            "Route planned"
        );
        let total = route.len();
        let range_limited = route.range_limited;
        self.mission = Some(Mission::new(self.id, home, route));
        self.progress.send_modify(|progress| {
            progress.waypoints_total = total;
            progress.updated_at_ms = now_epoch_millis();
        });
        self.apply(MissionEvent::PreArmPassed);

        let altitude_m = strategy.takeoff_altitude_m();
        self.arm(altitude_m).await?;
        self.apply(MissionEvent::ArmConfirmed);

        self.take_off(altitude_m).await?;
        self.apply(MissionEvent::AltitudeReached);

        if let Some(mut mission) = self.mission.take() {
            let flown = self.fly_route(&mut mission).await;
            self.mission = Some(mission);
            flown?;
        }
        self.hold().await?;

        self.apply(if range_limited {
            MissionEvent::RangeLimitReached
        } else {
            MissionEvent::RouteComplete
        });
        self.return_home().await
    }

    async fn wait_for_health(&self) -> MissionResult<()> {
        let vehicle = &self.vehicle;
        let requested = &self.return_request;
        poll_until(
            "pre-arm health",
            self.config.policy(self.config.prearm_timeout),
            &self.cancel,
            || async move {
                check_return_request(requested, "pre-arm health")?;
                let healthy = vehicle.health_ok().await?;
                if !healthy {
                    info!("Waiting for vehicle to pass pre-arm checks");
                }
                Ok::<_, PollError>(healthy.then_some(()))
            },
        )
        .await?;
        info!("Vehicle healthy");
        Ok(())
    }

    async fn arm(&self, altitude_m: f64) -> MissionResult<()> {
        self.vehicle
            .set_takeoff_altitude(altitude_m)
            .await
            .map_err(vehicle_fault)?;
        if self.vehicle.armed().await.map_err(vehicle_fault)? {
            info!("Vehicle already armed");
        } else {
            info!("Arming");
            self.vehicle.arm().await.map_err(vehicle_fault)?;
        }

        let vehicle = &self.vehicle;
        let requested = &self.return_request;
        poll_until(
            "arming",
            self.config.policy(self.config.arm_timeout),
            &self.cancel,
            || async move {
                check_return_request(requested, "arming")?;
                let armed = vehicle.armed().await?;
                Ok::<_, PollError>(armed.then_some(()))
            },
        )
        .await?;
        info!("Vehicle armed");
        Ok(())
    }

    async fn take_off(&self, altitude_m: f64) -> MissionResult<()> {
        info!(altitude_m, "Taking off");
        self.vehicle.takeoff().await.map_err(vehicle_fault)?;

        let threshold_m = altitude_m * self.config.takeoff_altitude_ratio;
        let vehicle = &self.vehicle;
        let progress = &self.progress;
        let requested = &self.return_request;
        let position = poll_until(
            "takeoff altitude",
            self.config.policy(self.config.takeoff_timeout),
            &self.cancel,
            || async move {
                check_return_request(requested, "takeoff altitude")?;
                check_health(vehicle.as_ref()).await?;
                let position = vehicle.position().await?;
                progress.send_modify(|progress| {
                    progress.altitude_m = Some(position.altitude_m);
                    progress.updated_at_ms = now_epoch_millis();
                });
                Ok::<_, PollError>((position.altitude_m >= threshold_m).then_some(position))
            },
        )
        .await?;
        info!(altitude_m = position.altitude_m, "Takeoff altitude reached");

        if let Some(speed) = self.config.cruise_speed_m_s {
            self.vehicle.set_max_speed(speed).await.map_err(vehicle_fault)?;
        }
        Ok(())
    }

    async fn fly_route(&mut self, mission: &mut Mission) -> MissionResult<()> {
        let speed_m_s = mission.route().speed_m_s;
        while let Some(waypoint) = mission.current().copied() {
            let leg_start = self.vehicle.position().await.map_err(vehicle_fault)?;
            let timeout = self
                .config
                .leg_timeout(distance_m(leg_start, waypoint.point), speed_m_s);
            info!(
                waypoint = waypoint.index,
                target = %waypoint.point,
                timeout_s = timeout.as_secs_f64(),
                "Dispatching waypoint"
            );
            self.vehicle
                .goto_location(waypoint.point, speed_m_s)
                .await
                .map_err(vehicle_fault)?;
            if self.machine.state() == MissionState::EnRoute {
                self.apply(MissionEvent::WaypointDispatched);
            }

            self.wait_for_arrival(waypoint.point, timeout).await?;
            mission.next();
            self.apply(MissionEvent::WaypointReached);
            survey_observability::record_waypoint_reached();

            let reached = mission.reached();
            self.progress.send_modify(|progress| {
                progress.waypoints_reached = reached;
                progress.distance_to_target_m = None;
                progress.updated_at_ms = now_epoch_millis();
            });
            info!(
                waypoint = waypoint.index,
                reached,
                total = mission.total(),
                "Waypoint reached"
            );
        }
        Ok(())
    }

    async fn wait_for_arrival(&self, target: GeoPoint, timeout: Duration) -> MissionResult<()> {
        let tolerance_m = self.config.arrival_tolerance_m;
        let vehicle = &self.vehicle;
        let progress = &self.progress;
        let requested = &self.return_request;
        poll_until(
            "waypoint arrival",
            self.config.policy(timeout),
            &self.cancel,
            || async move {
                check_return_request(requested, "waypoint arrival")?;
                check_health(vehicle.as_ref()).await?;
                let position = vehicle.position().await?;
                let distance = distance_m(position, target);
                progress.send_modify(|progress| {
                    progress.distance_to_target_m = Some(distance);
                    progress.altitude_m = Some(position.altitude_m);
                    progress.updated_at_ms = now_epoch_millis();
                });
                Ok::<_, PollError>((distance <= tolerance_m).then_some(()))
            },
        )
        .await?;
        Ok(())
    }

    async fn hold(&self) -> MissionResult<()> {
        if self.config.hold.is_zero() {
            return Ok(());
        }
        info!(seconds = self.config.hold.as_secs_f64(), "Holding position");
        let vehicle = &self.vehicle;
        let requested = &self.return_request;
        let held = poll_until(
            "hold",
            self.config.policy(self.config.hold),
            &self.cancel,
            || async move {
                check_return_request(requested, "hold")?;
                check_health(vehicle.as_ref()).await?;
                Ok::<Option<()>, PollError>(None)
            },
        )
        .await;
        match held {
            Ok(()) | Err(PollError::TimedOut { .. }) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn issue_return(&self) -> MissionResult<()> {
        match self.config.return_action {
            ReturnAction::ReturnToLaunch => {
                info!("Returning to launch");
                self.vehicle.return_to_launch().await
            }
            ReturnAction::Land => {
                info!("Landing in place");
                self.vehicle.land().await
            }
        }
        .map_err(vehicle_fault)
    }

    async fn return_home(&mut self) -> MissionResult<()> {
        self.issue_return().await?;

        let vehicle = &self.vehicle;
        poll_until(
            "touchdown",
            self.config.policy(self.config.landing_timeout),
            &self.cancel,
            || async move {
                let landed = vehicle.landed_state().await?;
                Ok::<_, PollError>((landed == LandedState::OnGround).then_some(()))
            },
        )
        .await?;
        info!("Vehicle landed");
        self.apply(MissionEvent::LandingConfirmed);
        Ok(())
    }

    async fn recover(&mut self, reason: MissionError) {
        let from = self.machine.state();
        warn!(
            state = %from,
            code = %reason.code,
            reason = %reason.message,
            "Mission interrupted"
        );
        let event = self.recovery_event(&reason);
        self.abort_reason = Some(reason);

        let aborting = MissionStateMachine::next_state(from, event) == Some(MissionState::Aborted);
        if aborting && from.is_airborne() && from != MissionState::ReturningToLaunch {
            if let Err(err) = self.issue_return().await {
                error!(code = %err.code, reason = %err.message, "Return command failed");
            }
        }
        self.apply(event);

        match self.machine.state() {
            MissionState::ReturningToLaunch => {
                if let Err(err) = self.return_home().await {
                    error!(
                        code = %err.code,
                        reason = %err.message,
                        "Return did not complete"
                    );
                    self.apply(interruption_event(err.code));
                }
            }
            MissionState::Aborted if from == MissionState::Arming => {
                if let Ok(true) = self.vehicle.armed().await {
                    info!("Disarming on the ground");
                    if let Err(err) = self.vehicle.land().await {
                        error!(error = %err, "Disarm failed");
                    }
                }
            }
            _ => {}
        }
    }

    /// A cancelled wait is an operator return request unless the mission
    /// itself was cancelled.
    fn recovery_event(&self, reason: &MissionError) -> MissionEvent {
        if reason.code == ErrorCode::Cancelled
            && self.return_request.is_cancelled()
            && !self.cancel.is_cancelled()
        {
            MissionEvent::AbortRequested
        } else {
            interruption_event(reason.code)
        }
    }

    fn apply(&mut self, event: MissionEvent) {
        let from = self.machine.state();
        match self.machine.apply(event) {
            Ok(state) => {
                self.progress.send_modify(|progress| {
                    progress.state = state;
                    progress.updated_at_ms = now_epoch_millis();
                });
                if state != from {
                    info!(from = %from, to = %state, "Mission state changed");
                }
            }
            Err(err) => error!(error = %err, "Mission event ignored"),
        }
    }

    fn report(&self, strategy: &str, started_at_ms: EpochMillis) -> MissionReport {
        let final_state = self.machine.state();
        let route = self.mission.as_ref().map(Mission::route);
        let range_limited = route.is_some_and(|route| route.range_limited);
        let outcome = match (&self.abort_reason, final_state) {
            (Some(reason), _) => MissionOutcome::Aborted(reason.clone()),
            (None, MissionState::Landed) if range_limited => MissionOutcome::RangeLimited,
            (None, MissionState::Landed) => MissionOutcome::Completed,
            (None, state) => MissionOutcome::Aborted(MissionError::collaborator_fault(format!(
                "mission stopped in state {state}"
            ))),
        };
        survey_observability::record_outcome(outcome.as_str());
        info!(outcome = %outcome, final_state = %final_state, "Mission finished");

        MissionReport {
            mission_id: self.id,
            strategy: strategy.to_string(),
            outcome,
            final_state,
            home: self.home,
            waypoints_total: route.map_or(0, |route| route.len()),
            waypoints_reached: self.mission.as_ref().map_or(0, Mission::reached),
            range_limited,
            path_length_m: route.map_or(0.0, |route| route.path_length_m),
            transitions: self.machine.history().to_vec(),
            started_at_ms,
            finished_at_ms: now_epoch_millis(),
        }
    }
}

fn vehicle_fault(err: VehicleError) -> MissionError {
    PollError::Vehicle(err).into()
}

async fn check_health(vehicle: &dyn VehicleHandle) -> Result<(), PollError> {
    if vehicle.health_ok().await? {
        Ok(())
    } else {
        Err(PollError::Fault("vehicle health check failed in flight".to_string()))
    }
}

fn check_return_request(requested: &CancelToken, what: &'static str) -> Result<(), PollError> {
    if requested.is_cancelled() {
        Err(PollError::ReturnRequested { what })
    } else {
        Ok(())
    }
}

fn interruption_event(code: ErrorCode) -> MissionEvent {
    match code {
        ErrorCode::Cancelled => MissionEvent::Cancelled,
        ErrorCode::PreconditionTimeout => MissionEvent::Timeout,
        ErrorCode::InvalidGeometry | ErrorCode::InfeasibleSurvey => MissionEvent::PlanRejected,
        ErrorCode::CollaboratorFault => MissionEvent::Fault,
    }
}
