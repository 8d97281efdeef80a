//! In-process kinematic vehicle.
//!
//! Motion is integrated lazily from elapsed `tokio::time` on every call, so
//! tests running with a paused clock fly whole missions instantly.

use crate::{FlightMode, TelemetrySnapshot, VehicleError, VehicleHandle};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use survey_core::LandedState;
use survey_geo::{GeoPoint, bearing_deg, distance_m, local_delta, offset};
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub home: GeoPoint,
    /// Time after start-up until pre-arm health passes. `None` never passes.
    pub ready_after: Option<Duration>,
    pub climb_rate_m_s: f64,
    pub descent_rate_m_s: f64,
    /// Hard horizontal speed cap; `set_max_speed` cannot exceed it.
    pub max_speed_m_s: f64,
    pub rtl_altitude_m: f64,
    pub battery_drain_per_s: f64,
    pub gps_satellites: u8,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            home: GeoPoint::new(47.397742, 8.545594, 0.0),
            ready_after: Some(Duration::from_secs(2)),
            climb_rate_m_s: 2.5,
            descent_rate_m_s: 1.5,
            max_speed_m_s: 12.0,
            rtl_altitude_m: 15.0,
            battery_drain_per_s: 0.02,
            gps_satellites: 12,
        }
    }
}

/// Every command the simulator acknowledged or refused, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum SimCommand {
    Arm,
    SetTakeoffAltitude(f64),
    Takeoff,
    Goto {
        target: GeoPoint,
        speed_m_s: Option<f64>,
    },
    SetMaxSpeed(f64),
    ReturnToLaunch,
    Land,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Motion {
    Idle,
    Climb { altitude_m: f64 },
    Goto { target: GeoPoint, speed_m_s: f64 },
    RtlClimb,
    RtlCruise,
    Descend,
}

#[derive(Debug)]
struct SimState {
    config: SimConfig,
    started_at: Instant,
    last_update: Instant,
    position: GeoPoint,
    armed: bool,
    landed_state: LandedState,
    mode: FlightMode,
    motion: Motion,
    takeoff_altitude_m: f64,
    cruise_speed_m_s: f64,
    battery_percent: f64,
    heading_deg: f64,
    ground_speed_m_s: f64,
    health_override: Option<bool>,
    link_lost: bool,
    closed: bool,
    rejected: HashSet<&'static str>,
    commands: Vec<SimCommand>,
}

impl SimState {
    fn new(config: SimConfig) -> Self {
        let now = Instant::now();
        Self {
            position: config.home,
            cruise_speed_m_s: config.max_speed_m_s.min(5.0),
            takeoff_altitude_m: 2.5,
            config,
            started_at: now,
            last_update: now,
            armed: false,
            landed_state: LandedState::OnGround,
            mode: FlightMode::Ready,
            motion: Motion::Idle,
            battery_percent: 100.0,
            heading_deg: 0.0,
            ground_speed_m_s: 0.0,
            health_override: None,
            link_lost: false,
            closed: false,
            rejected: HashSet::new(),
            commands: Vec::new(),
        }
    }

    fn check_link(&self) -> Result<(), VehicleError> {
        if self.closed {
            return Err(VehicleError::Closed);
        }
        if self.link_lost {
            return Err(VehicleError::ConnectionLost);
        }
        Ok(())
    }

    fn command(&mut self, command: SimCommand, name: &'static str) -> Result<(), VehicleError> {
        self.check_link()?;
        self.advance();
        self.commands.push(command);
        if self.rejected.contains(name) {
            return Err(VehicleError::rejected(name, "command denied by autopilot"));
        }
        Ok(())
    }

    fn health_ok(&self) -> bool {
        if let Some(forced) = self.health_override {
            return forced;
        }
        match self.config.ready_after {
            Some(delay) => self.last_update.duration_since(self.started_at) >= delay,
            None => false,
        }
    }

    fn in_air(&self) -> bool {
        !matches!(self.landed_state, LandedState::OnGround | LandedState::Unknown)
    }

    fn advance(&mut self) {
        let now = Instant::now();
        let dt = now.duration_since(self.last_update).as_secs_f64();
        self.last_update = now;
        if dt <= 0.0 {
            return;
        }
        if self.armed {
            self.battery_percent = (self.battery_percent - self.config.battery_drain_per_s * dt).max(0.0);
        }
        self.ground_speed_m_s = 0.0;

        match self.motion {
            Motion::Idle => {}
            Motion::Climb { altitude_m } => {
                if self.step_vertical(altitude_m, dt) {
                    self.landed_state = LandedState::InAir;
                    self.mode = FlightMode::Hold;
                    self.motion = Motion::Idle;
                }
            }
            Motion::Goto { target, speed_m_s } => {
                let level = self.step_vertical(target.altitude_m, dt);
                let arrived = self.step_horizontal(target, speed_m_s, dt);
                if level && arrived {
                    self.mode = FlightMode::Hold;
                    self.motion = Motion::Idle;
                }
            }
            Motion::RtlClimb => {
                let altitude = self.position.altitude_m.max(self.config.rtl_altitude_m);
                if self.step_vertical(altitude, dt) {
                    self.motion = Motion::RtlCruise;
                }
            }
            Motion::RtlCruise => {
                let home = self.config.home.with_altitude(self.position.altitude_m);
                if self.step_horizontal(home, self.cruise_speed_m_s, dt) {
                    self.landed_state = LandedState::Landing;
                    self.motion = Motion::Descend;
                }
            }
            Motion::Descend => {
                if self.step_vertical(0.0, dt) {
                    self.touch_down();
                }
            }
        }
    }

    /// Returns true once the target altitude is held.
    fn step_vertical(&mut self, altitude_m: f64, dt: f64) -> bool {
        let delta = altitude_m - self.position.altitude_m;
        let rate = if delta >= 0.0 {
            self.config.climb_rate_m_s
        } else {
            self.config.descent_rate_m_s
        };
        let step = rate * dt;
        if delta.abs() <= step {
            self.position.altitude_m = altitude_m;
            true
        } else {
            self.position.altitude_m += step.copysign(delta);
            false
        }
    }

    /// Returns true once the horizontal target is reached.
    fn step_horizontal(&mut self, target: GeoPoint, speed_m_s: f64, dt: f64) -> bool {
        let remaining = distance_m(self.position, target);
        if remaining <= f64::EPSILON {
            return true;
        }
        self.heading_deg = bearing_deg(self.position, target);
        let step = speed_m_s * dt;
        if remaining <= step {
            self.position.latitude_deg = target.latitude_deg;
            self.position.longitude_deg = target.longitude_deg;
            self.ground_speed_m_s = remaining / dt;
            return true;
        }
        let (north, east) = local_delta(self.position, target);
        let scale = step / north.hypot(east);
        self.position = offset(self.position, north * scale, east * scale);
        self.ground_speed_m_s = speed_m_s;
        false
    }

    fn touch_down(&mut self) {
        self.position.altitude_m = 0.0;
        self.landed_state = LandedState::OnGround;
        self.mode = FlightMode::Ready;
        self.motion = Motion::Idle;
        self.armed = false;
    }
}

/// Cheap to clone; clones share the same vehicle.
#[derive(Debug, Clone)]
pub struct SimulatedVehicle {
    inner: Arc<Mutex<SimState>>,
}

impl SimulatedVehicle {
    pub fn new(config: SimConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SimState::new(config))),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn home(&self) -> GeoPoint {
        self.state().config.home
    }

    /// Forces the health predicate; `None` restores the start-up timer.
    pub fn set_health(&self, healthy: Option<bool>) {
        self.state().health_override = healthy;
    }

    /// Makes every subsequent call fail with `ConnectionLost`.
    pub fn set_link_lost(&self, lost: bool) {
        self.state().link_lost = lost;
    }

    /// Makes the named command (`"arm"`, `"takeoff"`, `"goto_location"`, ...)
    /// fail with `Rejected`.
    pub fn reject(&self, command: &'static str) {
        self.state().rejected.insert(command);
    }

    pub fn commands(&self) -> Vec<SimCommand> {
        self.state().commands.clone()
    }

    pub fn was_armed(&self) -> bool {
        self.state()
            .commands
            .iter()
            .any(|command| matches!(command, SimCommand::Arm))
    }

    pub fn goto_targets(&self) -> Vec<GeoPoint> {
        self.state()
            .commands
            .iter()
            .filter_map(|command| match command {
                SimCommand::Goto { target, .. } => Some(*target),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl VehicleHandle for SimulatedVehicle {
    async fn armed(&self) -> Result<bool, VehicleError> {
        let mut state = self.state();
        state.check_link()?;
        state.advance();
        Ok(state.armed)
    }

    async fn health_ok(&self) -> Result<bool, VehicleError> {
        let mut state = self.state();
        state.check_link()?;
        state.advance();
        Ok(state.health_ok())
    }

    async fn position(&self) -> Result<GeoPoint, VehicleError> {
        let mut state = self.state();
        state.check_link()?;
        state.advance();
        Ok(state.position)
    }

    async fn landed_state(&self) -> Result<LandedState, VehicleError> {
        let mut state = self.state();
        state.check_link()?;
        state.advance();
        Ok(state.landed_state)
    }

    async fn telemetry(&self) -> Result<TelemetrySnapshot, VehicleError> {
        let mut state = self.state();
        state.check_link()?;
        state.advance();
        Ok(TelemetrySnapshot {
            armed: state.armed,
            health_ok: state.health_ok(),
            position: state.position,
            home: state.config.home,
            landed_state: state.landed_state,
            flight_mode: state.mode,
            battery_percent: state.battery_percent,
            gps_satellites: state.config.gps_satellites,
            heading_deg: state.heading_deg,
            ground_speed_m_s: state.ground_speed_m_s,
        })
    }

    async fn arm(&self) -> Result<(), VehicleError> {
        let mut state = self.state();
        state.command(SimCommand::Arm, "arm")?;
        if state.armed {
            return Ok(());
        }
        if !state.health_ok() {
            return Err(VehicleError::rejected("arm", "pre-arm checks failing"));
        }
        state.armed = true;
        Ok(())
    }

    async fn set_takeoff_altitude(&self, altitude_m: f64) -> Result<(), VehicleError> {
        let mut state = self.state();
        state.command(
            SimCommand::SetTakeoffAltitude(altitude_m),
            "set_takeoff_altitude",
        )?;
        if !(altitude_m.is_finite() && altitude_m > 0.0) {
            return Err(VehicleError::rejected(
                "set_takeoff_altitude",
                format!("altitude {altitude_m} out of range"),
            ));
        }
        state.takeoff_altitude_m = altitude_m;
        Ok(())
    }

    async fn takeoff(&self) -> Result<(), VehicleError> {
        let mut state = self.state();
        state.command(SimCommand::Takeoff, "takeoff")?;
        if !state.armed {
            return Err(VehicleError::rejected("takeoff", "vehicle not armed"));
        }
        if state.in_air() {
            return Ok(());
        }
        state.landed_state = LandedState::TakingOff;
        state.mode = FlightMode::Takeoff;
        state.motion = Motion::Climb {
            altitude_m: state.takeoff_altitude_m,
        };
        Ok(())
    }

    async fn goto_location(
        &self,
        target: GeoPoint,
        speed_m_s: Option<f64>,
    ) -> Result<(), VehicleError> {
        let mut state = self.state();
        state.command(SimCommand::Goto { target, speed_m_s }, "goto_location")?;
        if !state.armed || !state.in_air() {
            return Err(VehicleError::rejected("goto_location", "vehicle not airborne"));
        }
        if !target.is_finite() {
            return Err(VehicleError::rejected("goto_location", "target not finite"));
        }
        let speed = speed_m_s
            .filter(|speed| *speed > 0.0)
            .unwrap_or(state.cruise_speed_m_s)
            .min(state.config.max_speed_m_s);
        state.landed_state = LandedState::InAir;
        state.mode = FlightMode::Guided;
        state.motion = Motion::Goto {
            target,
            speed_m_s: speed,
        };
        Ok(())
    }

    async fn set_max_speed(&self, speed_m_s: f64) -> Result<(), VehicleError> {
        let mut state = self.state();
        state.command(SimCommand::SetMaxSpeed(speed_m_s), "set_max_speed")?;
        if !(speed_m_s.is_finite() && speed_m_s > 0.0) {
            return Err(VehicleError::rejected(
                "set_max_speed",
                format!("speed {speed_m_s} out of range"),
            ));
        }
        state.cruise_speed_m_s = speed_m_s.min(state.config.max_speed_m_s);
        Ok(())
    }

    async fn return_to_launch(&self) -> Result<(), VehicleError> {
        let mut state = self.state();
        state.command(SimCommand::ReturnToLaunch, "return_to_launch")?;
        if !state.in_air() || state.mode == FlightMode::ReturnToLaunch {
            return Ok(());
        }
        state.mode = FlightMode::ReturnToLaunch;
        state.motion = Motion::RtlClimb;
        Ok(())
    }

    async fn land(&self) -> Result<(), VehicleError> {
        let mut state = self.state();
        state.command(SimCommand::Land, "land")?;
        if !state.in_air() {
            state.armed = false;
            return Ok(());
        }
        state.mode = FlightMode::Land;
        state.landed_state = LandedState::Landing;
        state.motion = Motion::Descend;
        Ok(())
    }

    async fn close(&self) -> Result<(), VehicleError> {
        let mut state = self.state();
        if state.closed {
            return Ok(());
        }
        state.commands.push(SimCommand::Close);
        state.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    fn fast_config() -> SimConfig {
        SimConfig {
            ready_after: Some(Duration::from_secs(1)),
            ..SimConfig::default()
        }
    }

    async fn airborne(vehicle: &SimulatedVehicle, altitude_m: f64) {
        advance(Duration::from_secs(2)).await;
        vehicle.set_takeoff_altitude(altitude_m).await.unwrap();
        vehicle.arm().await.unwrap();
        vehicle.takeoff().await.unwrap();
        advance(Duration::from_secs(30)).await;
        assert_eq!(vehicle.landed_state().await.unwrap(), LandedState::InAir);
    }

    #[tokio::test(start_paused = true)]
    async fn health_passes_after_start_up_delay() {
        let vehicle = SimulatedVehicle::new(fast_config());
        assert!(!vehicle.health_ok().await.unwrap());
        advance(Duration::from_millis(1_100)).await;
        assert!(vehicle.health_ok().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn arm_refused_until_healthy_then_idempotent() {
        let vehicle = SimulatedVehicle::new(fast_config());
        let err = vehicle.arm().await.unwrap_err();
        assert!(matches!(err, VehicleError::Rejected { command: "arm", .. }));

        advance(Duration::from_secs(2)).await;
        vehicle.arm().await.unwrap();
        vehicle.arm().await.unwrap();
        assert!(vehicle.armed().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn takeoff_climbs_to_requested_altitude() {
        let vehicle = SimulatedVehicle::new(fast_config());
        airborne(&vehicle, 10.0).await;
        let position = vehicle.position().await.unwrap();
        assert!((position.altitude_m - 10.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn goto_moves_at_commanded_speed() {
        let vehicle = SimulatedVehicle::new(fast_config());
        airborne(&vehicle, 10.0).await;
        let home = vehicle.home();
        let target = offset(home, 100.0, 0.0).with_altitude(10.0);
        vehicle.goto_location(target, Some(5.0)).await.unwrap();

        advance(Duration::from_secs(10)).await;
        let halfway = vehicle.position().await.unwrap();
        assert!((distance_m(home, halfway) - 50.0).abs() < 0.5);

        advance(Duration::from_secs(15)).await;
        let arrived = vehicle.position().await.unwrap();
        assert!(distance_m(arrived, target) < 0.01);
    }

    #[tokio::test(start_paused = true)]
    async fn return_to_launch_lands_at_home_and_disarms() {
        let vehicle = SimulatedVehicle::new(fast_config());
        airborne(&vehicle, 10.0).await;
        let home = vehicle.home();
        vehicle
            .goto_location(offset(home, 0.0, 40.0).with_altitude(10.0), None)
            .await
            .unwrap();
        advance(Duration::from_secs(5)).await;
        let _ = vehicle.position().await.unwrap();
        advance(Duration::from_secs(20)).await;
        let _ = vehicle.position().await.unwrap();

        vehicle.return_to_launch().await.unwrap();
        for _ in 0..120 {
            advance(Duration::from_secs(1)).await;
            if vehicle.landed_state().await.unwrap() == LandedState::OnGround {
                break;
            }
        }
        assert_eq!(vehicle.landed_state().await.unwrap(), LandedState::OnGround);
        assert!(!vehicle.armed().await.unwrap());
        assert!(distance_m(vehicle.position().await.unwrap(), home) < 0.01);
    }

    #[tokio::test(start_paused = true)]
    async fn land_on_ground_is_a_no_op() {
        let vehicle = SimulatedVehicle::new(fast_config());
        vehicle.land().await.unwrap();
        assert_eq!(vehicle.landed_state().await.unwrap(), LandedState::OnGround);
    }

    #[tokio::test(start_paused = true)]
    async fn lost_link_fails_every_call() {
        let vehicle = SimulatedVehicle::new(fast_config());
        vehicle.set_link_lost(true);
        assert_eq!(
            vehicle.health_ok().await.unwrap_err(),
            VehicleError::ConnectionLost
        );
        assert_eq!(vehicle.arm().await.unwrap_err(), VehicleError::ConnectionLost);
        assert!(vehicle.commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_commands_are_logged() {
        let vehicle = SimulatedVehicle::new(fast_config());
        advance(Duration::from_secs(2)).await;
        vehicle.reject("arm");
        assert!(vehicle.arm().await.is_err());
        assert!(vehicle.was_armed());
        assert!(!vehicle.armed().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn closed_vehicle_refuses_calls() {
        let vehicle = SimulatedVehicle::new(fast_config());
        vehicle.close().await.unwrap();
        vehicle.close().await.unwrap();
        assert_eq!(vehicle.armed().await.unwrap_err(), VehicleError::Closed);
    }
}
