//! Vehicle collaborator contract.
//!
//! The mission layer talks to a vehicle only through [`VehicleHandle`].
//! Commands resolve once the autopilot acknowledges them; their effect is
//! confirmed separately by polling telemetry. Repeating a command whose
//! effect already holds (arming an armed vehicle, landing a landed one) must
//! succeed without doing anything.

mod sim;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use survey_config::VehicleLink;
use survey_core::LandedState;
use survey_geo::GeoPoint;
use thiserror::Error;

pub use sim::{SimCommand, SimConfig, SimulatedVehicle};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum VehicleError {
    #[error("vehicle link lost")]
    ConnectionLost,
    #[error("vehicle rejected {command}: {reason}")]
    Rejected {
        command: &'static str,
        reason: String,
    },
    #[error("no transport for link {0}")]
    UnsupportedLink(String),
    #[error("invalid vehicle address: {0}")]
    InvalidAddress(String),
    #[error("vehicle connection closed")]
    Closed,
}

impl VehicleError {
    pub fn rejected(command: &'static str, reason: impl Into<String>) -> Self {
        Self::Rejected {
            command,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlightMode {
    #[default]
    Ready,
    Takeoff,
    Hold,
    Guided,
    ReturnToLaunch,
    Land,
}

impl fmt::Display for FlightMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Self::Ready => "ready",
            Self::Takeoff => "takeoff",
            Self::Hold => "hold",
            Self::Guided => "guided",
            Self::ReturnToLaunch => "return_to_launch",
            Self::Land => "land",
        };
        f.write_str(value)
    }
}

/// Everything a status query reports in one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub armed: bool,
    pub health_ok: bool,
    pub position: GeoPoint,
    pub home: GeoPoint,
    pub landed_state: LandedState,
    pub flight_mode: FlightMode,
    pub battery_percent: f64,
    pub gps_satellites: u8,
    pub heading_deg: f64,
    pub ground_speed_m_s: f64,
}

#[async_trait]
pub trait VehicleHandle: Send + Sync {
    async fn armed(&self) -> Result<bool, VehicleError>;
    async fn health_ok(&self) -> Result<bool, VehicleError>;
    /// Current fix; altitude is relative to home.
    async fn position(&self) -> Result<GeoPoint, VehicleError>;
    async fn landed_state(&self) -> Result<LandedState, VehicleError>;
    async fn telemetry(&self) -> Result<TelemetrySnapshot, VehicleError>;

    async fn arm(&self) -> Result<(), VehicleError>;
    async fn set_takeoff_altitude(&self, altitude_m: f64) -> Result<(), VehicleError>;
    async fn takeoff(&self) -> Result<(), VehicleError>;
    async fn goto_location(
        &self,
        target: GeoPoint,
        speed_m_s: Option<f64>,
    ) -> Result<(), VehicleError>;
    async fn set_max_speed(&self, speed_m_s: f64) -> Result<(), VehicleError>;
    async fn return_to_launch(&self) -> Result<(), VehicleError>;
    async fn land(&self) -> Result<(), VehicleError>;
    async fn close(&self) -> Result<(), VehicleError>;
}

/// Opens a vehicle connection for `address`.
///
/// `sim://` starts an in-process [`SimulatedVehicle`]. MAVLink links are
/// recognised but their transports live outside this workspace.
pub async fn connect(address: &str) -> Result<Arc<dyn VehicleHandle>, VehicleError> {
    let link = VehicleLink::parse(address).map_err(VehicleError::InvalidAddress)?;
    match link {
        VehicleLink::Sim => {
            let vehicle = SimulatedVehicle::new(SimConfig::default());
            tracing::info!(home = %vehicle.home(), "Simulated vehicle started");
            Ok(Arc::new(vehicle))
        }
        other => Err(VehicleError::UnsupportedLink(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_starts_simulator() {
        let vehicle = connect("sim://").await.unwrap();
        assert!(!vehicle.armed().await.unwrap());
        assert_eq!(
            vehicle.landed_state().await.unwrap(),
            LandedState::OnGround
        );
    }

    #[tokio::test]
    async fn connect_rejects_external_transports() {
        let err = connect("udp://:14540").await.err().unwrap();
        assert_eq!(
            err,
            VehicleError::UnsupportedLink("udp://0.0.0.0:14540".to_string())
        );
    }

    #[tokio::test]
    async fn connect_rejects_garbage() {
        let err = connect("not an address").await.err().unwrap();
        assert!(matches!(err, VehicleError::InvalidAddress(_)));
    }

    #[test]
    fn rejected_error_message() {
        let err = VehicleError::rejected("arm", "pre-arm checks failing");
        assert_eq!(err.to_string(), "vehicle rejected arm: pre-arm checks failing");
    }
}
