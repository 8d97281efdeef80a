//! Logging and metrics for survey flights.
//!
//! Logs go through a `tracing` fmt subscriber. Metrics are exported over a
//! Prometheus listener only when `SURVEY_METRICS_ADDR` is set; every series
//! carries the flight environment and the vehicle link kind as labels.

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::fmt;
use std::net::SocketAddr;
use survey_config::{Environment, FlightConfig};
use tracing_subscriber::EnvFilter;

pub const STATE_TRANSITIONS_TOTAL: &str = "survey_state_transitions_total";
pub const WAYPOINTS_REACHED_TOTAL: &str = "survey_waypoints_reached_total";
pub const MISSIONS_TOTAL: &str = "survey_missions_total";
pub const MISSION_STATE: &str = "survey_mission_state";

/// Outcome labels registered on `MISSIONS_TOTAL` before the first flight.
pub const OUTCOME_LABELS: [&str; 3] = ["completed", "aborted", "range_limited"];

#[derive(Debug, Clone)]
pub struct TelemetrySettings {
    pub service_name: String,
    pub environment: Environment,
    pub log_level: String,
    pub metrics_addr: Option<String>,
    /// Link scheme (`sim`, `udp`, ...), `unknown` if the address is invalid.
    pub link_kind: &'static str,
}

impl TelemetrySettings {
    pub fn from_flight_config(config: &FlightConfig) -> Self {
        Self {
            service_name: config.service_name.clone(),
            environment: config.environment,
            log_level: config.log_level.clone(),
            metrics_addr: config.metrics_addr.clone(),
            link_kind: config
                .vehicle_link()
                .map_or("unknown", |link| link.scheme()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricsExport {
    Disabled,
    Prometheus(SocketAddr),
    /// Requested, but the listener could not be set up.
    Unavailable(String),
}

impl MetricsExport {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Prometheus(_))
    }
}

impl fmt::Display for MetricsExport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "disabled"),
            Self::Prometheus(addr) => write!(f, "prometheus on {addr}"),
            Self::Unavailable(reason) => write!(f, "unavailable ({reason})"),
        }
    }
}

/// What `init` actually set up.
#[derive(Debug, Clone)]
pub struct FlightTelemetry {
    pub service_name: String,
    pub environment: Environment,
    pub link_kind: &'static str,
    pub metrics: MetricsExport,
}

pub fn init(settings: &TelemetrySettings) -> FlightTelemetry {
    let filter =
        EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    // Plain text in the field.
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_ansi(settings.environment != Environment::Field)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);

    let metrics = install_exporter(settings);
    if metrics.is_enabled() {
        describe_metrics();
        register_mission_series();
    }

    FlightTelemetry {
        service_name: settings.service_name.clone(),
        environment: settings.environment,
        link_kind: settings.link_kind,
        metrics,
    }
}

pub fn log_startup(telemetry: &FlightTelemetry, link: &str) {
    tracing::info!(
        service = %telemetry.service_name,
        environment = %telemetry.environment,
        link = %link,
        link_kind = telemetry.link_kind,
        metrics = %telemetry.metrics,
        "Survey flight service starting"
    );
    if telemetry.environment == Environment::Field && telemetry.link_kind == "sim" {
        tracing::warn!("Field environment configured but connected to the simulator");
    }
}

fn metrics_listener(addr: Option<&str>) -> Result<Option<SocketAddr>, String> {
    addr.map(|addr| {
        addr.trim()
            .parse::<SocketAddr>()
            .map_err(|err| format!("invalid SURVEY_METRICS_ADDR `{addr}`: {err}"))
    })
    .transpose()
}

fn install_exporter(settings: &TelemetrySettings) -> MetricsExport {
    let addr = match metrics_listener(settings.metrics_addr.as_deref()) {
        Ok(Some(addr)) => addr,
        Ok(None) => return MetricsExport::Disabled,
        Err(reason) => {
            tracing::warn!(
                service = %settings.service_name,
                error = %reason,
                "Metrics export disabled"
            );
            return MetricsExport::Unavailable(reason);
        }
    };

    let builder = PrometheusBuilder::new()
        .with_http_listener(addr)
        .add_global_label("service", settings.service_name.clone())
        .add_global_label("environment", settings.environment.to_string())
        .add_global_label("link", settings.link_kind);

    match builder.install() {
        Ok(()) => MetricsExport::Prometheus(addr),
        Err(err) => {
            tracing::warn!(
                service = %settings.service_name,
                error = %err,
                "Failed to initialize Prometheus exporter"
            );
            MetricsExport::Unavailable(err.to_string())
        }
    }
}

fn describe_metrics() {
    describe_counter!(
        STATE_TRANSITIONS_TOTAL,
        "Mission state machine transitions by source and target state"
    );
    describe_counter!(
        WAYPOINTS_REACHED_TOTAL,
        "Waypoints confirmed reached by telemetry"
    );
    describe_counter!(MISSIONS_TOTAL, "Finished mission runs by outcome");
    describe_gauge!(MISSION_STATE, "Numeric code of the current mission state");
}

/// Exposes every outcome series at zero and the state gauge at idle, so a
/// scrape before the first flight already shows the full set.
fn register_mission_series() {
    gauge!(MISSION_STATE).set(0.0);
    counter!(WAYPOINTS_REACHED_TOTAL).absolute(0);
    for outcome in OUTCOME_LABELS {
        counter!(MISSIONS_TOTAL, "outcome" => outcome).absolute(0);
    }
}

/// Counts a state change and moves the state gauge. Without an installed
/// recorder these calls are no-ops.
pub fn record_transition(from: &'static str, to: &'static str, to_code: u8) {
    counter!(STATE_TRANSITIONS_TOTAL, "from" => from, "to" => to).increment(1);
    gauge!(MISSION_STATE).set(f64::from(to_code));
}

pub fn record_waypoint_reached() {
    counter!(WAYPOINTS_REACHED_TOTAL).increment(1);
}

pub fn record_outcome(outcome: &'static str) {
    counter!(MISSIONS_TOTAL, "outcome" => outcome).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn flight_config(values: &[(&str, &str)]) -> FlightConfig {
        let values: HashMap<String, String> = values
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        FlightConfig::from_map("survey-test", &values)
    }

    #[test]
    fn settings_carry_environment_and_link_kind() {
        let settings = TelemetrySettings::from_flight_config(&flight_config(&[
            ("SURVEY_ENV", "field"),
            ("SURVEY_CONNECT", "udp://:14550"),
            ("SURVEY_METRICS_ADDR", "127.0.0.1:9464"),
        ]));
        assert_eq!(settings.service_name, "survey-test");
        assert_eq!(settings.environment, Environment::Field);
        assert_eq!(settings.link_kind, "udp");
        assert_eq!(settings.metrics_addr.as_deref(), Some("127.0.0.1:9464"));

        let settings = TelemetrySettings::from_flight_config(&flight_config(&[(
            "SURVEY_CONNECT",
            "carrier pigeon",
        )]));
        assert_eq!(settings.link_kind, "unknown");
    }

    #[test]
    fn metrics_listener_requires_socket_address() {
        assert_eq!(metrics_listener(None), Ok(None));
        assert_eq!(
            metrics_listener(Some(" 127.0.0.1:9464 ")),
            Ok(Some(SocketAddr::from(([127, 0, 0, 1], 9464))))
        );
        let err = metrics_listener(Some("not-an-address")).unwrap_err();
        assert!(err.contains("SURVEY_METRICS_ADDR"));
    }

    #[test]
    fn exporter_not_installed_without_usable_address() {
        let mut settings = TelemetrySettings::from_flight_config(&flight_config(&[]));
        assert_eq!(install_exporter(&settings), MetricsExport::Disabled);

        settings.metrics_addr = Some("not-an-address".to_string());
        let export = install_exporter(&settings);
        assert!(matches!(export, MetricsExport::Unavailable(_)));
        assert!(!export.is_enabled());
        assert!(export.to_string().starts_with("unavailable"));
    }

    #[test]
    fn recording_without_recorder_is_harmless() {
        register_mission_series();
        record_transition("idle", "pre_arm_check", 1);
        record_waypoint_reached();
        record_outcome("completed");
    }
}
