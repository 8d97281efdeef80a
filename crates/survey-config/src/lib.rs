use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::{env, fmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Sitl,
    Bench,
    Field,
}

impl Environment {
    pub fn from_env(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "sitl" | "sim" | "simulation" => Self::Sitl,
            "bench" | "hil" => Self::Bench,
            "field" | "live" | "flight" => Self::Field,
            _ => Self::Sitl,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Self::Sitl => "sitl",
            Self::Bench => "bench",
            Self::Field => "field",
        };
        write!(f, "{}", value)
    }
}

/// Where the vehicle is reached. Only `Sim` has an in-tree transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleLink {
    Sim,
    Udp { addr: String },
    Tcp { addr: String },
    Serial { path: String, baud: u32 },
}

impl VehicleLink {
    pub const DEFAULT_BAUD: u32 = 57_600;

    /// Parses `sim://`, `udp://host:port`, `tcp://host:port` and
    /// `serial:///dev/ttyX[:baud]`. A bare `sim` is accepted too.
    pub fn parse(address: &str) -> Result<Self, String> {
        let trimmed = address.trim();
        if trimmed.is_empty() {
            return Err("vehicle address is empty".to_string());
        }
        if trimmed.eq_ignore_ascii_case("sim") {
            return Ok(Self::Sim);
        }
        let Some((scheme, rest)) = trimmed.split_once("://") else {
            return Err(format!("vehicle address `{trimmed}` has no scheme"));
        };
        match scheme.to_ascii_lowercase().as_str() {
            "sim" => Ok(Self::Sim),
            "udp" | "udpin" | "udpout" => Ok(Self::Udp {
                addr: host_port(rest, 14540),
            }),
            "tcp" => Ok(Self::Tcp {
                addr: host_port(rest, 5760),
            }),
            "serial" => {
                if rest.is_empty() {
                    return Err("serial address needs a device path".to_string());
                }
                match rest.rsplit_once(':') {
                    Some((path, baud)) => {
                        let baud = baud
                            .parse::<u32>()
                            .map_err(|_| format!("invalid baud rate `{baud}`"))?;
                        Ok(Self::Serial {
                            path: path.to_string(),
                            baud,
                        })
                    }
                    None => Ok(Self::Serial {
                        path: rest.to_string(),
                        baud: Self::DEFAULT_BAUD,
                    }),
                }
            }
            other => Err(format!("unsupported vehicle link scheme `{other}`")),
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Sim => "sim",
            Self::Udp { .. } => "udp",
            Self::Tcp { .. } => "tcp",
            Self::Serial { .. } => "serial",
        }
    }
}

impl fmt::Display for VehicleLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sim => write!(f, "sim://"),
            Self::Udp { addr } => write!(f, "udp://{addr}"),
            Self::Tcp { addr } => write!(f, "tcp://{addr}"),
            Self::Serial { path, baud } => write!(f, "serial://{path}:{baud}"),
        }
    }
}

fn host_port(rest: &str, default_port: u16) -> String {
    if rest.is_empty() || rest == ":" {
        return format!("0.0.0.0:{default_port}");
    }
    if let Some(port) = rest.strip_prefix(':') {
        return format!("0.0.0.0:{port}");
    }
    if rest.contains(':') {
        rest.to_string()
    } else {
        format!("{rest}:{default_port}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightConfig {
    pub service_name: String,
    pub environment: Environment,
    pub log_level: String,
    pub metrics_addr: Option<String>,
    pub connect: String,
    pub poll_interval_ms: u64,
    pub prearm_timeout_ms: u64,
    pub arm_timeout_ms: u64,
    pub takeoff_timeout_ms: u64,
    pub waypoint_timeout_ms: u64,
    pub landing_timeout_ms: u64,
    pub arrival_tolerance_m: f64,
    pub takeoff_altitude_ratio: f64,
    pub cruise_speed_m_s: f64,
    pub overlap_fraction: f64,
}

impl FlightConfig {
    pub fn from_env(default_service_name: &str) -> Self {
        Self::from_source(default_service_name, |key| env::var(key).ok())
    }

    /// Same as [`FlightConfig::from_env`] but reads from an explicit map.
    pub fn from_map(default_service_name: &str, values: &HashMap<String, String>) -> Self {
        Self::from_source(default_service_name, |key| values.get(key).cloned())
    }

    fn from_source<F>(default_service_name: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let number_u64 = |key: &str, default: u64| {
            lookup(key)
                .and_then(|value| value.trim().parse::<u64>().ok())
                .unwrap_or(default)
        };
        let number_f64 = |key: &str, default: f64| {
            lookup(key)
                .and_then(|value| value.trim().parse::<f64>().ok())
                .filter(|value| value.is_finite())
                .unwrap_or(default)
        };

        Self {
            service_name: string("SURVEY_SERVICE_NAME", default_service_name),
            environment: Environment::from_env(&string("SURVEY_ENV", "sitl")),
            log_level: string("SURVEY_LOG_LEVEL", "info"),
            metrics_addr: lookup("SURVEY_METRICS_ADDR").filter(|value| !value.trim().is_empty()),
            connect: string("SURVEY_CONNECT", "sim://"),
            poll_interval_ms: number_u64("SURVEY_POLL_INTERVAL_MS", 1_000),
            prearm_timeout_ms: number_u64("SURVEY_PREARM_TIMEOUT_MS", 5_000),
            arm_timeout_ms: number_u64("SURVEY_ARM_TIMEOUT_MS", 5_000),
            takeoff_timeout_ms: number_u64("SURVEY_TAKEOFF_TIMEOUT_MS", 30_000),
            waypoint_timeout_ms: number_u64("SURVEY_WAYPOINT_TIMEOUT_MS", 120_000),
            landing_timeout_ms: number_u64("SURVEY_LANDING_TIMEOUT_MS", 180_000),
            arrival_tolerance_m: number_f64("SURVEY_ARRIVAL_TOLERANCE_M", 2.0),
            takeoff_altitude_ratio: number_f64("SURVEY_TAKEOFF_ALTITUDE_RATIO", 0.95),
            cruise_speed_m_s: number_f64("SURVEY_CRUISE_SPEED_M_S", 3.0),
            overlap_fraction: number_f64("SURVEY_OVERLAP_FRACTION", 0.2),
        }
    }

    pub fn vehicle_link(&self) -> Result<VehicleLink, String> {
        VehicleLink::parse(&self.connect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_environment() {
        let config = FlightConfig::from_map("survey-cli", &HashMap::new());
        assert_eq!(config.service_name, "survey-cli");
        assert_eq!(config.environment, Environment::Sitl);
        assert_eq!(config.connect, "sim://");
        assert_eq!(config.poll_interval_ms, 1_000);
        assert_eq!(config.prearm_timeout_ms, 5_000);
        assert_eq!(config.overlap_fraction, 0.2);
        assert!(config.metrics_addr.is_none());
    }

    #[test]
    fn overrides_and_bad_numbers() {
        let values = HashMap::from([
            ("SURVEY_ENV".to_string(), "Field".to_string()),
            ("SURVEY_POLL_INTERVAL_MS".to_string(), "250".to_string()),
            ("SURVEY_ARM_TIMEOUT_MS".to_string(), "soon".to_string()),
            ("SURVEY_CRUISE_SPEED_M_S".to_string(), "NaN".to_string()),
            ("SURVEY_METRICS_ADDR".to_string(), "  ".to_string()),
        ]);
        let config = FlightConfig::from_map("survey-cli", &values);
        assert_eq!(config.environment, Environment::Field);
        assert_eq!(config.poll_interval_ms, 250);
        assert_eq!(config.arm_timeout_ms, 5_000);
        assert_eq!(config.cruise_speed_m_s, 3.0);
        assert!(config.metrics_addr.is_none());
    }

    #[test]
    fn parses_vehicle_links() {
        assert_eq!(VehicleLink::parse("sim://").unwrap(), VehicleLink::Sim);
        assert_eq!(VehicleLink::parse("SIM").unwrap(), VehicleLink::Sim);
        assert_eq!(
            VehicleLink::parse("udp://:14540").unwrap(),
            VehicleLink::Udp {
                addr: "0.0.0.0:14540".to_string()
            }
        );
        assert_eq!(
            VehicleLink::parse("tcp://127.0.0.1").unwrap(),
            VehicleLink::Tcp {
                addr: "127.0.0.1:5760".to_string()
            }
        );
        assert_eq!(
            VehicleLink::parse("serial:///dev/ttyACM0:921600").unwrap(),
            VehicleLink::Serial {
                path: "/dev/ttyACM0".to_string(),
                baud: 921_600
            }
        );
        assert_eq!(
            VehicleLink::parse("serial:///dev/ttyUSB0").unwrap(),
            VehicleLink::Serial {
                path: "/dev/ttyUSB0".to_string(),
                baud: VehicleLink::DEFAULT_BAUD
            }
        );
    }

    #[test]
    fn rejects_malformed_links() {
        assert!(VehicleLink::parse("").is_err());
        assert!(VehicleLink::parse("localhost:14540").is_err());
        assert!(VehicleLink::parse("ws://localhost").is_err());
        assert!(VehicleLink::parse("serial://").is_err());
        assert!(VehicleLink::parse("serial:///dev/ttyUSB0:fast").is_err());
    }
}
