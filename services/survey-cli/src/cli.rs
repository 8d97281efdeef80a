use clap::{Args, Parser, Subcommand, ValueEnum};
use std::str::FromStr;
use survey_core::{GeoPoint, SurveyArea};
use survey_planner::{CoverageWaypointPlanner, FixedWaypoints, HoldPosition, WaypointStrategy};

#[derive(Debug, Parser)]
#[command(name = "survey-cli")]
#[command(version, about = "Fly survey missions against a vehicle link", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Vehicle link: sim://, udp://host:port, tcp://host:port, serial:///dev/ttyX[:baud]
    #[arg(long, global = true, env = "SURVEY_CONNECT")]
    pub connect: Option<String>,

    #[arg(short, long, global = true, value_enum, default_value = "text")]
    pub output: OutputFormat,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Wait for pre-arm health and print one telemetry snapshot
    Status,

    /// Take off, hold above home, then return
    ArmAndHold {
        #[arg(long, default_value_t = 2.5)]
        altitude: f64,

        #[arg(long, default_value_t = 10)]
        hold_secs: u64,
    },

    /// Fly to one or more absolute points in order
    Goto(GotoArgs),

    /// Cover a rectangle north-east of home with back-and-forth lanes
    Survey(SurveyArgs),
}

#[derive(Debug, Args)]
pub struct GotoArgs {
    /// Altitude for takeoff and for points given without one
    #[arg(long, default_value_t = 10.0)]
    pub altitude: f64,

    /// lat,lon[,alt]; repeat for more points
    #[arg(long = "point", required = true)]
    pub points: Vec<PointArg>,

    /// Ground speed for every leg, m/s
    #[arg(long)]
    pub speed: Option<f64>,

    #[arg(long, default_value_t = 0)]
    pub hold_secs: u64,
}

#[derive(Debug, Args)]
pub struct SurveyArgs {
    #[arg(long, default_value_t = 10.0)]
    pub altitude: f64,

    /// East extent of the area, m
    #[arg(long, default_value_t = 20.0)]
    pub width: f64,

    /// North extent of the area, m
    #[arg(long, default_value_t = 60.0)]
    pub length: f64,

    /// Camera horizontal field of view, degrees
    #[arg(long, default_value_t = 90.0)]
    pub fov: f64,

    /// Path length budget from home, m
    #[arg(long, default_value_t = 1_000.0)]
    pub max_range: f64,

    /// Side overlap between lanes in [0, 1); defaults to SURVEY_OVERLAP_FRACTION
    #[arg(long)]
    pub overlap: Option<f64>,

    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub offset_north: f64,

    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub offset_east: f64,

    /// Land in place at the end instead of returning to launch
    #[arg(long)]
    pub land: bool,
}

impl GotoArgs {
    pub fn strategy(&self) -> FixedWaypoints {
        let points = self
            .points
            .iter()
            .map(|point| point.resolve(self.altitude))
            .collect();
        let strategy = FixedWaypoints::new(points, self.altitude);
        match self.speed {
            Some(speed) => strategy.with_speed(speed),
            None => strategy,
        }
    }
}

impl SurveyArgs {
    pub fn strategy(&self, default_overlap: f64) -> CoverageWaypointPlanner {
        let area = SurveyArea::new(self.width, self.length)
            .with_origin(self.offset_north, self.offset_east);
        CoverageWaypointPlanner::new(area, self.fov, self.altitude, self.max_range)
            .with_overlap(self.overlap.unwrap_or(default_overlap))
    }
}

pub fn hold_strategy(altitude: f64) -> Box<dyn WaypointStrategy> {
    Box::new(HoldPosition {
        altitude_m: altitude,
    })
}

/// A `lat,lon[,alt]` command-line point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointArg {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_m: Option<f64>,
}

impl PointArg {
    fn resolve(self, default_altitude_m: f64) -> GeoPoint {
        GeoPoint::new(
            self.latitude_deg,
            self.longitude_deg,
            self.altitude_m.unwrap_or(default_altitude_m),
        )
    }
}

impl FromStr for PointArg {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = value.split(',').map(str::trim).collect();
        if !(2..=3).contains(&parts.len()) {
            return Err(format!("expected lat,lon[,alt], got `{value}`"));
        }
        let number = |part: &str| {
            part.parse::<f64>()
                .map_err(|_| format!("`{part}` is not a number"))
        };
        Ok(Self {
            latitude_deg: number(parts[0])?,
            longitude_deg: number(parts[1])?,
            altitude_m: parts.get(2).map(|part| number(part)).transpose()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_points_with_and_without_altitude() {
        let point: PointArg = "47.39,8.54".parse().unwrap();
        assert_eq!(point.altitude_m, None);
        assert_eq!(point.resolve(12.0), GeoPoint::new(47.39, 8.54, 12.0));

        let point: PointArg = "-33.5, 151.2, 30".parse().unwrap();
        assert_eq!(point.altitude_m, Some(30.0));
        assert!("47.39".parse::<PointArg>().is_err());
        assert!("a,b".parse::<PointArg>().is_err());
        assert!("1,2,3,4".parse::<PointArg>().is_err());
    }

    #[test]
    fn survey_defaults_match_reference_mission() {
        let cli = Cli::try_parse_from(["survey-cli", "survey"]).unwrap();
        let Command::Survey(args) = cli.command else {
            panic!("expected survey");
        };
        assert_eq!(args.width, 20.0);
        assert_eq!(args.length, 60.0);
        assert_eq!(args.altitude, 10.0);
        assert!(!args.land);
        let planner = args.strategy(0.2);
        assert_eq!(planner.overlap_fraction, 0.2);
        assert_eq!(cli.output, OutputFormat::Text);
    }

    #[test]
    fn goto_collects_repeated_points() {
        let cli = Cli::try_parse_from([
            "survey-cli",
            "--output",
            "json",
            "goto",
            "--point",
            "47.0,8.0",
            "--point",
            "47.001,8.0,15",
            "--speed",
            "4",
        ])
        .unwrap();
        assert_eq!(cli.output, OutputFormat::Json);
        let Command::Goto(args) = cli.command else {
            panic!("expected goto");
        };
        let strategy = args.strategy();
        assert_eq!(strategy.points.len(), 2);
        assert_eq!(strategy.points[0].altitude_m, 10.0);
        assert_eq!(strategy.points[1].altitude_m, 15.0);
        assert_eq!(strategy.speed_m_s, Some(4.0));
    }

    #[test]
    fn goto_requires_a_point() {
        assert!(Cli::try_parse_from(["survey-cli", "goto"]).is_err());
    }

    #[test]
    fn survey_accepts_negative_offsets() {
        let cli =
            Cli::try_parse_from(["survey-cli", "survey", "--offset-east", "-5", "--land"]).unwrap();
        let Command::Survey(args) = cli.command else {
            panic!("expected survey");
        };
        assert_eq!(args.offset_east, -5.0);
        assert!(args.land);
    }
}
