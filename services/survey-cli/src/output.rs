use crate::cli::OutputFormat;
use serde::Serialize;
use survey_core::MissionOutcome;
use survey_mission::MissionReport;
use survey_vehicle::TelemetrySnapshot;

pub const EXIT_COMPLETED: u8 = 0;
pub const EXIT_SETUP_FAILED: u8 = 1;
pub const EXIT_ABORTED: u8 = 2;
pub const EXIT_RANGE_LIMITED: u8 = 3;

pub fn exit_status(outcome: &MissionOutcome) -> u8 {
    match outcome {
        MissionOutcome::Completed => EXIT_COMPLETED,
        MissionOutcome::Aborted(_) => EXIT_ABORTED,
        MissionOutcome::RangeLimited => EXIT_RANGE_LIMITED,
    }
}

pub fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn report_text(report: &MissionReport) -> String {
    let mut lines = vec![
        format!(
            "mission {} ({}): {}",
            report.mission_id, report.strategy, report.outcome
        ),
        format!("  final state   {}", report.final_state),
        format!(
            "  waypoints     {}/{}",
            report.waypoints_reached, report.waypoints_total
        ),
        format!("  path length   {:.1} m", report.path_length_m),
    ];
    if let Some(home) = report.home {
        lines.push(format!("  home          {home}"));
    }
    if report.range_limited {
        lines.push("  range budget cut the survey short".to_string());
    }
    lines.join("\n")
}

pub fn telemetry_text(snapshot: &TelemetrySnapshot, ready: bool) -> String {
    [
        format!("ready         {ready}"),
        format!("armed         {}", snapshot.armed),
        format!("position      {}", snapshot.position),
        format!("home          {}", snapshot.home),
        format!("landed state  {}", snapshot.landed_state),
        format!("flight mode   {}", snapshot.flight_mode),
        format!("battery       {:.0}%", snapshot.battery_percent),
        format!("satellites    {}", snapshot.gps_satellites),
        format!("heading       {:.0} deg", snapshot.heading_deg),
        format!("ground speed  {:.1} m/s", snapshot.ground_speed_m_s),
    ]
    .join("\n")
}

pub fn emit_report(format: OutputFormat, report: &MissionReport) -> Result<(), serde_json::Error> {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Text => {
            println!("{}", report_text(report));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use survey_core::{GeoPoint, MissionError, MissionId, MissionState};

    fn report(outcome: MissionOutcome) -> MissionReport {
        MissionReport {
            mission_id: MissionId::new(),
            strategy: "survey".to_string(),
            outcome,
            final_state: MissionState::Landed,
            home: Some(GeoPoint::new(47.0, 8.0, 0.0)),
            waypoints_total: 4,
            waypoints_reached: 3,
            range_limited: true,
            path_length_m: 76.0,
            transitions: Vec::new(),
            started_at_ms: 0,
            finished_at_ms: 1,
        }
    }

    #[test]
    fn outcomes_map_to_distinct_exit_codes() {
        assert_eq!(exit_status(&MissionOutcome::Completed), 0);
        assert_eq!(
            exit_status(&MissionOutcome::Aborted(MissionError::cancelled("ctrl-c"))),
            2
        );
        assert_eq!(exit_status(&MissionOutcome::RangeLimited), 3);
    }

    #[test]
    fn text_report_lists_progress() {
        let text = report_text(&report(MissionOutcome::RangeLimited));
        assert!(text.contains("(survey): range_limited"));
        assert!(text.contains("waypoints     3/4"));
        assert!(text.contains("76.0 m"));
        assert!(text.contains("range budget"));
    }
}
