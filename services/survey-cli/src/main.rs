mod cli;
mod output;

use clap::Parser;
use cli::{Cli, Command, OutputFormat};
use output::{EXIT_ABORTED, EXIT_COMPLETED, EXIT_SETUP_FAILED};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use survey_config::FlightConfig;
use survey_mission::{
    CancelToken, MissionSupervisor, PollError, PollPolicy, ReturnAction, SupervisorConfig,
    cancellation, poll_until,
};
use survey_observability::{TelemetrySettings, init, log_startup};
use survey_planner::WaypointStrategy;
use survey_vehicle::{VehicleError, VehicleHandle};
use thiserror::Error;

#[derive(Debug, Error)]
enum CliError {
    #[error("invalid vehicle link: {0}")]
    InvalidLink(String),
    #[error(transparent)]
    Vehicle(#[from] VehicleError),
    #[error("failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = FlightConfig::from_env("survey-cli");
    if let Some(connect) = cli.connect.clone() {
        config.connect = connect;
    }
    if cli.verbose {
        config.log_level = "debug".to_string();
    }

    let telemetry = init(&TelemetrySettings::from_flight_config(&config));
    log_startup(&telemetry, &config.connect);

    match run(cli, config).await {
        Ok(status) => ExitCode::from(status),
        Err(err) => {
            tracing::error!(error = %err, "survey-cli failed");
            eprintln!("error: {err}");
            ExitCode::from(EXIT_SETUP_FAILED)
        }
    }
}

async fn run(cli: Cli, config: FlightConfig) -> Result<u8, CliError> {
    config.vehicle_link().map_err(CliError::InvalidLink)?;

    let vehicle = survey_vehicle::connect(&config.connect).await?;
    let exit = match cli.command {
        Command::Status => status(vehicle.as_ref(), &config, cli.output).await,
        Command::ArmAndHold {
            altitude,
            hold_secs,
        } => {
            let supervisor = SupervisorConfig::from_flight_config(&config)
                .with_hold(Duration::from_secs(hold_secs));
            let strategy = cli::hold_strategy(altitude);
            fly(&vehicle, supervisor, strategy.as_ref(), cli.output).await
        }
        Command::Goto(args) => {
            let supervisor = SupervisorConfig::from_flight_config(&config)
                .with_hold(Duration::from_secs(args.hold_secs));
            fly(&vehicle, supervisor, &args.strategy(), cli.output).await
        }
        Command::Survey(args) => {
            let return_action = if args.land {
                ReturnAction::Land
            } else {
                ReturnAction::ReturnToLaunch
            };
            let supervisor =
                SupervisorConfig::from_flight_config(&config).with_return_action(return_action);
            let strategy = args.strategy(config.overlap_fraction);
            fly(&vehicle, supervisor, &strategy, cli.output).await
        }
    };

    if let Err(err) = vehicle.close().await {
        tracing::warn!(error = %err, "Vehicle link did not close cleanly");
    }
    exit
}

async fn fly(
    vehicle: &Arc<dyn VehicleHandle>,
    config: SupervisorConfig,
    strategy: &dyn WaypointStrategy,
    format: OutputFormat,
) -> Result<u8, CliError> {
    let (recall, recall_token) = cancellation();
    let (cancel, cancel_token) = cancellation();
    let interrupt = tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install ctrl-c handler: {}", err);
            return;
        }
        tracing::warn!("Interrupt received, returning home; interrupt again to abandon the mission");
        recall.cancel();
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Second interrupt received, cancelling mission");
            cancel.cancel();
        }
    });

    let supervisor = MissionSupervisor::new(Arc::clone(vehicle), config)
        .with_return_request(recall_token)
        .with_cancellation(cancel_token);
    let mut progress = supervisor.subscribe();
    let watcher = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let update = progress.borrow_and_update().clone();
            tracing::debug!(
                state = %update.state,
                reached = update.waypoints_reached,
                total = update.waypoints_total,
                distance_m = update.distance_to_target_m,
                altitude_m = update.altitude_m,
                "Mission progress"
            );
        }
    });

    let report = supervisor.run(strategy).await;
    interrupt.abort();
    let _ = watcher.await;

    output::emit_report(format, &report)?;
    Ok(output::exit_status(&report.outcome))
}

async fn status(
    vehicle: &dyn VehicleHandle,
    config: &FlightConfig,
    format: OutputFormat,
) -> Result<u8, CliError> {
    let policy = PollPolicy::new(
        Duration::from_millis(config.poll_interval_ms.max(1)),
        Duration::from_millis(config.prearm_timeout_ms),
    );
    let ready = poll_until("pre-arm health", policy, &CancelToken::never(), || async move {
        let healthy = vehicle.health_ok().await?;
        if !healthy {
            tracing::info!("Waiting for vehicle to pass pre-arm checks");
        }
        Ok::<_, PollError>(healthy.then_some(()))
    })
    .await;
    let ready = match ready {
        Ok(()) => true,
        Err(PollError::TimedOut { .. }) => false,
        Err(PollError::Vehicle(err)) => return Err(err.into()),
        Err(err) => {
            tracing::warn!(error = %err, "Status wait interrupted");
            false
        }
    };

    let snapshot = vehicle.telemetry().await?;
    match format {
        OutputFormat::Json => output::print_json(&serde_json::json!({
            "ready": ready,
            "telemetry": snapshot,
        }))?,
        OutputFormat::Text => println!("{}", output::telemetry_text(&snapshot, ready)),
    }
    Ok(if ready { EXIT_COMPLETED } else { EXIT_ABORTED })
}
