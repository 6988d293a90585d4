//! ---
//! rhome_section: "01-core-functionality"
//! rhome_subsection: "binary"
//! rhome_type: "source"
//! rhome_scope: "code"
//! rhome_description: "Binary entrypoint for the schedule service daemon."
//! rhome_version: "v0.1.0"
//! rhome_owner: "tbd"
//! ---
mod transport;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use rhome_common::config::AppConfig;
use rhome_common::logging::init_tracing;
use rhome_core::{DispatchSettings, Dispatcher, OracleError, ScheduleOracle, StaticSchedule};
use rhome_msg::{DeviceCommand, MessageQueue};
use tokio::signal;
use tracing::{info, warn};

const SERVICE_NAME: &str = "rhome-schedd";
const DEFAULT_CONFIG: &str = "configs/schedule.toml";

#[derive(Debug, Parser)]
#[command(author, version, about = "RPi-Home schedule service daemon", long_about = None)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the dispatch loop and TCP transport")]
    Run,
    #[command(about = "Validate the configuration and print it as JSON")]
    CheckConfig,
    #[command(about = "Print the scheduled state of a device")]
    Query {
        #[arg(help = "Device name as listed under [schedule.devices]")]
        device: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from(DEFAULT_CONFIG));
    let loaded = AppConfig::load_with_source(&candidates)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            init_tracing(SERVICE_NAME, &loaded.config.logging)?;
            info!(config_path = %loaded.source.display(), "configuration loaded");
            run_daemon(loaded.config).await?
        }
        Commands::CheckConfig => {
            let rendered = serde_json::to_string_pretty(&loaded.config)
                .context("failed to render configuration")?;
            println!("{rendered}");
        }
        Commands::Query { device } => {
            let schedule = StaticSchedule::from_config(&loaded.config.schedule);
            println!("{}", query_device(&schedule, &device)?);
        }
    }

    Ok(())
}

fn query_device(schedule: &StaticSchedule, device: &str) -> Result<DeviceCommand> {
    match schedule.is_on(device) {
        Ok(on) => Ok(DeviceCommand::from(on)),
        Err(err @ OracleError::UnknownDevice(_)) => {
            let known: Vec<&str> = schedule.devices().collect();
            Err(anyhow!("{}; known devices: {}", err, known.join(", ")))
        }
        Err(err) => Err(err.into()),
    }
}

async fn run_daemon(config: AppConfig) -> Result<()> {
    let settings = DispatchSettings::from_config(&config);
    let inbound = MessageQueue::new();
    let outbound = MessageQueue::new();
    let oracle: Arc<dyn ScheduleOracle> = Arc::new(StaticSchedule::from_config(&config.schedule));

    let mut tasks = Vec::new();
    match config.service.listen {
        Some(listen) => {
            let listener = transport::bind(listen).await?;
            let inbound = inbound.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(err) = transport::serve_inbound(listener, inbound).await {
                    warn!(error = %format!("{err:#}"), "inbound transport stopped");
                }
            }));
            tasks.push(tokio::spawn(transport::pump_outbound(
                outbound.clone(),
                settings.idle_poll,
                transport::CONNECT_TIMEOUT,
            )));
        }
        None => warn!("service.listen not set; TCP transport disabled"),
    }

    let mut dispatcher = Dispatcher::new(settings, inbound, outbound, oracle);
    tokio::select! {
        _ = dispatcher.run() => {}
        _ = shutdown_signal() => info!("shutdown signal received"),
    }

    for task in tasks {
        task.abort();
    }

    let metrics = dispatcher.metrics();
    info!(
        received = metrics.received,
        responded = metrics.responded,
        dropped = metrics.dropped,
        heartbeats = metrics.heartbeats,
        "dispatch loop stopped"
    );
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        tokio::select! {
            _ = ctrl_c() => {},
            _ = terminate() => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c().await;
    }
}

async fn ctrl_c() {
    if let Err(err) = signal::ctrl_c().await {
        warn!(?err, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            term.recv().await;
        }
        Err(err) => {
            warn!(?err, "failed to install SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}
