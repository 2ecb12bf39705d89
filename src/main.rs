//! Weather Relay - Main Entry Point
//!
//! Consumes sensor readings from RabbitMQ and posts them to the backend
//! ingestion endpoint until terminated by a signal.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn, Level};
use weather_relay::config::RelayConfig;
use weather_relay::error::RelayResult;
use weather_relay::forwarder::HttpForwarder;
use weather_relay::observability::{HealthServer, LogSettings, RelayMetrics};
use weather_relay::relay::{Relay, Supervisor};
use weather_relay::transport::amqp::AmqpClient;

const SERVICE_NAME: &str = "weather-relay";

/// Relay weather readings from an AMQP queue to an HTTP endpoint
#[derive(Parser)]
#[command(name = "weather-relay")]
#[command(about = "Relay weather readings from RabbitMQ to the ingestion API")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Consume and forward readings until SIGINT or SIGTERM
    Run,
    /// Validate configuration
    Config {
        /// Print the effective configuration (broker password redacted)
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_observability(cli.verbose);

    info!("Starting weather relay v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e.diagnostic(), "Failed to load configuration");
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_relay(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!(
            error = %e.diagnostic(),
            startup_fatal = e.is_startup_fatal(),
            "Command failed"
        );
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn init_observability(verbose: u8) {
    let settings = LogSettings::from_env();
    let settings = match verbose {
        0 => settings,
        1 => settings.with_level(Level::DEBUG),
        _ => settings.with_level(Level::TRACE),
    };
    settings.init();
}

fn load_configuration(config_path: &Option<PathBuf>) -> RelayResult<RelayConfig> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(RelayConfig::load_from_file(path)?);
    }

    for path_str in ["weather-relay.toml", "config/weather-relay.toml"] {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(RelayConfig::load_from_file(&path)?);
        }
    }

    info!("No configuration file found, using defaults and environment");
    Ok(RelayConfig::from_env()?)
}

async fn run_relay(config: RelayConfig) -> RelayResult<()> {
    let metrics = Arc::new(RelayMetrics::new());
    metrics.set_relay_state("connecting");

    // Started before connecting so probes report the broker as down while retrying
    let health_server = if config.health.enabled {
        let server = Arc::new(HealthServer::new(
            SERVICE_NAME,
            config.health.port,
            metrics.clone(),
        ));
        let (_, serving) = server.clone().bind()?;
        tokio::spawn(serving);
        Some(server)
    } else {
        None
    };

    let client = AmqpClient::connect(config.broker.clone(), metrics.clone()).await?;
    let forwarder = HttpForwarder::new(config.ingest.forwarder_config())?;
    let deliveries = client.consume().await?;

    let relay = Relay::new(forwarder, metrics.clone());
    let mut supervisor = Supervisor::spawn(relay, deliveries);
    if let Some(server) = &health_server {
        server.set_consuming(true);
    }

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    info!(
        queue = %client.queue(),
        endpoint = %config.ingest.endpoint_url,
        "Relay is running, waiting for messages"
    );

    // The process only exits on a signal, even after the loop has ended
    let mut loop_running = true;
    loop {
        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down gracefully...");
                break;
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down gracefully...");
                break;
            }
            exit = supervisor.wait(), if loop_running => {
                loop_running = false;
                match exit {
                    Ok(exit) => error!(
                        reason = %exit,
                        "Consumption loop ended, no longer relaying readings"
                    ),
                    Err(e) => error!(
                        error = %e,
                        "Consumption loop failed, no longer relaying readings"
                    ),
                }
                metrics.set_broker_connected(false);
                if let Some(server) = &health_server {
                    server.set_consuming(false);
                }
            }
        }
    }

    info!("Application shutdown initiated");
    metrics.set_relay_state("stopping");
    match supervisor.shutdown().await {
        Ok(exit) => info!(reason = %exit, "Consumption loop stopped"),
        Err(e) => error!(error = %e, "Error stopping consumption loop"),
    }
    if let Err(e) = client.close().await {
        warn!(error = %e, "Error closing broker connection");
    }
    metrics.set_broker_connected(false);
    metrics.set_relay_state("stopped");
    Ok(())
}

fn handle_config_command(config: &RelayConfig, show: bool) -> RelayResult<()> {
    if show {
        println!("Current configuration:");
        println!("{}", config.to_redacted_toml()?);
    }

    info!("Configuration validation complete");
    Ok(())
}
