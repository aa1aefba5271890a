//! stationlink - keeps a station link and a broker session up

use clap::{Parser, Subcommand};
use stationlink::config::StationConfig;
use stationlink::link::{LinkSupervisor, ProbeLinkDriver};
use stationlink::observability::{init_logging, LoggingConfig};
use stationlink::session::{
    BrokerEndpoint, InboundMessage, MqttSessionTransport, SessionSupervisor,
};
use stationlink::SupervisorResult;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, Level};

/// Station link and broker session supervisor
#[derive(Parser)]
#[command(name = "stationlink")]
#[command(about = "Keeps a network link and an MQTT broker session alive")]
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
    /// Run both supervisors until SIGINT or SIGTERM
    Run,
    /// Validate configuration
    Config {
        /// Print the configuration with secrets redacted
        #[arg(long)]
        show: bool,
    },
}

const DEFAULT_CONFIG_PATHS: [&str; 2] = ["stationlink.toml", "config/stationlink.toml"];

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut logging = LoggingConfig::from_env();
    if logging.filter_override.is_none() {
        match cli.verbose {
            0 => {}
            1 => logging.level = Level::DEBUG,
            _ => logging.level = Level::TRACE,
        }
    }
    if let Err(e) = init_logging(&logging) {
        eprintln!("Failed to initialize logging: {e}");
    }

    info!("Starting stationlink v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result: Result<(), Box<dyn std::error::Error>> = match cli.command {
        Commands::Run => run_station(config).await.map_err(Into::into),
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Shutdown complete");
}

fn load_configuration(
    config_path: Option<&Path>,
) -> Result<StationConfig, Box<dyn std::error::Error>> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(StationConfig::load_from_file(path)?);
    }

    for path_str in DEFAULT_CONFIG_PATHS {
        let path = Path::new(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(StationConfig::load_from_file(path)?);
        }
    }

    Err(format!(
        "no configuration file found; pass -c/--config or create {}",
        DEFAULT_CONFIG_PATHS[0]
    )
    .into())
}

async fn run_station(config: StationConfig) -> SupervisorResult<()> {
    let endpoint = BrokerEndpoint::parse(&config.session.broker_url)?;
    let driver = ProbeLinkDriver::from_section(&config.link, &endpoint.address());
    info!(probe_target = %driver.target(), "Link reachability target");

    let link = LinkSupervisor::start(&config.link, driver).await?;

    let transport = Arc::new(MqttSessionTransport::new(&config.session)?);
    let session = SessionSupervisor::start(
        &config.session,
        transport,
        link.subscribe(),
        |message: &InboundMessage<'_>| {
            info!(
                topic = %message.topic_str(),
                payload_len = message.payload_len(),
                payload = %String::from_utf8_lossy(message.payload),
                "Inbound message"
            );
        },
    )?;

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    info!("Supervisors running");

    tokio::select! {
        _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully..."),
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
    }

    session.shutdown().await;
    link.shutdown().await;
    Ok(())
}

fn handle_config_command(
    config: &StationConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("{}", toml::to_string_pretty(&config.redacted())?);
    }

    info!("Configuration validation complete");
    Ok(())
}
