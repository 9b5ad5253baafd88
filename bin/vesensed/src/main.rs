//! ---
//! vs_section: "01-core-functionality"
//! vs_subsection: "binary"
//! vs_type: "source"
//! vs_scope: "code"
//! vs_description: "Binary entrypoint for the VE-Sense daemon."
//! vs_version: "v0.0.0-prealpha"
//! vs_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::info;
use vesense_common::{init_tracing, AppConfig, LogFormat};
use vesense_metrics::{new_registry, DaemonMetrics};
use vesensed::DaemonBuilder;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "VE-Sense battery monitor and camera hub",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "FORMAT", help = "Override log format (structured-json, pretty)")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the daemon")]
    Run,
    #[command(about = "Load and validate the configuration, then exit")]
    CheckConfig,
}

fn profile() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "release"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("config.toml"));
    candidates.push(PathBuf::from("/etc/vesense/config.toml"));

    let load_started = Instant::now();
    let loaded = AppConfig::load_with_source(&candidates)?;
    let load_duration = load_started.elapsed();
    let mut config = loaded.config;
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::CheckConfig => {
            println!(
                "{}: {} device(s), {} camera(s), mqtt {}, http {}",
                loaded.source.display(),
                config.devices.len(),
                config.cameras.len(),
                if config.mqtt.is_some() { "on" } else { "off" },
                if config.http_server.is_some() { "on" } else { "off" },
            );
            Ok(())
        }
        Commands::Run => {
            init_tracing("vesensed", &config.logging)?;
            info!(config_path = %loaded.source.display(), "configuration loaded");
            run_daemon(config, load_duration.as_secs_f64()).await
        }
    }
}

async fn run_daemon(config: AppConfig, load_seconds: f64) -> Result<()> {
    let mut builder = DaemonBuilder::new(config.clone());
    if config.metrics.enabled {
        let registry = new_registry();
        let daemon_metrics = DaemonMetrics::new(registry.clone())?;
        daemon_metrics.observe_config_load(load_seconds);
        daemon_metrics.inc_start();
        daemon_metrics.set_build_info(env!("CARGO_PKG_VERSION"), profile());
        builder = builder.with_metrics_registry(registry);
    } else {
        info!("metrics disabled by configuration");
    }

    let handle = builder.start().await?;
    if let Some(api) = handle.api() {
        info!(address = %api.local_addr(), "http api available");
    }

    info!("daemon running; waiting for termination signal");
    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");
    handle.shutdown().await
}
