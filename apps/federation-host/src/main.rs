mod config;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use config::AppConfig;
use fedkit::Federation;

/// Federation Host - composes independently deployed remote modules
#[derive(Parser)]
#[command(name = "federation-host")]
#[command(about = "Federation Host - composes independently deployed remote modules")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port override for the HTTP server (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Print effective configuration (JSON) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the host shell
    Run,
    /// Validate configuration and exit
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(ref path) = cli.config {
        if !Path::new(path).is_file() {
            anyhow::bail!("config file does not exist: {}", path.to_string_lossy());
        }
    }

    // Layered config:
    // 1) defaults -> 2) YAML (if provided) -> 3) env (FEDHOST__*) -> 4) CLI overrides
    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.apply_cli_overrides(cli.port, cli.verbose);

    init_logging(&config.logging);

    tracing::info!("Federation Host starting");

    if cli.print_config {
        println!(
            "Effective configuration:\n{}",
            serde_json::to_string_pretty(&config)?
        );
        return Ok(());
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_host(config).await,
        Commands::Check => check_config(&config),
    }
}

fn init_logging(logging: &config::LoggingConfig) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.filter.clone()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn check_config(config: &AppConfig) -> Result<()> {
    // Descriptor validation covers URLs and duplicate ids.
    let descriptors = config.federation.descriptors()?;
    println!("Configuration is valid ({} modules)", descriptors.len());
    for descriptor in descriptors {
        println!("  {} -> {}", descriptor.id, descriptor.entry_url);
    }
    Ok(())
}

async fn run_host(config: AppConfig) -> Result<()> {
    let addr = config.server.bind_addr()?;
    let federation = Federation::builder(config.federation).build()?;

    // Warm the loader before taking traffic; failures stay per-module.
    federation.preloader().preload_all().await;

    let monitor = federation.spawn_health_monitor();

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let state = server::AppState::new(federation);
    let result = server::serve(state, addr, shutdown).await;

    if let Some(monitor) = monitor {
        monitor.shutdown().await;
    }
    tracing::info!("Federation Host stopped");
    result
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown().await {
            tracing::error!(error = %e, "signal handler failed");
        }
        shutdown.cancel();
    });
}

/// Wait for termination signals (Ctrl+C, SIGTERM).
async fn wait_for_shutdown() -> Result<()> {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("Received Ctrl+C signal");
        }
        () = wait_sigterm() => {
            tracing::info!("Received SIGTERM signal");
        }
    }
    tracing::info!("Shutdown signal received, initiating graceful shutdown");
    Ok(())
}

#[cfg(unix)]
async fn wait_sigterm() {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut handler) => {
            handler.recv().await;
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_sigterm() {
    std::future::pending::<()>().await;
}
