use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use printbridge::config::AppConfig;
use printbridge::context::AppContext;
use printbridge::core::spawn_sweeper;
use printbridge::logging::{self, LogConfig};
use printbridge::web::BridgeServer;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "printbridge")]
#[command(about = "Local relay between a hosted check-in app and LAN label printers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a TOML config file (default: ./printbridge.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge
    Serve(ServeArgs),
    /// Query a running bridge's health endpoint
    Status {
        #[arg(long)]
        port: Option<u16>,
    },
}

#[derive(Args, Serialize)]
struct ServeArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    port: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    max_retries: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    connection_timeout_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    simulation: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    verbose: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    json_logs: Option<bool>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match &cli.command {
        Commands::Serve(args) => {
            let config = AppConfig::new(config_path, Some(args))?;
            logging::init(LogConfig::from(&config));
            run_serve(config).await.context("Print bridge failed")?
        }
        Commands::Status { port } => {
            let config = AppConfig::new(config_path, None::<&ServeArgs>)?;
            run_status(port.unwrap_or(config.port))
                .await
                .context("Failed to check status of the bridge")?
        }
    }

    Ok(())
}

async fn run_serve(config: AppConfig) -> Result<()> {
    let bind_addr = config.bind_addr();
    let policy = config.retry_policy();
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %bind_addr,
        simulation = config.simulation,
        max_retries = policy.max_retries,
        worst_case_ms = policy.worst_case_duration().as_millis() as u64,
        "Starting print bridge"
    );
    if config.simulation {
        tracing::warn!("Simulation mode: labels are recorded, not printed");
    }

    let ctx = AppContext::new(config);

    let cancel = CancellationToken::new();
    let sweeper = spawn_sweeper(
        ctx.jobs.clone(),
        ctx.config.sweep_interval(),
        ctx.config.job_retention(),
        cancel.clone(),
    );

    let server = Arc::new(BridgeServer::new(ctx, bind_addr));

    tokio::spawn({
        let server = server.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Shutdown requested");
                    server.shutdown();
                }
                Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl-C"),
            }
        }
    });

    let served = server.start().await;

    cancel.cancel();
    sweeper.await.context("Sweeper task failed")?;
    served
}

async fn run_status(port: u16) -> Result<()> {
    let url = format!("http://127.0.0.1:{port}/health");
    let response = reqwest::get(&url)
        .await
        .with_context(|| format!("No bridge answering at {url}"))?
        .error_for_status()?;
    let health: serde_json::Value = response.json().await?;

    println!("{}", serde_json::to_string_pretty(&health)?);
    Ok(())
}
