//! Media Worker CLI
//!
//! Serves the HTTP gate, runs a single batch, or polls media_jobs continuously.

use anyhow::Result;
use clap::{Parser, Subcommand};
use media_worker::server::{self, AppState};
use media_worker::worker::setup_signal_handler;
use media_worker::{build_runner, AppConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "media-worker")]
#[command(about = "Generate course media for queued jobs and attach it to course documents")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP gate (POST /?n=<1..25>, GET /health)
    Serve {
        /// Address to listen on
        #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
        addr: SocketAddr,
    },

    /// Process one batch and print the report as JSON
    Run {
        /// Jobs to process (clamped to 1..=25)
        #[arg(short, long, env = "BATCH_SIZE")]
        n: Option<i64>,
    },

    /// Run as worker, polling media_jobs for pending jobs
    Worker {
        /// Poll interval in seconds (default: 5)
        #[arg(short, long, default_value = "5")]
        poll_interval: u64,

        /// Run one batch and exit (for testing)
        #[arg(long)]
        once: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = AppConfig::from_env()?;

    match cli.command {
        Commands::Serve { addr } => {
            info!("Initializing HTTP gate...");
            let runner = Arc::new(build_runner(&config).await?);
            let state = AppState::new(runner, &config.agent_token, config.status_policy);
            server::serve(state, addr).await?;
        }

        Commands::Run { n } => {
            let runner = build_runner(&config).await?;
            let requested = n.unwrap_or(config.worker.batch_size as i64);
            let report = runner.run_batch(requested).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Worker {
            poll_interval,
            once,
        } => {
            info!("Initializing worker...");
            config.worker = config
                .worker
                .into_builder()
                .poll_interval_secs(poll_interval)
                .build();
            let runner = build_runner(&config).await?;

            if once {
                info!("Running in single-batch mode...");
                let report = runner.run_batch(config.worker.batch_size as i64).await?;
                if report.processed == 0 {
                    println!("No pending jobs found");
                } else {
                    println!("Processed {} jobs", report.processed);
                    for result in &report.results {
                        println!(
                            "  {} {}{}",
                            result.id,
                            result.status,
                            result
                                .error
                                .as_deref()
                                .map(|e| format!(": {}", e))
                                .unwrap_or_default()
                        );
                    }
                }
            } else {
                // Setup graceful shutdown
                let shutdown = runner.shutdown_handle();
                setup_signal_handler(shutdown);

                runner.run().await?;
            }
        }
    }

    Ok(())
}
