//! Binary entry point for the Trellis cluster processes.
#![forbid(unsafe_code)]

use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::OnceLock;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use trellis::backend::MemoryBackend;
use trellis::cluster::{coordinator, worker};
use trellis::config::{ClusterConfig, WorkerConfig};

#[derive(Parser, Debug)]
#[command(
    name = "trellis",
    version,
    about = "Property-graph store over a key-value backend, served by a worker cluster",
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the cluster coordinator: registry, liveness poller, public API.
    Coordinator(CoordinatorCmd),
    /// Run one worker process serving graph operations.
    Worker(WorkerCmd),
}

#[derive(Args, Debug)]
struct CoordinatorCmd {
    #[arg(long, value_name = "FILE", help = "TOML configuration file")]
    config: Option<PathBuf>,

    #[arg(long, help = "Override the public API bind address")]
    public_bind: Option<SocketAddr>,

    #[arg(long, help = "Override the worker registry bind address")]
    registry_bind: Option<SocketAddr>,

    #[arg(long, help = "Override the liveness poll interval (milliseconds)")]
    poll_interval_ms: Option<u64>,

    #[arg(
        long,
        help = "Bound the wait for a free worker (milliseconds); absent waits forever"
    )]
    acquire_timeout_ms: Option<u64>,
}

#[derive(Args, Debug)]
struct WorkerCmd {
    #[arg(long, value_name = "FILE", help = "TOML configuration file")]
    config: Option<PathBuf>,

    #[arg(long, help = "Override the worker bind address (port 0 = ephemeral)")]
    bind: Option<SocketAddr>,

    #[arg(
        long,
        env = "TRELLIS_REGISTRY_URL",
        help = "Override the registry base URL"
    )]
    registry: Option<String>,

    #[arg(long, help = "Consume recycled identifiers before the counter")]
    recycle_ids: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    install_tracing_subscriber();
    let cli = Cli::parse();
    match cli.command {
        Command::Coordinator(cmd) => run_coordinator(cmd).await,
        Command::Worker(cmd) => run_worker(cmd).await,
    }
}

async fn run_coordinator(cmd: CoordinatorCmd) -> Result<(), Box<dyn Error>> {
    let mut config = match &cmd.config {
        Some(path) => ClusterConfig::from_file(path)?,
        None => ClusterConfig::default(),
    };
    if let Some(addr) = cmd.public_bind {
        config.public_bind = addr;
    }
    if let Some(addr) = cmd.registry_bind {
        config.registry_bind = addr;
    }
    if let Some(interval) = cmd.poll_interval_ms {
        config.poll_interval_ms = interval;
    }
    if let Some(timeout) = cmd.acquire_timeout_ms {
        config.acquire_timeout_ms = Some(timeout);
    }
    let running = coordinator::spawn(config).await?;
    shutdown_signal().await;
    running.shutdown().await?;
    Ok(())
}

async fn run_worker(cmd: WorkerCmd) -> Result<(), Box<dyn Error>> {
    let mut config = match &cmd.config {
        Some(path) => WorkerConfig::from_file(path)?,
        None => WorkerConfig::default(),
    };
    if let Some(addr) = cmd.bind {
        config.bind = addr;
    }
    if let Some(url) = cmd.registry {
        config.registry_url = url;
    }
    if cmd.recycle_ids {
        config.recycle_ids = true;
    }
    // The in-process backend makes a worker self-contained for demos and
    // tests; production deployments plug a shared KvBackend implementation
    // in through the library API instead of this binary.
    let backend = Arc::new(MemoryBackend::new());
    let running = worker::spawn(config, backend).await?;
    shutdown_signal().await;
    running.shutdown().await?;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(err) => tracing::error!(?err, "failed to listen for shutdown signal"),
    }
}

fn install_tracing_subscriber() {
    static INSTALLED: OnceLock<()> = OnceLock::new();
    INSTALLED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = fmt().with_env_filter(filter).try_init();
    });
}
