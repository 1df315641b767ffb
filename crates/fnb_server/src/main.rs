//! FNB transaction simulator
//!
//! Serves the HTTP trigger surface and generates background teller traffic.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use fnb_router::BackpressurePolicy;
use fnb_server::config::{build_config, CliArgs as ConfigCliArgs, LogFormat};
use fnb_server::{shutdown_signal, AppState, Server};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// FNB transaction simulator - traced integration flows over simulated backends
#[derive(Parser, Debug)]
#[command(name = "fnb_server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (TOML format)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Host address to bind to
    #[arg(long, env = "FNB_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "FNB_PORT")]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "FNB_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (plain, json)
    #[arg(long)]
    log_format: Option<String>,

    /// Root seed for simulated randomness
    #[arg(long)]
    seed: Option<u64>,

    /// Real seconds slept per simulated second (0 disables waiting)
    #[arg(long)]
    latency_scale: Option<f64>,

    /// Maximum transactions in flight
    #[arg(long)]
    max_in_flight: Option<usize>,

    /// Behaviour at the in-flight cap (block, drop)
    #[arg(long)]
    backpressure: Option<BackpressurePolicy>,

    /// Serve HTTP only, without background traffic
    #[arg(long)]
    no_loadgen: bool,
}

impl From<Args> for ConfigCliArgs {
    fn from(args: Args) -> Self {
        ConfigCliArgs {
            config_file: args.config,
            host: args.host,
            port: args.port,
            log_level: args.log_level,
            log_format: args.log_format,
            seed: args.seed,
            latency_scale: args.latency_scale,
            max_in_flight: args.max_in_flight,
            backpressure: args.backpressure,
            no_loadgen: args.no_loadgen,
        }
    }
}

fn init_tracing(log_level: &str, format: LogFormat) {
    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
    );
    match format {
        LogFormat::Plain => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let cli_args: ConfigCliArgs = args.into();
    let config = build_config(&cli_args).context("Failed to load configuration")?;

    init_tracing(config.log_level.as_filter_str(), config.log_format);

    tracing::info!("FNB transaction simulator v{}", fnb_server::VERSION);
    tracing::info!(
        host = %config.host,
        port = %config.port,
        log_level = %config.log_level,
        environment = %config.environment,
        max_in_flight = config.router.max_in_flight,
        latency_scale = config.router.latency_scale,
        backpressure = %config.router.backpressure,
        loadgen_enabled = config.loadgen.enabled,
        seed = ?config.seed,
        "Server configuration loaded"
    );

    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install metrics recorder")?;
    let state = AppState::new(Arc::new(config))
        .context("Failed to build flow router")?
        .with_metrics(metrics);

    let server = Server::from_state(state);
    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    server.run(shutdown).await.context("Server error")?;
    Ok(())
}
