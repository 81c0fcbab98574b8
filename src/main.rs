use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use dogtalk_gate::config::GateConfig;
use dogtalk_gate::http::{AppState, HttpServer};
use dogtalk_gate::ratelimit::{spawn_cleanup_task, GenerationLimiter};

#[derive(Parser, Debug)]
#[command(name = "dogtalk-gate")]
#[command(about = "Generation cooldown and duration service for talking-dog videos")]
#[command(version)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the HTTP listen address
    #[arg(long)]
    http_addr: Option<SocketAddr>,

    /// Default log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Print the effective configuration as YAML and exit
    #[arg(long)]
    print_config: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing (stderr, so stdout stays free for --print-config)
    init_tracing(&args);

    // Load configuration: defaults, then file, then DOGTALK_* env, then flags
    let mut config = GateConfig::load(args.config.as_deref())?;
    if let Some(addr) = args.http_addr {
        config.server.http_addr = addr;
    }

    if args.print_config {
        config.write_yaml(std::io::stdout().lock())?;
        return Ok(());
    }

    info!("Starting Dogtalk Gate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        http_addr = %config.server.http_addr,
        cooldown_secs = config.limiter.cooldown_secs,
        retention_secs = config.limiter.retention_secs,
        words_per_minute = config.duration.words_per_minute,
        buckets = ?config.duration.buckets,
        "Configuration loaded"
    );

    // Build the limiter and the duration estimator
    let limiter = Arc::new(GenerationLimiter::new(config.limiter.cooldown_policy()?));
    let estimator = Arc::new(config.duration.estimator()?);
    info!("Generation limiter initialized");

    // Purge stale entries in the background
    let cleanup = spawn_cleanup_task(limiter.clone(), config.limiter.cleanup_interval());

    // Serve until Ctrl+C or SIGTERM
    let server = HttpServer::new(config.server.http_addr, AppState::new(limiter, estimator));
    let result = server.serve_with_shutdown(shutdown_signal()).await;

    cleanup.abort();
    result?;

    info!("Dogtalk Gate stopped");
    Ok(())
}

fn init_tracing(args: &Args) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    match args.log_format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Resolve once the process is asked to stop, letting the gate drain
/// in-flight generation checks before exiting.
async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable, relying on Ctrl+C");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let source = tokio::select! {
        result = signal::ctrl_c() => match result {
            Ok(()) => "ctrl-c",
            Err(e) => {
                warn!(error = %e, "Ctrl+C handler failed, stopping gate");
                "ctrl-c handler error"
            }
        },
        _ = terminate => "sigterm",
    };

    info!(signal = source, "Stopping Dogtalk Gate, draining generation requests");
}
