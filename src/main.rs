use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use turnstile::config::{StoreBackend, TurnstileConfig};
use turnstile::gate::Gate;
use turnstile::http::{AdmissionState, HttpServer};
use turnstile::limiter::RateLimiter;
use turnstile::store::{MemoryStore, RecordStore, RedisStore};

/// Per-client admission control with escalating backoff.
#[derive(Parser, Debug)]
#[command(name = "turnstile", version)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on (overrides server.http_addr)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    match args.log_format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }

    info!("Starting Turnstile admission service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = TurnstileConfig::load(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.server.http_addr = listen;
    }
    info!(
        http_addr = %config.server.http_addr,
        delays = ?config.limiter.delays,
        free_attempts = config.limiter.free_attempts,
        backend = ?config.store.backend,
        "Configuration loaded"
    );

    if config.limiter.is_disabled() {
        info!("Backoff schedule is empty, every request will be admitted");
    }

    let store: Arc<dyn RecordStore> = match config.store.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Redis => Arc::new(RedisStore::connect(&config.store.redis).await?),
    };
    info!("Record store initialized");

    let gate = Gate::new(RateLimiter::new(config.limiter.clone())?, store);
    let state = AdmissionState::new(Arc::new(gate))
        .with_failure_policy(config.server.failure_policy)
        .with_trust_forwarded_headers(config.server.trust_forwarded_headers);

    let server = HttpServer::new(config.server.http_addr, state);

    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Turnstile admission service stopped");
    Ok(())
}

/// Resolve on Ctrl+C, or on SIGTERM where the platform delivers it.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::SignalKind;

        match signal::unix::signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("Received Ctrl+C, draining connections"),
                    _ = sigterm.recv() => info!("Received SIGTERM, draining connections"),
                }
                return;
            }
            Err(e) => warn!(error = %e, "SIGTERM handler unavailable, stopping on Ctrl+C only"),
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, draining connections"),
        Err(e) => warn!(error = %e, "Ctrl+C handler unavailable, stopping now"),
    }
}
