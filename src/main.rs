//! Server-sent events daemon.
//!
//! Accepts HTTP clients on a TCP port and streams events to each of them
//! until they disconnect or the daemon shuts down.
//!
//! # Usage
//!
//! ```bash
//! # With config file
//! sse-daemon-rs config/daemon.toml
//!
//! # With environment variables
//! SSE_LISTEN_ADDR=0.0.0.0:8080 sse-daemon-rs
//!
//! # Watch the stream
//! curl -N http://127.0.0.1:8080/events
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use nix::libc;
use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sse_daemon_rs::{
    config::{Config, LoggingConfig},
    handler::{EventHandler, TickerHandler},
    metrics::{init_metrics, start_metrics_server},
    server::{ConnectionHandler, StreamListener},
    shutdown::ShutdownCoordinator,
};

/// Server-sent events daemon.
#[derive(Parser, Debug)]
#[command(name = "sse-daemon-rs")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML).
    #[arg(value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Override listen address.
    #[arg(short, long)]
    listen: Option<String>,

    /// Override the per-connection working buffer size.
    #[arg(long)]
    buffer_size: Option<usize>,

    /// Override the ticker interval (milliseconds).
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Enable debug logging.
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    increase_fd_limit();

    let mut config = Config::load(args.config.as_ref())?;

    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }
    if let Some(size) = args.buffer_size {
        config.stream.buffer_size = size;
    }
    if let Some(ms) = args.interval_ms {
        config.ticker.interval_ms = ms;
    }
    if args.debug {
        config.logging.level = "debug".to_string();
    }
    config.validate()?;

    init_logging(&config.logging)?;

    tracing::info!(
        listen_addr = %config.server.listen_addr,
        path = %config.server.path,
        buffer_size = config.stream.buffer_size,
        max_connections = config.server.max_connections,
        "Starting SSE daemon"
    );

    init_metrics();

    if config.metrics.enabled {
        let addr = config.metrics.listen_addr.parse()?;
        start_metrics_server(addr).await?;
    }

    let handler: Arc<dyn EventHandler> = Arc::new(TickerHandler::from_config(&config.ticker));
    tracing::info!(handler = handler.name(), "Handler initialized");

    let shutdown = ShutdownCoordinator::new();
    let listener = StreamListener::bind(&config.server, shutdown.clone()).await?;

    tracing::info!(addr = %listener.local_addr(), "Daemon listening");

    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        handle_signals(shutdown_clone).await;
    });

    let connections = Arc::new(ConnectionHandler::new(
        config.server.clone(),
        config.stream.clone(),
        handler,
    ));

    while let Some(conn) = listener.accept().await {
        let connections = connections.clone();
        tokio::spawn(async move {
            connections.handle(conn.stream, conn.peer, conn.guard).await;
        });
    }
    tracing::info!("Accept loop terminated");

    tracing::info!(
        active = shutdown.active_connections(),
        timeout_secs = config.server.shutdown_timeout_secs,
        "Waiting for connections to drain"
    );

    let drain_result =
        tokio::time::timeout(config.server.shutdown_timeout(), shutdown.wait_for_drain()).await;

    match drain_result {
        Ok(()) => tracing::info!("All connections drained"),
        Err(_) => tracing::warn!(
            active = shutdown.active_connections(),
            "Shutdown timeout reached, forcing exit"
        ),
    }

    tracing::info!("Daemon stopped");
    Ok(())
}

/// Initialize logging with tracing.
fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;

    match config.format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }

    Ok(())
}

/// Raise the open file limit so many clients can stay connected at once.
fn increase_fd_limit() {
    use std::mem::MaybeUninit;

    const DESIRED_LIMIT: u64 = 65_536;

    // SAFETY: getrlimit initializes `rlim` when it returns 0; setrlimit only reads it.
    unsafe {
        let mut rlim = MaybeUninit::<libc::rlimit>::uninit();
        if libc::getrlimit(libc::RLIMIT_NOFILE, rlim.as_mut_ptr()) != 0 {
            return;
        }
        let mut rlim = rlim.assume_init();
        if (rlim.rlim_cur as u64) >= DESIRED_LIMIT {
            return;
        }
        rlim.rlim_cur = (DESIRED_LIMIT as libc::rlim_t).min(rlim.rlim_max);
        if libc::setrlimit(libc::RLIMIT_NOFILE, &rlim) != 0 {
            eprintln!("Warning: could not increase fd limit");
        }
    }
}

/// Handle Unix signals.
async fn handle_signals(shutdown: ShutdownCoordinator) {
    let (mut sigint, mut sigterm, mut sighup) = match (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
        signal(SignalKind::hangup()),
    ) {
        (Ok(i), Ok(t), Ok(h)) => (i, t, h),
        _ => {
            tracing::error!("Failed to register signal handlers");
            return;
        }
    };

    loop {
        tokio::select! {
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT, initiating shutdown");
                shutdown.shutdown();
                break;
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, initiating shutdown");
                shutdown.shutdown();
                break;
            }
            _ = sighup.recv() => {
                tracing::info!(
                    active_connections = shutdown.active_connections(),
                    "Received SIGHUP, status report"
                );
            }
        }
    }
}
