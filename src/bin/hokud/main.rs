//! hokud HTTP server
//!
//! Counts keyed events in fixed-width time windows and answers per-window
//! count and top-K queries over HTTP.
//!
//! # Modes
//!
//! - Live (default): windows rotate on a wall-clock timer anchored at
//!   "now" rounded down to the window width.
//! - Replay (`-f FILE`): a tab-separated record log is replayed to the end,
//!   with windows rotating on the log's own timestamps, and the server then
//!   answers queries about it.
//!
//! # CLI Commands
//!
//! - `start` - Start the server (default if no command specified)
//! - `check-config` - Validate configuration and print a summary
//!
//! # Configuration
//!
//! The server reads configuration from:
//! 1. `-c/--config` path
//! 2. `HOKUD_CONFIG` environment variable (path to TOML file)
//! 3. `./hokud.toml` in current directory
//! 4. Default configuration
//!
//! `HOKUD_*` environment variables and then CLI flags override file values.

use clap::{Parser, Subcommand};
use hokud::{
    clock::{Clock, SystemClock},
    config::ApplicationConfig,
    rotation::{spawn_driver, LiveRotation, ReplayRotation, RotationDriver},
    server::{build_router, shutdown_signal, AppState},
    types::align_down,
    CounterService,
};
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

// =============================================================================
// CLI Definition
// =============================================================================

#[derive(Parser)]
#[command(name = "hokud")]
#[command(version)]
#[command(about = "Windowed approximate event counter with per-window top-K", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to configuration file (overrides HOKUD_CONFIG env var)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override listen address (e.g., 0.0.0.0:8080)
    #[arg(short, long, global = true)]
    listen: Option<String>,

    /// HTTP port on all interfaces (ignored when --listen is given)
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Anchor epoch for replay
    #[arg(long, global = true)]
    epoch: Option<i64>,

    /// Replay records from this file instead of counting live traffic
    #[arg(short = 'f', long, global = true)]
    file: Option<PathBuf>,

    /// Sketch width as log2 of the column count
    #[arg(short, long, global = true)]
    width: Option<u32>,

    /// Sketch depth (hash rows)
    #[arg(short, long, global = true)]
    depth: Option<usize>,

    /// Window width in seconds
    #[arg(long, global = true)]
    win: Option<i64>,

    /// Number of finalized windows to keep
    #[arg(long, global = true)]
    intv: Option<usize>,

    /// Keys to keep per finalized window
    #[arg(long, global = true)]
    topk: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (default)
    Start,

    /// Validate configuration without starting the server
    CheckConfig,
}

// =============================================================================
// Configuration
// =============================================================================

/// Load configuration and layer CLI flags on top
fn load_config(cli: &Cli) -> hokud::Result<ApplicationConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut config = ApplicationConfig::load(path)?;
            config.apply_env_overrides()?;
            config
        },
        None => ApplicationConfig::discover()?,
    };

    if let Some(port) = cli.port {
        config.server.listen_addr = format!("0.0.0.0:{}", port);
    }
    if let Some(listen) = &cli.listen {
        config.server.listen_addr = listen.clone();
    }
    if let Some(epoch) = cli.epoch {
        config.window.anchor_epoch = Some(epoch);
    }
    if let Some(file) = &cli.file {
        config.replay.path = Some(file.clone());
    }
    if let Some(width) = cli.width {
        config.sketch.width_bits = width;
    }
    if let Some(depth) = cli.depth {
        config.sketch.depth = depth;
    }
    if let Some(win) = cli.win {
        config.window.width_secs = win;
    }
    if let Some(intv) = cli.intv {
        config.window.retention_buckets = intv;
    }
    if let Some(topk) = cli.topk {
        config.sketch.topk = topk;
    }

    config.validate()?;
    Ok(config)
}

/// Print a configuration summary
fn cmd_check_config(config: &ApplicationConfig) {
    println!("Configuration is valid!");
    println!();
    println!("Server Settings:");
    println!("  Listen address: {}", config.server.listen_addr);
    println!("  Log level: {}", config.server.log_level);
    println!("  Max query buckets: {}", config.server.max_query_buckets);
    println!();
    println!("Windows:");
    println!("  Width: {}s", config.window.width_secs);
    println!("  Retained: {}", config.window.retention_buckets);
    match config.window.anchor_epoch {
        Some(anchor) => println!("  Anchor epoch: {}", anchor),
        None => println!("  Anchor epoch: now (rounded down)"),
    }
    println!();
    println!("Sketch:");
    println!(
        "  Width: 2^{} columns x {} rows",
        config.sketch.width_bits, config.sketch.depth
    );
    println!("  Top-K: {}", config.sketch.topk);
    if let Some(path) = &config.replay.path {
        println!();
        println!("Replay:");
        println!("  File: {:?}", path);
    }
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match &cli.command {
        Some(Commands::CheckConfig) => {
            cmd_check_config(&config);
            return Ok(());
        },
        Some(Commands::Start) | None => {},
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.server.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    info!("Starting hokud v{}", env!("CARGO_PKG_VERSION"));

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let (service, driver_name, live_task) = match &config.replay.path {
        Some(path) => {
            // validate() guarantees an anchor in replay mode
            let anchor = config.window.anchor_epoch.unwrap_or_default();
            let service = Arc::new(CounterService::configure(config.counter_settings(anchor))?);
            let driver = ReplayRotation::open(path)?
                .with_progress_every(config.replay.progress_every);

            let report = driver.run(service.clone(), shutdown_tx.subscribe()).await?;
            info!(
                lines = report.lines,
                applied = report.applied,
                skipped = report.skipped,
                rotations = report.rotations,
                "Replay complete"
            );
            (service, driver.name(), None)
        },
        None => {
            let now = clock.now();
            let anchor = config
                .window
                .anchor_epoch
                .unwrap_or_else(|| align_down(now, config.window.width_secs));
            let service = Arc::new(CounterService::configure(config.counter_settings(anchor))?);
            let driver: Arc<dyn RotationDriver> =
                Arc::new(LiveRotation::for_service(&service, clock.clone()));
            let name = driver.name();
            let handle = spawn_driver(driver, service.clone(), shutdown_tx.subscribe());
            (service, name, Some(handle))
        },
    };

    debug!(
        anchor_epoch = service.anchor_epoch(),
        window_width = service.window_width(),
        driver = driver_name,
        "Counter service ready"
    );

    let state = Arc::new(AppState {
        service,
        clock,
        config: config.server.clone(),
        driver: driver_name,
    });
    let app = build_router(state);

    let addr: SocketAddr = config.server.listen_addr.parse()?;
    info!("Server listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the live driver; no receivers just means it already exited
    let _ = shutdown_tx.send(());
    if let Some(handle) = live_task {
        match handle.await {
            Ok(Ok(report)) => info!(rotations = report.rotations, "Rotation driver stopped"),
            Ok(Err(e)) => warn!(error = %e, "Rotation driver failed"),
            Err(e) => warn!(error = %e, "Rotation driver task panicked"),
        }
    }

    info!("Server shutdown complete");
    Ok(())
}
