//! crosspost-send - Background daemon for scheduled posting
//!
//! Claims scheduled posts once they are due and publishes each one to all
//! of its target platforms.

use clap::Parser;
use libcrosspost::logging::LoggingConfig;
use libcrosspost::{
    create_platforms, Config, CrosspostError, Database, MultiPlatformPoster, Result, Scheduler,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "crosspost-send")]
#[command(version)]
#[command(about = "Background daemon for scheduled posting")]
#[command(long_about = "\
crosspost-send - Background daemon for scheduled posting

DESCRIPTION:
    crosspost-send is a long-running daemon that watches the post store
    and publishes scheduled posts once their time arrives.

    Every tick it atomically claims all due posts, so two daemons sharing
    one database never publish the same post twice.

USAGE:
    # Run in foreground (logs to stderr)
    crosspost-send

    # Run with custom poll interval
    crosspost-send --poll-interval 30

    # Enable verbose logging
    crosspost-send --verbose

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes the current tick)

CONFIGURATION:
    Configuration file: ~/.config/crosspost/config.toml (or $CROSSPOST_CONFIG)
    Database location: ~/.local/share/crosspost/crosspost.db

    [scheduler]
    interval_secs = 60  # seconds between ticks

LOGGING:
    CROSSPOST_LOG_FORMAT=text|json|pretty
    CROSSPOST_LOG_LEVEL=info

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Configuration error
")]
struct Cli {
    /// Poll interval in seconds (overrides config)
    #[arg(long, value_name = "SECONDS")]
    #[arg(help = "How often to check for scheduled posts (default: 60)")]
    poll_interval: Option<u64>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    #[arg(help = "Enable verbose logging (useful for debugging)")]
    verbose: bool,

    /// Run once and exit (for testing)
    #[arg(long, hide = true)]
    #[arg(help = "Process due posts once and exit (for testing)")]
    once: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env("info", cli.verbose).init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db = Arc::new(Database::new(&config.database.path).await?);
    let registry = create_platforms(&config)?;
    let platforms: Vec<String> = registry.names().into_iter().map(str::to_string).collect();
    let poster = Arc::new(MultiPlatformPoster::new(registry, db.clone(), db.clone()));

    let interval = match cli.poll_interval {
        Some(0) => {
            return Err(CrosspostError::InvalidInput(
                "--poll-interval must be at least 1 second".to_string(),
            ))
        }
        Some(secs) => Duration::from_secs(secs),
        None => config.scheduler.interval(),
    };
    let scheduler = Scheduler::new(db, poster, interval);

    info!(?platforms, "crosspost-send daemon starting");

    if cli.once {
        let claimed = scheduler.tick().await;
        info!(claimed, "crosspost-send: processed due posts once, exiting");
        return Ok(());
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone())?;

    scheduler.run(shutdown).await;

    info!("crosspost-send daemon stopped");
    Ok(())
}

/// Set up signal handlers for graceful shutdown
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])
        .map_err(|e| CrosspostError::InvalidInput(format!("Signal setup failed: {}", e)))?;

    std::thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            info!(signal = sig, "Received shutdown signal, stopping gracefully...");
            shutdown.store(true, Ordering::Relaxed);
        }
    });

    Ok(())
}
