//! roomwhen: escape room availability around your shifts
//!
//! Usage:
//!   roomwhen            - Poll until Ctrl+C, printing slot changes
//!   roomwhen --once     - Run one refresh cycle and print the report
//!   roomwhen --help     - Show help

mod report;

use rw_core::Config;
use rw_schedule::Poller;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

/// Run mode
enum RunMode {
    /// Keep polling and print changes
    Watch,
    /// One cycle, then exit
    Once,
    /// Show help
    Help,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mode = parse_args();

    match mode {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("roomwhen {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        _ => {}
    }

    // Load .env file before reading RUST_LOG
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = Config::load().map_err(|e| anyhow::anyhow!("Config error: {}", e))?;

    tracing::info!("Starting roomwhen...");
    tracing::info!("Venue: {}", config.venue.base_url);

    let poller = Poller::new(&config).map_err(|e| anyhow::anyhow!("Failed to create poller: {}", e))?;

    match mode {
        RunMode::Once => run_once(poller).await,
        RunMode::Watch => run_watch(poller).await,
        _ => Ok(()),
    }
}

/// Parse command line arguments
fn parse_args() -> RunMode {
    let args: Vec<String> = std::env::args().collect();

    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "--once" | "-1" => return RunMode::Once,
            "--help" | "-h" => return RunMode::Help,
            "--version" | "-v" => return RunMode::Version,
            _ => {}
        }
    }

    RunMode::Watch
}

/// Print help message
fn print_help() {
    println!("roomwhen - Escape room availability around your shifts");
    println!();
    println!("Usage:");
    println!("  roomwhen            Poll until Ctrl+C, printing slot changes");
    println!("  roomwhen --once     Run one refresh cycle and print the report");
    println!("  roomwhen --help     Show this help message");
    println!("  roomwhen --version  Show version");
    println!();
    println!("Configuration is read from roomwhen.toml when present.");
    println!();
    println!("Environment Variables:");
    println!("  ROOMWHEN_FEED_URL              Calendar feed URL (http, https or webcal)");
    println!("  ROOMWHEN_FEED_URL_FILE         File holding the feed URL (default: .icalURL)");
    println!("  ROOMWHEN_FEED_REFRESH_SECS     Seconds between feed refreshes (default: 3600)");
    println!("  ROOMWHEN_FEED_TIMEOUT_SECS     Feed download timeout (default: 20)");
    println!("  ROOMWHEN_VENUE_URL             Venue booking site (default: http://stockholm.roomescapelive.se)");
    println!("  ROOMWHEN_GROUP_SIZE            Group size used for bookings (default: 4)");
    println!("  ROOMWHEN_USER_AGENT            User-Agent sent to the venue");
    println!("  ROOMWHEN_REQUEST_TIMEOUT_SECS  Venue request timeout (default: 20)");
    println!("  ROOMWHEN_POLL_INTERVAL_SECS    Seconds between venue polls (default: 300)");
    println!("  RUST_LOG                       Log filter (default: info)");
}

/// Run one cycle and print the report
async fn run_once(poller: Poller) -> anyhow::Result<()> {
    let results = poller.run_once().await?;
    print!("{}", report::render_matches(&results));
    Ok(())
}

/// Poll until Ctrl+C
async fn run_watch(poller: Poller) -> anyhow::Result<()> {
    let handle = poller.start();
    let mut changes = handle.subscribe();
    let mut results = handle.results();
    let mut reported = false;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    tracing::info!("Press Ctrl+C to exit");

    loop {
        tokio::select! {
            change = changes.recv() => match change {
                Ok(change) => println!("{}", report::render_change(&change)),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Dropped {} change event(s)", skipped);
                }
                Err(RecvError::Closed) => break,
            },
            changed = results.changed(), if !reported => {
                if changed.is_err() {
                    break;
                }
                // Full report once, changes only afterwards
                print!("{}", report::render_matches(&results.borrow_and_update()));
                reported = true;
            }
            _ = &mut ctrl_c => {
                tracing::info!("Shutting down...");
                break;
            }
        }
    }

    handle.stop().await;
    tracing::info!("roomwhen stopped");
    Ok(())
}
