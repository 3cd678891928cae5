//! # Article Indexer
//!
//! Tracks the published articles of a static site and submits their URLs to
//! search-engine indexing APIs, recording in a flat state file which engine
//! has accepted which URL so nothing is submitted twice.
//!
//! ## Features
//!
//! - Discovers published Markdown/reStructuredText articles and derives their
//!   canonical URLs, including the English locale variant
//! - Submits URLs to the Google Indexing API one at a time, with a per-run cap,
//!   a fixed delay, and an early stop on rate limiting
//! - Submits URLs to IndexNow (Bing) in a single batch
//! - Reports whether anything is pending so CI can decide whether to run
//!
//! ## Usage
//!
//! ```sh
//! article_indexer extract
//! article_indexer google publish
//! article_indexer bing
//! article_indexer detect --output-file "$GITHUB_OUTPUT"
//! ```
//!
//! ## Architecture
//!
//! Every command is a single linear pass over the state file:
//! 1. **Extract**: content tree → new rows appended to the store
//! 2. **Submit**: pending rows → indexing API → timestamps written back
//! 3. **Detect**: pending rows → `has_new_urls` signal

use clap::Parser;
use std::error::Error;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, error, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod auth;
mod cli;
mod config;
mod detect;
mod extract;
mod models;
mod store;
mod submitters;
mod utils;

use cli::{Cli, Command};
use config::Config;

/// Log to stderr, and also to `log_file` when one is configured.
fn init_tracing(log_file: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = tfmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(UtcTime::rfc_3339());

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                tfmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_target(true)
                    .with_timer(UtcTime::rfc_3339()),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(())
}

async fn dispatch(command: Command, config: &Config) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Extract => {
            let added = extract::run(config).await?;
            info!(added, "Extraction complete");
        }
        Command::Google { operation } => {
            let summary = submitters::google::run(config, operation).await?;
            debug!(?summary, "Google run summary");
        }
        Command::Bing => {
            let summary = submitters::bing::run(config).await?;
            debug!(?summary, "Bing run summary");
        }
        Command::Detect {
            engine,
            output_file,
        } => {
            detect::run(&config.csv_file, engine, output_file.as_deref()).await?;
        }
        Command::Indexnow { urls } => {
            let response = submitters::bing::submit_urls(config, &urls).await?;
            println!("Status Code: {}", response.status);
            println!("Response: {}", response.body);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::parse();

    // Tracing needs the log file path, so the config is read first and any
    // load error is reported once tracing is up.
    let loaded = Config::load(&args.config).await;
    init_tracing(loaded.as_ref().ok().and_then(|c| c.log_file.as_deref()))?;

    let start_time = std::time::Instant::now();
    info!(command = ?args.command, "article_indexer starting up");

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!(path = %args.config.display(), error = %e, "Failed to load configuration");
            return Err(e);
        }
    };
    debug!(site_url = %config.site_url, csv_file = %config.csv_file.display(), "Using configuration");

    if let Err(e) = dispatch(args.command, &config).await {
        error!(error = %e, "Run aborted");
        return Err(e);
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}
