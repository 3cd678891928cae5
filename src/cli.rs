//! Command-line interface definitions for Article Indexer.
//!
//! This module defines the CLI arguments and subcommands using the `clap` crate.
//! Everything else comes from the YAML configuration file.

use crate::models::{Engine, NotificationKind};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for the Article Indexer application.
///
/// # Examples
///
/// ```sh
/// # Add newly published articles to the state file
/// article_indexer extract
///
/// # Notify Google about new articles, then IndexNow
/// article_indexer google publish
/// article_indexer bing
///
/// # Tell CI whether anything is waiting
/// article_indexer detect --output-file "$GITHUB_OUTPUT"
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "ARTICLE_INDEXER_CONFIG", default_value = "config.yaml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scan the content directory and append new published article URLs
    Extract,
    /// Submit pending URLs to the Google Indexing API one at a time
    Google {
        /// publish → URL_UPDATED, deleted → URL_DELETED
        #[arg(value_enum)]
        operation: NotificationKind,
    },
    /// Submit all pending URLs to IndexNow in one batch
    Bing,
    /// Report whether any URL is still pending
    Detect {
        /// Which engine's submission column to check
        #[arg(long, value_enum, default_value = "google")]
        engine: Engine,
        /// File to append `has_new_urls=…` to
        #[arg(long, env = "GITHUB_OUTPUT")]
        output_file: Option<PathBuf>,
    },
    /// Submit the given URLs to IndexNow without reading or writing state
    Indexnow {
        #[arg(required = true)]
        urls: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_google_operation() {
        let cli = Cli::parse_from(["article_indexer", "google", "publish"]);
        assert_eq!(cli.config, PathBuf::from("config.yaml"));
        assert!(matches!(
            cli.command,
            Command::Google {
                operation: NotificationKind::UrlUpdated
            }
        ));

        let cli = Cli::parse_from(["article_indexer", "-c", "/etc/idx.yaml", "google", "deleted"]);
        assert_eq!(cli.config, PathBuf::from("/etc/idx.yaml"));
        assert!(matches!(
            cli.command,
            Command::Google {
                operation: NotificationKind::UrlDeleted
            }
        ));
    }

    #[test]
    fn test_cli_rejects_unknown_operation() {
        assert!(Cli::try_parse_from(["article_indexer", "google", "URL_UPDATED"]).is_err());
    }

    #[test]
    fn test_cli_detect_engine() {
        let cli = Cli::parse_from([
            "article_indexer",
            "detect",
            "--engine",
            "bing",
            "--output-file",
            "/tmp/out",
        ]);
        match cli.command {
            Command::Detect {
                engine,
                output_file,
            } => {
                assert_eq!(engine, Engine::Bing);
                assert_eq!(output_file, Some(PathBuf::from("/tmp/out")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_indexnow_needs_urls() {
        assert!(Cli::try_parse_from(["article_indexer", "indexnow"]).is_err());
        let cli = Cli::parse_from(["article_indexer", "indexnow", "https://example.com/a/"]);
        assert!(matches!(cli.command, Command::Indexnow { urls } if urls.len() == 1));
    }
}
