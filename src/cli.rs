//! Command line interface built on clap.
//!
//! Defines [`Cli`] with the [`Command`] subcommands (serve, classify, audit)
//! and the global flags (--config, --workers, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// VERACITY: asynchronous human-vs-AI text detection with an audit trail.
#[derive(Debug, Parser)]
#[command(name = "veracity", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the configuration file.
    #[arg(long, global = true, default_value = "veracity.toml")]
    pub config: PathBuf,

    /// Override the number of workers.
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    /// Human-readable logs at debug level.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP service.
    Serve {
        /// Listen address, overriding the configuration.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Classify one text through the full job pipeline and print the result.
    Classify {
        /// Text to classify.
        text: String,
    },

    /// Show the newest audit records and summary statistics.
    Audit {
        /// How many records to show.
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}
