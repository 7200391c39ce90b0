//! Command-line interface definitions for Competitor Watch.
//!
//! Global options may also come from environment variables; subcommands pick
//! what to do with the configured sources.

use clap::{Parser, Subcommand};

/// Command-line arguments for the Competitor Watch application.
///
/// # Examples
///
/// ```sh
/// # One discovery + analysis pass over every enabled source
/// competitor_watch run
///
/// # Preview the new-article queue without touching the cache or the LLM
/// competitor_watch --sources sources.yaml discover
///
/// # Dashboard on port 8080
/// GEMINI_API_KEY=... competitor_watch serve --port 8080
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a sources.yaml registry (built-in Grab profile when absent)
    #[arg(short, long, global = true, env = "COMPETITOR_WATCH_SOURCES")]
    pub sources: Option<String>,

    /// Directory holding the per-source seen-URL cache files
    #[arg(long, global = true, env = "COMPETITOR_WATCH_CACHE_DIR", default_value = ".")]
    pub cache_dir: String,

    /// Per-request HTTP timeout in seconds (clamped to 15..=30)
    #[arg(long, global = true, default_value_t = 15)]
    pub timeout_secs: u64,

    /// Gemini API key used for article analysis
    #[arg(long, global = true, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    /// Gemini model name
    #[arg(long, global = true, default_value = crate::config::DEFAULT_MODEL)]
    pub model: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Discover new articles and analyse them, printing the results
    Run {
        /// Print results as JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// List unseen articles without fetching their text or updating the cache
    Discover,
    /// Start the web dashboard
    Serve {
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        #[arg(short, long, default_value_t = 5000)]
        port: u16,
    },
    /// Show the configured source profiles
    Sources,
}
