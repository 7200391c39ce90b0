//! # Competitor Watch
//!
//! Watches competitor press-release pages, queues articles that have not
//! been analysed yet, and sends their text to Gemini for a structured
//! competitive-intelligence read.
//!
//! ## Usage
//!
//! ```sh
//! competitor_watch run                   # discover + analyse, print results
//! competitor_watch discover              # list the new-article queue only
//! competitor_watch serve --port 5000     # web dashboard
//! competitor_watch sources               # show configured sources
//! ```
//!
//! ## Architecture
//!
//! 1. **Discovery**: fetch each source's listing page and parse it into
//!    article records, newest first (demo data when the page is unusable)
//! 2. **Dedup**: drop records whose URL is in the source's seen-URL cache
//! 3. **Extraction**: fetch each new article and pull out its main text
//! 4. **Analysis**: send the text to the LLM; only successes are marked seen

use clap::Parser;
use std::error::Error;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod config;
mod demo;
mod events;
mod models;
mod pipeline;
mod scrapers;
mod store;
mod utils;
mod web;

use api::{GeminiAsk, RetryAsk};
use cli::{Cli, Command};
use config::{Settings, load_profiles};
use events::EventSink;
use models::{ListingResult, SourceProfile};
use pipeline::{RunSummary, discover_new, run_all};
use scrapers::HttpFetcher;
use store::SeenUrlStore;
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = Instant::now();
    info!("competitor_watch starting up");

    let args = Cli::parse();
    debug!(command = ?args.command, sources = ?args.sources, cache_dir = %args.cache_dir, "Parsed CLI arguments");

    let profiles = load_profiles(args.sources.as_deref()).await?;
    let settings = Settings::new(
        args.cache_dir.clone(),
        args.timeout_secs,
        args.gemini_api_key.clone(),
        args.model.clone(),
    );
    info!(
        sources = profiles.len(),
        timeout_secs = settings.timeout.as_secs(),
        model = %settings.model,
        "Configuration loaded"
    );

    match args.command {
        Command::Sources => print_sources(&profiles),
        Command::Discover => discover(&profiles, &settings).await?,
        Command::Run { json } => {
            check_cache_dir(&args.cache_dir).await?;
            let summary = run(&profiles, &settings).await?;
            print_summary(&summary, json)?;
        }
        Command::Serve { host, port } => {
            check_cache_dir(&args.cache_dir).await?;
            let state = web::AppState::new(
                profiles,
                SeenUrlStore::new(&settings.cache_dir),
                HttpFetcher::new(settings.timeout)?,
                analyzer(&settings)?,
            );
            web::serve(state, &host, port).await?;
        }
    }

    let elapsed = start_time.elapsed();
    info!(?elapsed, secs = elapsed.as_secs(), "competitor_watch finished");
    Ok(())
}

/// Fail early when the seen-URL cache cannot be written.
async fn check_cache_dir(path: &str) -> Result<(), Box<dyn Error>> {
    if let Err(e) = ensure_writable_dir(path).await {
        error!(
            path,
            error = %e,
            "Cache directory is not writable (fix perms or choose a different --cache-dir)"
        );
        return Err(e);
    }
    Ok(())
}

fn analyzer(settings: &Settings) -> Result<RetryAsk<GeminiAsk>, reqwest::Error> {
    if settings.gemini_api_key.is_none() {
        warn!("GEMINI_API_KEY not set; every analysis will fail and no article will be marked seen");
    }
    // Gemini calls take longer than page fetches, so they get their own client.
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .build()?;
    let gemini = GeminiAsk::new(client, settings.gemini_api_key.clone(), settings.model.clone());
    Ok(RetryAsk::new(gemini, 5, Duration::from_secs(1)))
}

#[instrument(level = "info", skip_all)]
async fn run(profiles: &[SourceProfile], settings: &Settings) -> Result<RunSummary, Box<dyn Error>> {
    let store = SeenUrlStore::new(&settings.cache_dir);
    let fetcher = HttpFetcher::new(settings.timeout)?;
    let analyzer = analyzer(settings)?;
    Ok(run_all(profiles, &store, &fetcher, &analyzer, &EventSink::disabled()).await)
}

#[instrument(level = "info", skip_all)]
async fn discover(profiles: &[SourceProfile], settings: &Settings) -> Result<(), Box<dyn Error>> {
    let store = SeenUrlStore::new(&settings.cache_dir);
    let fetcher = HttpFetcher::new(settings.timeout)?;

    for profile in profiles.iter().filter(|p| p.enabled) {
        let result = discover_new(profile, &store, &fetcher, &EventSink::disabled()).await;
        match &result {
            ListingResult::Live { records } => {
                println!("{} ({} new)", profile.display_name, records.len())
            }
            ListingResult::Fallback { records, reason } => println!(
                "{} ({} new, demo data: {reason})",
                profile.display_name,
                records.len()
            ),
        }
        for record in result.records() {
            let marker = if record.date_parsed { "" } else { " (date unknown)" };
            println!(
                "  {}{marker}  [{}] {}\n    {}",
                record.publish_date.format("%Y-%m-%d"),
                record.category,
                record.title,
                record.url
            );
        }
    }
    Ok(())
}

fn print_sources(profiles: &[SourceProfile]) {
    for p in profiles {
        println!(
            "{:<12} {:<8} limit={:<3} cache={}.txt  {}",
            p.source_id,
            if p.enabled { "enabled" } else { "disabled" },
            p.limit,
            p.cache_file_id,
            p.listing_url
        );
    }
}

fn print_summary(summary: &RunSummary, json: bool) -> Result<(), Box<dyn Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    for result in summary.results() {
        println!("{}", "=".repeat(80));
        println!("{}\n{}", result.title, result.url);
        if let Some(feature) = &result.feature {
            println!("NEW FEATURE DETECTED: {feature}");
        }
        println!("{}\n{}", "-".repeat(80), result.analysis);
    }
    println!("{}", "=".repeat(80));
    for source in &summary.sources {
        let mode = match &source.fallback {
            Some(reason) => format!(" (demo data: {reason})"),
            None => String::new(),
        };
        println!(
            "{}: {} new, {} analyzed, {} skipped, {} failed{mode}",
            source.source_id,
            source.discovered,
            source.results.len(),
            source.skipped,
            source.failed
        );
    }
    Ok(())
}
