//! Data models for discovered articles, source profiles, and analysis output.
//!
//! This module defines the core data structures used throughout the application:
//! - [`ArticleRecord`]: One press release discovered on a listing page
//! - [`SourceProfile`]: Static description of one tracked competitor site
//! - [`ExtractionStrategy`]: How the listing parser reads a site's markup
//! - [`ListingResult`]: Live records, or demo records plus the reason for falling back
//! - [`AnalysisRecord`]: An article after the LLM has analysed it

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Title used when a listing entry carries no recognisable heading.
pub const UNKNOWN_TITLE: &str = "Unknown Title";

/// Category used when a listing entry carries no category label.
pub const DEFAULT_CATEGORY: &str = "Others";

/// Maximum number of characters kept in [`ArticleRecord::description`].
pub const DESCRIPTION_MAX_CHARS: usize = 200;

/// A press release discovered on a competitor's listing page.
///
/// `url` is always absolute and unique within one parse pass. `publish_date`
/// is always set: when the listing shows no parseable date it holds the time
/// of parsing and `date_parsed` is `false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    /// Absolute URL of the article page.
    pub url: String,
    /// Headline as shown on the listing page.
    pub title: String,
    /// Parsed publication date, or parse time when no date could be read.
    pub publish_date: DateTime<Utc>,
    /// Raw date text exactly as displayed on the listing (empty if absent).
    pub original_date_text: String,
    /// Whether `publish_date` came from the listing rather than the clock.
    pub date_parsed: bool,
    /// Teaser text, at most [`DESCRIPTION_MAX_CHARS`] characters.
    pub description: String,
    /// Category label, [`DEFAULT_CATEGORY`] when missing.
    pub category: String,
    /// Identifier of the source profile this record came from.
    pub source_id: String,
}

/// Selectors used by the structured-panel strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelSelectors {
    /// Marker of the article block that belongs to a candidate anchor.
    #[serde(default = "default_panel_selector")]
    pub panel: String,
    /// Heading selectors, tried in order; the first hit wins.
    #[serde(default = "default_title_selectors")]
    pub title: Vec<String>,
    #[serde(default = "default_date_selector")]
    pub date: String,
    #[serde(default = "default_category_selector")]
    pub category: String,
    /// Teaser selectors, tried in order like `title`.
    #[serde(default = "default_description_selectors")]
    pub description: Vec<String>,
}

impl Default for PanelSelectors {
    fn default() -> Self {
        Self {
            panel: default_panel_selector(),
            title: default_title_selectors(),
            date: default_date_selector(),
            category: default_category_selector(),
            description: default_description_selectors(),
        }
    }
}

const HEADINGS: [&str; 5] = ["h1", "h2", "h3", "h4", "h5"];

fn default_panel_selector() -> String {
    r#"article[class*="panel-article"]"#.to_string()
}

fn default_title_selectors() -> Vec<String> {
    let marked = ["title", "headline"]
        .iter()
        .flat_map(|mark| HEADINGS.map(|h| format!(r#"{h}[class*="{mark}"]"#)))
        .collect::<Vec<_>>()
        .join(", ");
    vec![marked, HEADINGS.join(", ")]
}

fn default_date_selector() -> String {
    r#"[class*="post-date"], time"#.to_string()
}

fn default_category_selector() -> String {
    r#".post-cat, [class*="category"]"#.to_string()
}

fn default_description_selectors() -> Vec<String> {
    [
        r#"[class*="excerpt"], [class*="summary"], [class*="description"]"#,
        ".panel-body p",
        "p",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_include_patterns() -> Vec<String> {
    ["/press/", "/newsroom/", "/news/"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_exclude_patterns() -> Vec<String> {
    ["#", "javascript:", "mailto:", "page/"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Named strategy the listing parser dispatches on for a given site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractionStrategy {
    /// Each anchor owns a marked article panel holding title, date, category and teaser.
    StructuredPanel(PanelSelectors),
    /// Plain anchors filtered by URL pattern, with the date guessed from nearby text.
    AnchorHeuristic {
        #[serde(default = "default_include_patterns")]
        include: Vec<String>,
        #[serde(default = "default_exclude_patterns")]
        exclude: Vec<String>,
    },
}

impl Default for ExtractionStrategy {
    fn default() -> Self {
        ExtractionStrategy::StructuredPanel(PanelSelectors::default())
    }
}

#[cfg(test)]
impl ExtractionStrategy {
    /// The anchor-heuristic strategy with its default URL patterns.
    pub fn anchor_heuristic() -> Self {
        ExtractionStrategy::AnchorHeuristic {
            include: default_include_patterns(),
            exclude: default_exclude_patterns(),
        }
    }
}

pub(crate) fn default_date_formats() -> Vec<String> {
    ["%d %b %Y", "%B %d, %Y", "%d %B %Y", "%Y-%m-%d"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_limit() -> usize {
    10
}

fn default_enabled() -> bool {
    true
}

/// Static configuration for one tracked competitor site.
///
/// Profiles are read from the source registry (see [`crate::config`]) and are
/// never mutated while a run is in progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceProfile {
    pub source_id: String,
    pub display_name: String,
    /// Press/news listing page to index.
    pub listing_url: String,
    /// CSS selector for candidate article anchors on the listing page.
    pub link_selector: String,
    /// Stem of the seen-URL cache file (`<cache_dir>/<cache_file_id>.txt`).
    pub cache_file_id: String,
    /// `chrono` format strings, tried in order against the raw date text.
    #[serde(default = "default_date_formats")]
    pub date_formats: Vec<String>,
    /// Maximum number of records taken from one listing page.
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub strategy: ExtractionStrategy,
}

/// Why discovery served demo data instead of live records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FallbackReason {
    /// The listing page could not be fetched.
    FetchFailed(String),
    /// The listing page was fetched but nothing on it was recognised.
    NoRecognizedArticles,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::FetchFailed(e) => write!(f, "listing fetch failed: {e}"),
            FallbackReason::NoRecognizedArticles => {
                write!(f, "no recognisable articles on listing page")
            }
        }
    }
}

/// Outcome of reading a source's listing: real data or degraded mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ListingResult {
    Live { records: Vec<ArticleRecord> },
    Fallback {
        records: Vec<ArticleRecord>,
        reason: FallbackReason,
    },
}

impl ListingResult {
    pub fn records(&self) -> &[ArticleRecord] {
        match self {
            ListingResult::Live { records } | ListingResult::Fallback { records, .. } => records,
        }
    }

    pub fn into_records(self) -> Vec<ArticleRecord> {
        match self {
            ListingResult::Live { records } | ListingResult::Fallback { records, .. } => records,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, ListingResult::Fallback { .. })
    }

    /// Keep only the records for which `keep` returns `true`, preserving order and mode.
    pub fn retain<F>(mut self, keep: F) -> Self
    where
        F: FnMut(&ArticleRecord) -> bool,
    {
        match &mut self {
            ListingResult::Live { records } | ListingResult::Fallback { records, .. } => {
                records.retain(keep)
            }
        }
        self
    }
}

/// An article after a successful LLM analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub source_id: String,
    pub url: String,
    pub title: String,
    /// Free-form structured analysis text returned by the model.
    pub analysis: String,
    /// Feature or product name when the analysis reads as a launch announcement.
    pub feature: Option<String>,
    pub analyzed_at: DateTime<Utc>,
    /// First 200 characters of the analysed text.
    pub article_preview: String,
}
