//! Press listing parser.
//!
//! Turns the raw HTML of a competitor's press/news listing into an ordered,
//! de-duplicated list of [`ArticleRecord`]s, newest first.
//!
//! Candidate anchors come from the profile's `link_selector`. Each anchor is
//! resolved to an absolute URL, mapped to its containing article block
//! according to the profile's [`ExtractionStrategy`], and turned into a record.
//! Anchors without a usable href or without a container are skipped. The
//! first occurrence of a URL wins, and at most `limit` records are built.
//!
//! Dates are tried against the profile's formats in order. A missing or
//! unparseable date becomes the parse time, with `date_parsed = false` and
//! the raw text preserved in `original_date_text`.

use crate::models::{
    ArticleRecord, DEFAULT_CATEGORY, DESCRIPTION_MAX_CHARS, ExtractionStrategy, PanelSelectors,
    SourceProfile, UNKNOWN_TITLE,
};
use super::element_text;
use crate::utils::{collapse_whitespace, truncate_chars};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

static HEADING: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h1, h2, h3, h4, h5").expect("static selector"));
static TIME: Lazy<Selector> = Lazy::new(|| Selector::parse("time").expect("static selector"));
static CATEGORY: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"[class*="category"]"#).expect("static selector"));
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| Selector::parse("p").expect("static selector"));

/// Date-looking fragments: `11 Jun 2025`, `June 11, 2025`, `2025-06-11`.
static DATE_LIKE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:\d{1,2} [A-Z][a-z]{2,8} \d{4}|[A-Z][a-z]{2,8} \d{1,2}, \d{4}|\d{4}-\d{2}-\d{2})\b")
        .expect("static regex")
});

/// Parse `html` from `profile`'s listing page into records, newest first.
///
/// Returns an empty list when nothing is recognised; the caller decides how
/// to degrade.
pub fn parse_listing(html: &str, profile: &SourceProfile) -> Vec<ArticleRecord> {
    parse_listing_at(html, profile, Utc::now())
}

/// [`parse_listing`] with an explicit "now" used for undated entries.
#[instrument(level = "info", skip_all, fields(source_id = %profile.source_id))]
pub fn parse_listing_at(
    html: &str,
    profile: &SourceProfile,
    now: DateTime<Utc>,
) -> Vec<ArticleRecord> {
    let base = match Url::parse(&profile.listing_url) {
        Ok(base) => base,
        Err(e) => {
            warn!(listing_url = %profile.listing_url, error = %e, "Listing URL is not absolute");
            return Vec::new();
        }
    };
    let Some(links) = compile(&profile.link_selector) else {
        return Vec::new();
    };
    let Some(extractor) = Extractor::compile(&profile.strategy) else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    let mut candidates = 0usize;
    let mut records: Vec<ArticleRecord> = document
        .select(&links)
        .inspect(|_| candidates += 1)
        .filter_map(|anchor| {
            let url = resolve_href(&base, anchor.value().attr("href")?)?;
            let Some(fields) = extractor.extract(anchor, &url, &base) else {
                debug!(%url, "No article container for anchor; skipping");
                return None;
            };
            Some(fields.into_record(url, profile, now))
        })
        .unique_by(|record| record.url.clone())
        .take(profile.limit)
        .collect();

    sort_newest_first(&mut records);
    info!(candidates, count = records.len(), "Parsed listing page");
    records
}

/// Stable sort by `publish_date`, newest first; ties keep page order.
pub fn sort_newest_first(records: &mut [ArticleRecord]) {
    records.sort_by(|a, b| b.publish_date.cmp(&a.publish_date));
}

/// Try each `chrono` format in order; the first that parses wins.
pub fn parse_publish_date(text: &str, formats: &[String]) -> Option<DateTime<Utc>> {
    let text = collapse_whitespace(text);
    if text.is_empty() {
        return None;
    }
    formats
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&text, fmt).ok())
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
}

/// Resolve `href` against the listing URL, dropping placeholders and non-http links.
fn resolve_href(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    let resolved = base.join(href).ok()?;
    matches!(resolved.scheme(), "http" | "https").then(|| resolved.to_string())
}

fn compile(selector: &str) -> Option<Selector> {
    match Selector::parse(selector) {
        Ok(sel) => Some(sel),
        Err(e) => {
            warn!(selector, error = %e, "Invalid selector; it will match nothing");
            None
        }
    }
}

fn first_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
    scope
        .select(selector)
        .map(element_text)
        .find(|text| !text.is_empty())
}

/// Fields read from one article block before defaults are applied.
#[derive(Debug, Default)]
struct RawFields {
    title: Option<String>,
    date_text: Option<String>,
    category: Option<String>,
    description: Option<String>,
}

impl RawFields {
    fn into_record(self, url: String, profile: &SourceProfile, now: DateTime<Utc>) -> ArticleRecord {
        let original_date_text = self.date_text.unwrap_or_default();
        let parsed = parse_publish_date(&original_date_text, &profile.date_formats);
        if parsed.is_none() {
            debug!(%url, date_text = %original_date_text, "Unparseable or missing date; using now");
        }
        ArticleRecord {
            title: self
                .title
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
            publish_date: parsed.unwrap_or(now),
            date_parsed: parsed.is_some(),
            original_date_text,
            description: self
                .description
                .map(|d| truncate_chars(&d, DESCRIPTION_MAX_CHARS))
                .unwrap_or_default(),
            category: self
                .category
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            source_id: profile.source_id.clone(),
            url,
        }
    }
}

/// A profile's strategy with its selectors compiled once per parse.
enum Extractor {
    Panel(PanelExtractor),
    Heuristic { include: Vec<String>, exclude: Vec<String> },
}

impl Extractor {
    fn compile(strategy: &ExtractionStrategy) -> Option<Self> {
        match strategy {
            ExtractionStrategy::StructuredPanel(selectors) => {
                PanelExtractor::compile(selectors).map(Extractor::Panel)
            }
            ExtractionStrategy::AnchorHeuristic { include, exclude } => Some(Extractor::Heuristic {
                include: include.clone(),
                exclude: exclude.clone(),
            }),
        }
    }

    fn extract(&self, anchor: ElementRef<'_>, url: &str, base: &Url) -> Option<RawFields> {
        match self {
            Extractor::Panel(panel) => panel.extract(anchor),
            Extractor::Heuristic { include, exclude } => {
                let wanted = include.iter().any(|p| url.contains(p.as_str()))
                    && !exclude.iter().any(|p| url.contains(p.as_str()))
                    && url != base.as_str();
                if !wanted {
                    return None;
                }
                heuristic_fields(anchor)
            }
        }
    }
}

struct PanelExtractor {
    panel: Selector,
    titles: Vec<Selector>,
    date: Option<Selector>,
    category: Option<Selector>,
    descriptions: Vec<Selector>,
}

impl PanelExtractor {
    fn compile(selectors: &PanelSelectors) -> Option<Self> {
        Some(Self {
            panel: compile(&selectors.panel)?,
            titles: selectors.title.iter().filter_map(|s| compile(s)).collect(),
            date: compile(&selectors.date),
            category: compile(&selectors.category),
            descriptions: selectors.description.iter().filter_map(|s| compile(s)).collect(),
        })
    }

    /// The panel nested in the anchor, else the nearest enclosing panel.
    fn container<'a>(&self, anchor: ElementRef<'a>) -> Option<ElementRef<'a>> {
        anchor.select(&self.panel).next().or_else(|| {
            anchor
                .ancestors()
                .filter_map(ElementRef::wrap)
                .find(|el| self.panel.matches(el))
        })
    }

    fn extract(&self, anchor: ElementRef<'_>) -> Option<RawFields> {
        let panel = self.container(anchor)?;
        let text_of = |sel: &Option<Selector>| sel.as_ref().and_then(|s| first_text(panel, s));
        Some(RawFields {
            title: self.titles.iter().find_map(|s| first_text(panel, s)),
            date_text: text_of(&self.date),
            category: text_of(&self.category).map(|c| c.replace("**", "").trim().to_string()),
            description: self.descriptions.iter().find_map(|s| first_text(panel, s)),
        })
    }
}

fn heuristic_fields(anchor: ElementRef<'_>) -> Option<RawFields> {
    let container = anchor.parent().and_then(ElementRef::wrap)?;
    let anchor_text = element_text(anchor);
    let title = if anchor_text.is_empty() {
        first_text(container, &HEADING)
    } else {
        Some(anchor_text)
    };
    let date_text = container
        .select(&TIME)
        .next()
        .and_then(|time| {
            let text = element_text(time);
            if text.is_empty() {
                time.value()
                    .attr("datetime")
                    .map(|dt| truncate_chars(dt.trim(), 10))
            } else {
                Some(text)
            }
        })
        .or_else(|| {
            DATE_LIKE
                .find(&element_text(container))
                .map(|m| m.as_str().to_string())
        });
    Some(RawFields {
        title,
        date_text,
        category: first_text(container, &CATEGORY),
        description: first_text(container, &PARAGRAPH),
    })
}
