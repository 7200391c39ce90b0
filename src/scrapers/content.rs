//! Article body extraction.
//!
//! Fetches an article page and reduces it to one line of normalised text for
//! the analyser. The main content block is looked up in order of preference:
//! `.entry-content`, then `article`, then `main`. Within it, paragraphs,
//! headings (levels 1 to 3) and list items are collected in document order.
//! Pages without any of those blocks fall back to the whole body text.

use super::{FetchPage, element_text};
use crate::utils::collapse_whitespace;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument, warn};

static CONTAINERS: Lazy<Vec<Selector>> = Lazy::new(|| {
    [".entry-content", "article", "main"]
        .iter()
        .map(|s| Selector::parse(s).expect("static selector"))
        .collect()
});
static TEXT_BLOCKS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("p, h1, h2, h3, li").expect("static selector"));
static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").expect("static selector"));

const NON_CONTENT: [&str; 3] = ["script", "style", "noscript"];

/// Fetch `url` and return its main text, or an empty string on any failure.
///
/// Failures are logged and never returned; callers judge whether the text is
/// long enough to use.
#[instrument(level = "info", skip_all, fields(%url))]
pub async fn extract_text<F: FetchPage>(fetcher: &F, url: &str) -> String {
    match fetcher.fetch_page(url).await {
        Ok(html) => {
            let text = extract_main_text(&html);
            debug!(chars = text.chars().count(), "Extracted article text");
            text
        }
        Err(e) => {
            warn!(error = %e, "Article fetch failed; returning no content");
            String::new()
        }
    }
}

/// Pull the normalised main text out of an article page.
pub fn extract_main_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let container = CONTAINERS
        .iter()
        .find_map(|sel| document.select(sel).next());

    match container {
        Some(container) => container
            .select(&TEXT_BLOCKS)
            .map(element_text)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
        None => document
            .select(&BODY)
            .next()
            .map(visible_text)
            .unwrap_or_default(),
    }
}

/// Text of `root` without script, style and noscript contents.
fn visible_text(root: ElementRef<'_>) -> String {
    let chunks: Vec<&str> = root
        .descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let hidden = node.ancestors().any(|a| {
                a.value()
                    .as_element()
                    .is_some_and(|el| NON_CONTENT.contains(&el.name()))
            });
            (!hidden).then_some(&**text)
        })
        .collect();
    collapse_whitespace(&chunks.join(" "))
}
