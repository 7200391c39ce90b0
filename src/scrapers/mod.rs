//! Page fetching and HTML extraction for competitor press sites.
//!
//! Each tracked site is scraped in two phases, mirroring how press pages
//! are laid out:
//!
//! 1. **Listing**: parse the press listing page into ordered [`ArticleRecord`]s
//!    ([`listing`])
//! 2. **Content**: fetch each new article page and pull out its main text
//!    ([`content`])
//!
//! # Strategies
//!
//! | Strategy | Container | Typical site |
//! |----------|-----------|--------------|
//! | `structured_panel` | marked article panel inside or around the anchor | Grab press room |
//! | `anchor_heuristic` | anchor's parent element, date guessed from text | plain blog listings |
//!
//! All network access goes through the [`FetchPage`] trait so the pipeline
//! can run against canned pages in tests.
//!
//! [`ArticleRecord`]: crate::models::ArticleRecord

pub mod content;
pub mod listing;

use crate::utils::collapse_whitespace;
use scraper::ElementRef;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

/// Browser-like identification; several press sites reject unknown agents.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
}

/// Something that can fetch an HTML page as text.
pub trait FetchPage {
    /// GET `url` and return the body of a 2xx response.
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError>;
}

/// [`FetchPage`] over a `reqwest` client with a bounded timeout and a browser user agent.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(BROWSER_USER_AGENT)
            .build()?;
        Ok(Self { client })
    }
}

impl FetchPage for HttpFetcher {
    #[instrument(level = "debug", skip(self))]
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: resp.url().to_string(),
            });
        }
        let body = resp.text().await?;
        debug!(bytes = body.len(), "Fetched page");
        Ok(body)
    }
}

/// Text of `el` with its text nodes joined by single spaces.
pub(crate) fn element_text(el: ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}


#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode, header};
    use axum::routing::get;
    use axum::Router;

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(Duration::from_secs(15)).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_page_returns_body_on_success() {
        let base = test_server::spawn(Router::new().route("/ok", get(|| async { "<p>hello</p>" }))).await;
        let body = fetcher().fetch_page(&format!("{base}/ok")).await.unwrap();
        assert_eq!(body, "<p>hello</p>");
    }

    #[tokio::test]
    async fn test_fetch_page_maps_non_2xx_to_status_error() {
        let base = test_server::spawn(
            Router::new().route("/gone", get(|| async { (StatusCode::NOT_FOUND, "nope") })),
        )
        .await;
        match fetcher().fetch_page(&format!("{base}/gone")).await {
            Err(FetchError::HttpStatus { status, .. }) => assert_eq!(status, 404),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_page_sends_browser_user_agent() {
        let base = test_server::spawn(Router::new().route(
            "/ua",
            get(|headers: HeaderMap| async move {
                headers
                    .get(header::USER_AGENT)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string()
            }),
        ))
        .await;
        let body = fetcher().fetch_page(&format!("{base}/ua")).await.unwrap();
        assert_eq!(body, BROWSER_USER_AGENT);
    }

    #[tokio::test]
    async fn test_fetch_page_connection_error() {
        // Port 9 (discard) on localhost is essentially never listening.
        let err = fetcher().fetch_page("http://127.0.0.1:9/").await.unwrap_err();
        assert!(matches!(err, FetchError::Request(_)));
    }
}
