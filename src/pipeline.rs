//! Discovery and analysis pipeline.
//!
//! A run moves each source through
//! `FetchingListing -> {ParsedOk | FellBackToDemo} -> FilteredAgainstCache`,
//! then analyses the new articles one at a time. Progress is reported only
//! through [`EventSink`]; nothing here keeps state between calls.
//!
//! Discovery never marks anything as seen. A URL is appended to the
//! seen-URL cache only after its analysis succeeded, so an article whose
//! analysis fails is picked up again by the next run.

use crate::api::{AskAsync, MAX_ANALYSIS_CHARS, detect_feature_announcement};
use crate::demo;
use crate::events::{EventSink, PipelineEvent};
use crate::models::{AnalysisRecord, ArticleRecord, FallbackReason, ListingResult, SourceProfile};
use crate::scrapers::FetchPage;
use crate::scrapers::content::extract_text;
use crate::scrapers::listing::parse_listing;
use crate::store::SeenUrlStore;
use crate::utils::{preview, truncate_chars, truncate_for_log};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

/// Article text shorter than this is treated as "no usable content".
pub const MIN_ARTICLE_CHARS: usize = 100;
/// Characters of analysed text kept as the record preview.
pub const PREVIEW_CHARS: usize = 200;

/// Unseen records for `profile`, newest first.
///
/// Falls back to the source's demo dataset when the listing cannot be fetched
/// or contains nothing recognisable; the result says which happened. Demo
/// records are filtered against the seen set like live ones.
#[instrument(level = "info", skip_all, fields(source_id = %profile.source_id))]
pub async fn discover_new<F: FetchPage>(
    profile: &SourceProfile,
    store: &SeenUrlStore,
    fetcher: &F,
    events: &EventSink,
) -> ListingResult {
    let seen = store.load(profile).await;
    events.emit(PipelineEvent::CacheLoaded {
        source_id: profile.source_id.clone(),
        seen: seen.len(),
    });

    let listing = match fetcher.fetch_page(&profile.listing_url).await {
        Ok(html) => {
            let records = parse_listing(&html, profile);
            if records.is_empty() {
                fall_back(profile, FallbackReason::NoRecognizedArticles, events)
            } else {
                events.emit(PipelineEvent::ListingFetched {
                    source_id: profile.source_id.clone(),
                    parsed: records.len(),
                });
                ListingResult::Live { records }
            }
        }
        Err(e) => {
            warn!(listing_url = %profile.listing_url, error = %e, "Listing fetch failed");
            fall_back(profile, FallbackReason::FetchFailed(e.to_string()), events)
        }
    };

    let total = listing.records().len();
    let fresh = listing.retain(|r| !seen.contains(&r.url));
    info!(
        total,
        new = fresh.records().len(),
        fallback = fresh.is_fallback(),
        "Filtered listing against seen-URL cache"
    );
    events.emit(PipelineEvent::Discovered {
        source_id: profile.source_id.clone(),
        new: fresh.records().len(),
    });
    fresh
}

fn fall_back(profile: &SourceProfile, reason: FallbackReason, events: &EventSink) -> ListingResult {
    let records = demo::demo_articles(&profile.source_id);
    warn!(%reason, records = records.len(), "Serving demo dataset");
    events.emit(PipelineEvent::ListingFellBack {
        source_id: profile.source_id.clone(),
        reason: reason.clone(),
        records: records.len(),
    });
    ListingResult::Fallback { records, reason }
}

/// What happened to one source during a run.
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source_id: String,
    pub fallback: Option<FallbackReason>,
    pub discovered: usize,
    pub results: Vec<AnalysisRecord>,
    pub skipped: usize,
    pub failed: usize,
}

/// Totals for a whole run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub sources: Vec<SourceReport>,
}

impl RunSummary {
    pub fn results(&self) -> impl Iterator<Item = &AnalysisRecord> {
        self.sources.iter().flat_map(|s| s.results.iter())
    }

    pub fn analyzed(&self) -> usize {
        self.sources.iter().map(|s| s.results.len()).sum()
    }

    pub fn failed(&self) -> usize {
        self.sources.iter().map(|s| s.failed).sum()
    }
}

enum Outcome {
    Analyzed(AnalysisRecord),
    Skipped,
    Failed,
}

/// Discover new articles for `profile` and analyse them in order.
#[instrument(level = "info", skip_all, fields(source_id = %profile.source_id))]
pub async fn process_source<F, A>(
    profile: &SourceProfile,
    store: &SeenUrlStore,
    fetcher: &F,
    analyzer: &A,
    events: &EventSink,
) -> SourceReport
where
    F: FetchPage,
    A: AskAsync<Response = String>,
{
    let listing = discover_new(profile, store, fetcher, events).await;
    let fallback = match &listing {
        ListingResult::Fallback { reason, .. } => Some(reason.clone()),
        ListingResult::Live { .. } => None,
    };
    let queue = listing.into_records();
    let mut report = SourceReport {
        source_id: profile.source_id.clone(),
        fallback,
        discovered: queue.len(),
        results: Vec::new(),
        skipped: 0,
        failed: 0,
    };

    let total = queue.len();
    for (i, record) in queue.iter().enumerate() {
        events.emit(PipelineEvent::ArticleStarted {
            source_id: profile.source_id.clone(),
            index: i + 1,
            total,
            url: record.url.clone(),
            title: record.title.clone(),
        });
        match analyze_article(profile, record, store, fetcher, analyzer, events).await {
            Outcome::Analyzed(result) => report.results.push(result),
            Outcome::Skipped => report.skipped += 1,
            Outcome::Failed => report.failed += 1,
        }
    }

    info!(
        analyzed = report.results.len(),
        skipped = report.skipped,
        failed = report.failed,
        "Finished source"
    );
    report
}

#[instrument(level = "info", skip_all, fields(url = %record.url))]
async fn analyze_article<F, A>(
    profile: &SourceProfile,
    record: &ArticleRecord,
    store: &SeenUrlStore,
    fetcher: &F,
    analyzer: &A,
    events: &EventSink,
) -> Outcome
where
    F: FetchPage,
    A: AskAsync<Response = String>,
{
    let mut text = extract_text(fetcher, &record.url).await;
    if text.trim().chars().count() < MIN_ARTICLE_CHARS {
        match demo::fallback_article_text(&profile.source_id, &record.url) {
            Some(canned) => {
                info!("Article text too short; using stored fallback text");
                text = canned.to_string();
            }
            None => {
                warn!("Article text too short and no fallback text; skipping");
                events.emit(PipelineEvent::ArticleSkipped {
                    source_id: profile.source_id.clone(),
                    url: record.url.clone(),
                    reason: "insufficient article content".to_string(),
                });
                return Outcome::Skipped;
            }
        }
    }

    let text = truncate_chars(&text, MAX_ANALYSIS_CHARS);
    let analysis = match analyzer.ask(&text).await {
        Ok(analysis) => analysis,
        Err(e) => {
            error!(error = %e, "Analysis failed; leaving URL unseen");
            events.emit(PipelineEvent::ArticleFailed {
                source_id: profile.source_id.clone(),
                url: record.url.clone(),
                error: e.to_string(),
            });
            return Outcome::Failed;
        }
    };

    debug!(analysis = %truncate_for_log(&analysis, 200), "Analysis received");
    store.mark_seen(profile, &record.url).await;
    let result = AnalysisRecord {
        source_id: profile.source_id.clone(),
        url: record.url.clone(),
        title: record.title.clone(),
        feature: detect_feature_announcement(&analysis),
        analysis,
        analyzed_at: Utc::now(),
        article_preview: preview(&text, PREVIEW_CHARS),
    };
    events.emit(PipelineEvent::ArticleAnalyzed {
        record: result.clone(),
    });
    Outcome::Analyzed(result)
}

/// Run every enabled profile in turn.
#[instrument(level = "info", skip_all)]
pub async fn run_all<F, A>(
    profiles: &[SourceProfile],
    store: &SeenUrlStore,
    fetcher: &F,
    analyzer: &A,
    events: &EventSink,
) -> RunSummary
where
    F: FetchPage,
    A: AskAsync<Response = String>,
{
    let enabled: Vec<&SourceProfile> = profiles.iter().filter(|p| p.enabled).collect();
    events.emit(PipelineEvent::RunStarted {
        sources: enabled.len(),
    });

    let mut summary = RunSummary::default();
    for profile in enabled {
        summary
            .sources
            .push(process_source(profile, store, fetcher, analyzer, events).await);
    }

    info!(
        analyzed = summary.analyzed(),
        failed = summary.failed(),
        "Run complete"
    );
    events.emit(PipelineEvent::RunCompleted {
        analyzed: summary.analyzed(),
        failed: summary.failed(),
    });
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{AnalysisError, BoxError};
    use crate::config::builtin_profiles;
    use crate::scrapers::FetchError;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::tempdir;
    use tokio::sync::mpsc;

    const LISTING_URL: &str = "https://www.grab.com/sg/press/";

    /// Serves canned pages; anything else is a 404.
    #[derive(Default)]
    struct StubFetcher {
        pages: HashMap<String, String>,
    }

    impl StubFetcher {
        fn with(mut self, url: &str, html: impl Into<String>) -> Self {
            self.pages.insert(url.to_string(), html.into());
            self
        }
    }

    impl FetchPage for StubFetcher {
        async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
            self.pages.get(url).cloned().ok_or(FetchError::HttpStatus {
                status: 404,
                url: url.to_string(),
            })
        }
    }

    /// Fails on any text containing `FAIL`, otherwise answers with a launch analysis.
    #[derive(Default)]
    struct StubAsk {
        seen: Mutex<Vec<String>>,
    }

    impl AskAsync for StubAsk {
        type Response = String;

        async fn ask(&self, text: &str) -> Result<String, BoxError> {
            self.seen.lock().unwrap().push(text.to_string());
            if text.contains("FAIL") {
                Err(AnalysisError::Api("boom".into()).into())
            } else {
                Ok("Yes, Grab introduces it.\n- Feature/Product Name: Dine-In".to_string())
            }
        }
    }

    fn grab() -> SourceProfile {
        builtin_profiles().remove(0)
    }

    fn url(path: &str) -> String {
        format!("https://www.grab.com/sg/press/{path}/")
    }

    fn listing(entries: &[(&str, &str)]) -> String {
        let panels: String = entries
            .iter()
            .map(|(path, date)| {
                format!(
                    r#"<a class="blogHyperlink" href="/sg/press/{path}/"><article class="panel-article">
                       <h2>{path}</h2><span class="post-date">{date}</span></article></a>"#
                )
            })
            .collect();
        format!("<html><body>{panels}</body></html>")
    }

    fn article(body: &str) -> String {
        format!("<html><body><div class=\"entry-content\"><p>{body}</p></div></body></html>")
    }

    fn long(word: &str) -> String {
        format!("{word} ").repeat(40)
    }

    fn urls(result: &ListingResult) -> Vec<&str> {
        result.records().iter().map(|r| r.url.as_str()).collect()
    }

    #[tokio::test]
    async fn test_discover_filters_seen_urls_and_keeps_order() {
        let dir = tempdir().unwrap();
        let store = SeenUrlStore::new(dir.path());
        let profile = grab();
        store.mark_seen(&profile, &url("two")).await;
        let fetcher = StubFetcher::default().with(
            LISTING_URL,
            listing(&[("one", "11 Jun 2025"), ("two", "10 Jun 2025"), ("three", "23 May 2025")]),
        );

        let result = discover_new(&profile, &store, &fetcher, &EventSink::disabled()).await;
        assert!(!result.is_fallback());
        assert_eq!(urls(&result), vec![url("one"), url("three")]);
    }

    #[tokio::test]
    async fn test_discover_does_not_mark_seen() {
        let dir = tempdir().unwrap();
        let store = SeenUrlStore::new(dir.path());
        let profile = grab();
        let fetcher = StubFetcher::default().with(LISTING_URL, listing(&[("one", "11 Jun 2025")]));

        discover_new(&profile, &store, &fetcher, &EventSink::disabled()).await;
        assert!(!store.path_for(&profile).exists());
        let again = discover_new(&profile, &store, &fetcher, &EventSink::disabled()).await;
        assert_eq!(again.records().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_anchors_falls_back_to_demo() {
        let dir = tempdir().unwrap();
        let store = SeenUrlStore::new(dir.path());
        let fetcher = StubFetcher::default().with(LISTING_URL, "<html><body>redesigned</body></html>");

        let result = discover_new(&grab(), &store, &fetcher, &EventSink::disabled()).await;
        match &result {
            ListingResult::Fallback { records, reason } => {
                assert!(!records.is_empty());
                assert_eq!(*reason, FallbackReason::NoRecognizedArticles);
            }
            other => panic!("expected fallback, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_failure_falls_back_and_filters_demo() {
        let dir = tempdir().unwrap();
        let store = SeenUrlStore::new(dir.path());
        let profile = grab();
        let demo = demo::demo_articles("grab");
        store.mark_seen(&profile, &demo[0].url).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let result = discover_new(&profile, &store, &StubFetcher::default(), &EventSink::new(tx)).await;

        assert!(matches!(
            &result,
            ListingResult::Fallback { reason: FallbackReason::FetchFailed(_), .. }
        ));
        assert_eq!(result.records().len(), demo.len() - 1);
        assert_eq!(result.records()[0].url, demo[1].url);

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(serde_json::to_value(&event).unwrap()["type"].clone());
        }
        assert_eq!(kinds, vec!["cache_loaded", "listing_fell_back", "discovered"]);
    }

    #[tokio::test]
    async fn test_process_source_marks_only_successes() {
        let dir = tempdir().unwrap();
        let store = SeenUrlStore::new(dir.path());
        let profile = grab();
        let fetcher = StubFetcher::default()
            .with(
                LISTING_URL,
                listing(&[("ok", "11 Jun 2025"), ("bad", "10 Jun 2025"), ("thin", "09 Jun 2025")]),
            )
            .with(&url("ok"), article(&long("launch")))
            .with(&url("bad"), article(&long("FAIL")))
            .with(&url("thin"), article("too short"));
        let analyzer = StubAsk::default();

        let report = process_source(&profile, &store, &fetcher, &analyzer, &EventSink::disabled()).await;

        assert_eq!(report.discovered, 3);
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped, 1);
        assert!(report.fallback.is_none());

        let result = &report.results[0];
        assert_eq!(result.url, url("ok"));
        assert_eq!(result.feature.as_deref(), Some("Dine-In"));
        assert!(result.article_preview.ends_with("..."));
        assert_eq!(result.article_preview.chars().count(), PREVIEW_CHARS + 3);

        let seen = store.load(&profile).await;
        assert_eq!(seen.len(), 1);
        assert!(seen.contains(&url("ok")));
        // skipped article was never sent for analysis
        assert_eq!(analyzer.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_analysis_text_is_truncated() {
        let dir = tempdir().unwrap();
        let store = SeenUrlStore::new(dir.path());
        let fetcher = StubFetcher::default()
            .with(LISTING_URL, listing(&[("big", "11 Jun 2025")]))
            .with(&url("big"), article(&"x".repeat(MAX_ANALYSIS_CHARS + 500)));
        let analyzer = StubAsk::default();

        process_source(&grab(), &store, &fetcher, &analyzer, &EventSink::disabled()).await;
        let sent = analyzer.seen.lock().unwrap();
        assert_eq!(sent[0].chars().count(), MAX_ANALYSIS_CHARS);
    }

    #[tokio::test]
    async fn test_demo_run_uses_fallback_text_then_finds_nothing_new() {
        let dir = tempdir().unwrap();
        let store = SeenUrlStore::new(dir.path());
        let profiles = builtin_profiles();
        let fetcher = StubFetcher::default();
        let analyzer = StubAsk::default();

        let summary = run_all(&profiles, &store, &fetcher, &analyzer, &EventSink::disabled()).await;
        assert_eq!(summary.analyzed(), 4);
        assert_eq!(summary.failed(), 0);
        assert!(summary.sources[0].fallback.is_some());
        let first_sent = analyzer.seen.lock().unwrap()[0].clone();
        assert_eq!(
            first_sent,
            demo::fallback_article_text("grab", &demo::demo_articles("grab")[0].url).unwrap()
        );

        let second = run_all(&profiles, &store, &fetcher, &analyzer, &EventSink::disabled()).await;
        assert_eq!(second.sources[0].discovered, 0);
        assert_eq!(second.analyzed(), 0);
    }

    #[tokio::test]
    async fn test_run_all_skips_disabled_and_reports_progress() {
        let dir = tempdir().unwrap();
        let store = SeenUrlStore::new(dir.path());
        let mut disabled = grab();
        disabled.source_id = "off".into();
        disabled.enabled = false;
        let profiles = vec![grab(), disabled];
        let fetcher = StubFetcher::default()
            .with(LISTING_URL, listing(&[("ok", "11 Jun 2025")]))
            .with(&url("ok"), article(&long("launch")));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let summary = run_all(&profiles, &store, &fetcher, &StubAsk::default(), &EventSink::new(tx)).await;
        assert_eq!(summary.sources.len(), 1);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(events.first(), Some(&PipelineEvent::RunStarted { sources: 1 }));
        assert_eq!(
            events.last(),
            Some(&PipelineEvent::RunCompleted { analyzed: 1, failed: 0 })
        );
        assert!(events.contains(&PipelineEvent::ArticleStarted {
            source_id: "grab".into(),
            index: 1,
            total: 1,
            url: url("ok"),
            title: "ok".into(),
        }));
    }
}
