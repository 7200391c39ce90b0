//! Web dashboard: start runs, watch progress, read results.
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `GET /` | dashboard page |
//! | `POST /start` | start a background run (409 while one is running) |
//! | `GET /status` | JSON snapshot of the current run |
//! | `GET /logs` | SSE stream of `[HH:MM:SS] message` lines |
//! | `GET /results` | analysis results page |
//!
//! Run state is owned here. A background task folds [`PipelineEvent`]s from
//! the pipeline into [`RunState`] and republishes each log line on a
//! broadcast channel for the SSE stream.

use crate::api::{GeminiAsk, RetryAsk};
use crate::events::{EventSink, PipelineEvent};
use crate::models::{AnalysisRecord, SourceProfile};
use crate::pipeline::run_all;
use crate::scrapers::HttpFetcher;
use crate::store::SeenUrlStore;
use askama::Template;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{
        Html, IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use serde_json::json;
use std::convert::Infallible;
use std::error::Error;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{RwLock, broadcast, mpsc};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{error, info, instrument};

/// Analyser used by dashboard runs.
pub type Analyzer = RetryAsk<GeminiAsk>;

const LOG_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Ready,
    Running,
    Completed,
}

impl RunStatus {
    fn label(&self) -> &'static str {
        match self {
            RunStatus::Ready => "ready",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
        }
    }
}

/// Dashboard view of the current (or last) run.
#[derive(Debug, Clone, Serialize)]
pub struct RunState {
    pub status: RunStatus,
    /// Percentage of discovered articles already handled.
    pub progress: u8,
    pub total_articles: usize,
    pub processed_articles: usize,
    pub current_task: String,
    pub results: Vec<AnalysisRecord>,
    pub logs: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            status: RunStatus::Ready,
            progress: 0,
            total_articles: 0,
            processed_articles: 0,
            current_task: "Ready to start analysis".to_string(),
            results: Vec::new(),
            logs: Vec::new(),
            started_at: None,
            finished_at: None,
        }
    }
}

impl RunState {
    /// Fresh state for a run starting at `now`.
    pub fn started(now: DateTime<Utc>) -> Self {
        Self {
            status: RunStatus::Running,
            current_task: "Initializing...".to_string(),
            started_at: Some(now),
            ..Self::default()
        }
    }

    /// Fold `event` into the state and return the log line it produced.
    pub fn apply(&mut self, event: &PipelineEvent, now: DateTime<Utc>) -> String {
        match event {
            PipelineEvent::Discovered { new, .. } => self.total_articles += new,
            PipelineEvent::ArticleStarted { .. } => self.current_task = event.message(),
            PipelineEvent::ArticleAnalyzed { record } => {
                self.processed_articles += 1;
                self.results.push(record.clone());
            }
            PipelineEvent::ArticleSkipped { .. } | PipelineEvent::ArticleFailed { .. } => {
                self.processed_articles += 1
            }
            PipelineEvent::RunCompleted { .. } => {
                self.status = RunStatus::Completed;
                self.current_task = event.message();
                self.finished_at = Some(now);
            }
            _ => {}
        }
        self.progress = match (self.status, self.total_articles) {
            (RunStatus::Completed, _) => 100,
            (_, 0) => 0,
            (_, total) => (self.processed_articles.min(total) * 100 / total) as u8,
        };

        let line = format!(
            "[{}] {}",
            now.with_timezone(&Local).format("%H:%M:%S"),
            event.message()
        );
        self.logs.push(line.clone());
        line
    }
}

/// Shared handles for the dashboard handlers.
#[derive(Clone)]
pub struct AppState {
    run: Arc<RwLock<RunState>>,
    logs: broadcast::Sender<String>,
    profiles: Arc<Vec<SourceProfile>>,
    store: SeenUrlStore,
    fetcher: HttpFetcher,
    analyzer: Arc<Analyzer>,
}

impl AppState {
    pub fn new(
        profiles: Vec<SourceProfile>,
        store: SeenUrlStore,
        fetcher: HttpFetcher,
        analyzer: Analyzer,
    ) -> Self {
        let (logs, _) = broadcast::channel(LOG_CHANNEL_CAPACITY);
        Self {
            run: Arc::new(RwLock::new(RunState::default())),
            logs,
            profiles: Arc::new(profiles),
            store,
            fetcher,
            analyzer: Arc::new(analyzer),
        }
    }

    /// Fold `event` into the run state and broadcast its log line.
    ///
    /// The line is sent while the write lock is held, so a reader holding the
    /// read lock sees each line either in the backlog or on the channel.
    async fn publish(&self, event: &PipelineEvent) {
        let mut run = self.run.write().await;
        let line = run.apply(event, Utc::now());
        // No SSE subscribers is fine.
        let _ = self.logs.send(line);
    }

    /// Log lines so far plus a receiver for every later line, without overlap.
    async fn backlog_and_subscribe(&self) -> (Vec<String>, broadcast::Receiver<String>) {
        let run = self.run.read().await;
        (run.logs.clone(), self.logs.subscribe())
    }
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    status: &'static str,
    progress: u8,
    current_task: String,
    processed_articles: usize,
    total_articles: usize,
    sources: Vec<String>,
}

#[derive(Template)]
#[template(path = "results.html")]
struct ResultsTemplate {
    results: Vec<AnalysisRecord>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/start", post(start_handler))
        .route("/status", get(status_handler))
        .route("/logs", get(logs_handler))
        .route("/results", get(results_handler))
        .with_state(state)
}

/// Bind `host:port` and serve the dashboard until the process exits.
#[instrument(level = "info", skip(state))]
pub async fn serve(state: AppState, host: &str, port: u16) -> Result<(), Box<dyn Error>> {
    let listener = TcpListener::bind((host, port)).await?;
    info!(addr = %listener.local_addr()?, "Dashboard listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn index_handler(State(state): State<AppState>) -> Response {
    let run = state.run.read().await;
    render_html(IndexTemplate {
        status: run.status.label(),
        progress: run.progress,
        current_task: run.current_task.clone(),
        processed_articles: run.processed_articles,
        total_articles: run.total_articles,
        sources: state
            .profiles
            .iter()
            .filter(|p| p.enabled)
            .map(|p| p.display_name.clone())
            .collect(),
    })
}

async fn start_handler(State(state): State<AppState>) -> Response {
    {
        let mut run = state.run.write().await;
        if run.status == RunStatus::Running {
            return (
                StatusCode::CONFLICT,
                Json(json!({ "error": "Analysis already running" })),
            )
                .into_response();
        }
        *run = RunState::started(Utc::now());
    }
    tokio::spawn(run_in_background(state));
    Json(json!({ "status": "started" })).into_response()
}

async fn status_handler(State(state): State<AppState>) -> Json<RunState> {
    Json(state.run.read().await.clone())
}

async fn logs_handler(State(state): State<AppState>) -> impl IntoResponse {
    let (backlog, rx) = state.backlog_and_subscribe().await;
    let live = BroadcastStream::new(rx).filter_map(|result| result.ok());
    let stream = tokio_stream::iter(backlog)
        .chain(live)
        .map(|line| Ok::<_, Infallible>(Event::default().data(line)));

    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn results_handler(State(state): State<AppState>) -> Response {
    let results = state.run.read().await.results.clone();
    render_html(ResultsTemplate { results })
}

#[instrument(level = "info", skip_all)]
async fn run_in_background(state: AppState) {
    let (tx, mut rx) = mpsc::unbounded_channel::<PipelineEvent>();
    let consumer = {
        let state = state.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                state.publish(&event).await;
            }
        })
    };

    let events = EventSink::new(tx);
    let summary = run_all(
        &state.profiles,
        &state.store,
        &state.fetcher,
        state.analyzer.as_ref(),
        &events,
    )
    .await;
    drop(events);

    if let Err(e) = consumer.await {
        error!(error = %e, "Run state consumer stopped unexpectedly");
    }
    info!(analyzed = summary.analyzed(), "Dashboard run finished");
}

fn render_html<T: Template>(tpl: T) -> Response {
    match tpl.render() {
        Ok(html) => Html(html).into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Html(format!("Server error: {err}")),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::builtin_profiles;
    use axum::body::Body;
    use axum::http::{Request, header};
    use chrono::TimeZone;
    use http_body_util::BodyExt;
    use std::time::Duration;
    use tempfile::tempdir;
    use tower::ServiceExt;

    fn state(profiles: Vec<SourceProfile>, dir: &std::path::Path) -> AppState {
        let fetcher = HttpFetcher::new(Duration::from_secs(15)).unwrap();
        let gemini = GeminiAsk::new(reqwest::Client::new(), None, "test-model");
        AppState::new(
            profiles,
            SeenUrlStore::new(dir),
            fetcher,
            RetryAsk::new(gemini, 5, Duration::from_secs(1)),
        )
    }

    async fn body_text(resp: Response) -> String {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_req(uri: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn record(feature: Option<&str>) -> AnalysisRecord {
        AnalysisRecord {
            source_id: "grab".into(),
            url: "https://www.grab.com/sg/press/x/".into(),
            title: "Grab introduces <Dine-In>".into(),
            analysis: "Yes".into(),
            feature: feature.map(str::to_string),
            analyzed_at: Utc.with_ymd_and_hms(2025, 6, 11, 8, 0, 0).unwrap(),
            article_preview: "preview".into(),
        }
    }

    #[test]
    fn test_apply_tracks_progress_and_results() {
        let now = Utc::now();
        let mut run = RunState::started(now);

        run.apply(&PipelineEvent::Discovered { source_id: "grab".into(), new: 4 }, now);
        assert_eq!(run.total_articles, 4);

        run.apply(&PipelineEvent::ArticleAnalyzed { record: record(Some("Dine-In")) }, now);
        run.apply(
            &PipelineEvent::ArticleFailed {
                source_id: "grab".into(),
                url: "u".into(),
                error: "e".into(),
            },
            now,
        );
        assert_eq!(run.processed_articles, 2);
        assert_eq!(run.progress, 50);
        assert_eq!(run.results.len(), 1);
        assert_eq!(run.status, RunStatus::Running);

        let line = run.apply(&PipelineEvent::RunCompleted { analyzed: 1, failed: 1 }, now);
        assert!(line.starts_with('[') && line.ends_with("Analysis complete: 1 analyzed, 1 failed"));
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.progress, 100);
        assert_eq!(run.finished_at, Some(now));
        assert_eq!(run.logs.len(), 4);
    }

    #[tokio::test]
    async fn test_index_renders_dashboard() {
        let dir = tempdir().unwrap();
        let resp = app(state(builtin_profiles(), dir.path()))
            .oneshot(get_req("/"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let text = body_text(resp).await;
        assert!(text.contains("Competitor Watch"));
        assert!(text.contains("Grab"));
    }

    #[tokio::test]
    async fn test_status_starts_ready() {
        let dir = tempdir().unwrap();
        let resp = app(state(builtin_profiles(), dir.path()))
            .oneshot(get_req("/status"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE].to_str().unwrap(), "application/json");
        let json: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(json["status"], "ready");
        assert_eq!(json["progress"], 0);
        assert!(json["results"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_start_conflicts_while_running() {
        let dir = tempdir().unwrap();
        let state = state(builtin_profiles(), dir.path());
        *state.run.write().await = RunState::started(Utc::now());

        let resp = app(state).oneshot(post_req("/start")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        assert!(body_text(resp).await.contains("already running"));
    }

    #[tokio::test]
    async fn test_start_runs_to_completion() {
        let dir = tempdir().unwrap();
        let state = state(Vec::new(), dir.path());
        let router = app(state.clone());

        let resp = router.clone().oneshot(post_req("/start")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let mut status = RunStatus::Running;
        for _ in 0..100 {
            status = state.run.read().await.status;
            if status == RunStatus::Completed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(status, RunStatus::Completed);
        let run = state.run.read().await;
        assert!(run.logs.iter().any(|l| l.contains("Starting competitor analysis for 0 source(s)")));
        assert!(run.started_at.is_some() && run.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_results_page_escapes_and_lists_features() {
        let dir = tempdir().unwrap();
        let state = state(builtin_profiles(), dir.path());
        state.run.write().await.results = vec![record(Some("Dine-In")), record(None)];

        let resp = app(state).oneshot(get_req("/results")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let text = body_text(resp).await;
        assert!(text.contains("Grab introduces &lt;Dine-In&gt;"));
        assert!(text.contains("New feature: Dine-In"));
    }

    #[tokio::test]
    async fn test_log_lines_are_not_repeated_between_backlog_and_live() {
        let dir = tempdir().unwrap();
        let state = state(Vec::new(), dir.path());
        *state.run.write().await = RunState::started(Utc::now());

        state.publish(&PipelineEvent::RunStarted { sources: 1 }).await;
        let (backlog, mut rx) = state.backlog_and_subscribe().await;
        state
            .publish(&PipelineEvent::RunCompleted { analyzed: 0, failed: 0 })
            .await;

        assert_eq!(backlog.len(), 1);
        assert!(backlog[0].contains("Starting competitor analysis"));
        let live = rx.try_recv().unwrap();
        assert!(live.contains("Analysis complete"));
        assert!(rx.try_recv().is_err());
        assert_eq!(state.run.read().await.logs.len(), 2);
    }

    #[tokio::test]
    async fn test_logs_stream_is_event_stream() {
        let dir = tempdir().unwrap();
        let resp = app(state(builtin_profiles(), dir.path()))
            .oneshot(get_req("/logs"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE].to_str().unwrap(), "text/event-stream");
    }
}
