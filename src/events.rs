//! Progress events emitted by the discovery and analysis pipeline.
//!
//! The pipeline keeps no run state of its own. Anything that wants to show
//! progress (the dashboard, a log line) subscribes to these events through an
//! [`EventSink`] and folds them however it likes.

use crate::models::{AnalysisRecord, FallbackReason};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    RunStarted {
        sources: usize,
    },
    CacheLoaded {
        source_id: String,
        seen: usize,
    },
    ListingFetched {
        source_id: String,
        parsed: usize,
    },
    ListingFellBack {
        source_id: String,
        reason: FallbackReason,
        records: usize,
    },
    /// New (unseen) records queued for analysis.
    Discovered {
        source_id: String,
        new: usize,
    },
    /// `index` is 1-based within the source's queue.
    ArticleStarted {
        source_id: String,
        index: usize,
        total: usize,
        url: String,
        title: String,
    },
    ArticleSkipped {
        source_id: String,
        url: String,
        reason: String,
    },
    ArticleAnalyzed {
        record: AnalysisRecord,
    },
    ArticleFailed {
        source_id: String,
        url: String,
        error: String,
    },
    RunCompleted {
        analyzed: usize,
        failed: usize,
    },
}

impl PipelineEvent {
    /// One human-readable line describing the event.
    pub fn message(&self) -> String {
        match self {
            PipelineEvent::RunStarted { sources } => {
                format!("Starting competitor analysis for {sources} source(s)")
            }
            PipelineEvent::CacheLoaded { source_id, seen } => {
                format!("[{source_id}] {seen} article(s) already processed")
            }
            PipelineEvent::ListingFetched { source_id, parsed } => {
                format!("[{source_id}] Parsed {parsed} article(s) from listing page")
            }
            PipelineEvent::ListingFellBack {
                source_id,
                reason,
                records,
            } => format!("[{source_id}] Using {records} demo article(s): {reason}"),
            PipelineEvent::Discovered { source_id, new } => {
                format!("[{source_id}] {new} new article(s) to analyze")
            }
            PipelineEvent::ArticleStarted {
                source_id,
                index,
                total,
                title,
                ..
            } => format!("[{source_id}] Processing article {index}/{total}: {title}"),
            PipelineEvent::ArticleSkipped {
                source_id,
                url,
                reason,
            } => format!("[{source_id}] Skipped {url}: {reason}"),
            PipelineEvent::ArticleAnalyzed { record } => match &record.feature {
                Some(name) => format!("[{}] New feature detected: {name}", record.source_id),
                None => format!("[{}] Analysis complete: {}", record.source_id, record.title),
            },
            PipelineEvent::ArticleFailed {
                source_id,
                url,
                error,
            } => format!("[{source_id}] Analysis failed for {url}: {error}"),
            PipelineEvent::RunCompleted { analyzed, failed } => {
                format!("Analysis complete: {analyzed} analyzed, {failed} failed")
            }
        }
    }
}

/// Optional sender for [`PipelineEvent`]s.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<UnboundedSender<PipelineEvent>>,
}

impl EventSink {
    pub fn new(tx: UnboundedSender<PipelineEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that drops every event.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Send `event` if anyone is listening; a closed receiver is ignored.
    pub fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}
