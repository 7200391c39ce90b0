//! LLM analysis of article text, with exponential backoff retry logic.
//!
//! # Architecture
//!
//! - [`AskAsync`]: core trait for "send text, get analysis back"
//! - [`GeminiAsk`]: calls the Gemini `generateContent` REST endpoint
//! - [`RetryAsk`]: decorator adding retries to any [`AskAsync`]
//!
//! # Retry Strategy
//!
//! - Maximum 5 retry attempts
//! - Exponential backoff starting at 1 second
//! - Maximum delay capped at 30 seconds
//! - Random jitter (0-250ms) added to prevent thundering herd
//!
//! Errors that retrying cannot fix ([`AnalysisError::MissingApiKey`],
//! [`AnalysisError::EmptyText`]) are returned immediately.

use rand::{Rng, rng};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use thiserror::Error as ThisError;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

/// Error type crossing the analysis boundary; `Send + Sync` so runs can be spawned.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Most characters of article text sent for analysis.
pub const MAX_ANALYSIS_CHARS: usize = 4000;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Competitive-intelligence prompt; `{article_text}` is replaced by the article.
pub const ANALYSIS_PROMPT: &str = r#"
You are an expert product analyst focused on identifying new features and product releases from competitor announcements.

Please analyze the following article text and provide a structured analysis:

ARTICLE TEXT:
{article_text}

Please provide your analysis in the following format:

**FEATURE ANALYSIS:**
- Is this announcing a new feature or product? (Yes/No)
- Feature/Product Name: [Name if applicable]
- Category: [e.g., Food Delivery, Transportation, Payments, etc.]
- Target Market: [e.g., Singapore, Malaysia, Southeast Asia]

**SUMMARY:**
[2-3 sentence summary of what this announcement contains]

**COMPETITIVE INTELLIGENCE:**
[Key insights about what this means for competitors in the market]

**RELEVANCE SCORE:** [1-10, where 10 is highly relevant new feature announcement]

Only respond with the structured analysis above. Be concise but thorough."#;

const LAUNCH_KEYWORDS: [&str; 5] = [
    "new feature",
    "product launch",
    "announcing",
    "introduces",
    "launches",
];

#[derive(Debug, ThisError)]
pub enum AnalysisError {
    #[error("Gemini API key not configured")]
    MissingApiKey,
    #[error("no article text provided")]
    EmptyText,
    #[error("empty response from Gemini")]
    EmptyResponse,
    #[error("Gemini analysis failed: {0}")]
    Api(String),
}

impl AnalysisError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AnalysisError::EmptyResponse | AnalysisError::Api(_))
    }
}

/// Trait for async LLM interaction.
pub trait AskAsync {
    /// The type of response returned by the LLM.
    type Response;

    /// Send text to the LLM and receive a response.
    async fn ask(&self, text: &str) -> Result<Self::Response, BoxError>;
}

/// Wrapper that adds exponential backoff retry logic to any [`AskAsync`] implementation.
///
/// The delay between retries follows this formula:
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryAsk<T> {
    inner: T,
    max_retries: usize,
    base_delay: StdDuration,
    max_delay: StdDuration,
}

impl<T> RetryAsk<T>
where
    T: AskAsync,
{
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }

    /// Delay before retry number `attempt` (1-based), without jitter.
    fn backoff(&self, attempt: usize) -> StdDuration {
        let shift = (attempt.saturating_sub(1)).min(16) as u32;
        self.base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay)
    }
}

impl<T> fmt::Debug for RetryAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAsk")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> AskAsync for RetryAsk<T>
where
    T: AskAsync,
{
    type Response = T::Response;

    #[instrument(level = "info", skip_all)]
    async fn ask(&self, text: &str) -> Result<Self::Response, BoxError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            let e = match self.inner.ask(text).await {
                Ok(resp) => return Ok(resp),
                Err(e) => e,
            };
            attempt += 1;
            let attempt_dt = attempt_t0.elapsed();
            let total_dt = total_t0.elapsed();

            let permanent = e
                .downcast_ref::<AnalysisError>()
                .is_some_and(|ae| !ae.is_retryable());
            if permanent || attempt > self.max_retries {
                error!(
                    attempt,
                    max = self.max_retries,
                    permanent,
                    elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                    elapsed_ms_total = total_dt.as_millis() as u64,
                    error = %e,
                    "ask() giving up"
                );
                return Err(e);
            }

            let jitter_ms: u64 = rng().random_range(0..=250);
            let delay = self.backoff(attempt) + StdDuration::from_millis(jitter_ms);

            warn!(
                attempt,
                max = self.max_retries,
                elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                elapsed_ms_total = total_dt.as_millis() as u64,
                ?delay,
                error = %e,
                "ask() attempt failed; backing off"
            );
            sleep(delay).await;
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

impl GenerateResponse {
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.iter().map(|p| p.text.as_str()).collect::<String>())
            .unwrap_or_default()
    }
}

/// [`AskAsync`] over the Gemini `generateContent` REST endpoint.
#[derive(Clone)]
pub struct GeminiAsk {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl fmt::Debug for GeminiAsk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiAsk")
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl GeminiAsk {
    pub fn new(client: reqwest::Client, api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            api_key,
            model: model.into(),
            base_url: GEMINI_BASE_URL.to_string(),
        }
    }

    /// Point the client at another API root (used by tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self, key: &str) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url.trim_end_matches('/'),
            self.model,
            urlencoding::encode(key)
        )
    }
}

impl AskAsync for GeminiAsk {
    type Response = String;

    #[instrument(level = "info", skip_all, fields(model = %self.model))]
    async fn ask(&self, text: &str) -> Result<Self::Response, BoxError> {
        let key = self.api_key.as_deref().ok_or(AnalysisError::MissingApiKey)?;
        if text.trim().is_empty() {
            return Err(AnalysisError::EmptyText.into());
        }

        let prompt = ANALYSIS_PROMPT.replace("{article_text}", text);
        let body = GenerateRequest {
            contents: [Content {
                parts: [Part { text: &prompt }],
            }],
        };

        let t0 = Instant::now();
        let resp = self
            .client
            .post(self.endpoint(key))
            .json(&body)
            .send()
            .await
            .map_err(|e| AnalysisError::Api(e.without_url().to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), elapsed_ms = t0.elapsed().as_millis() as u64, "API call failed");
            return Err(AnalysisError::Api(format!("HTTP {status}: {}", detail.trim())).into());
        }
        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| AnalysisError::Api(e.without_url().to_string()))?;

        let analysis = parsed.text();
        if analysis.trim().is_empty() {
            return Err(AnalysisError::EmptyResponse.into());
        }
        info!(
            chars = analysis.chars().count(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Analysis completed"
        );
        Ok(analysis)
    }
}

/// If `analysis` reads as a feature or product launch, return the feature name.
///
/// The name comes from the `Feature/Product Name:` line, or `Unknown Feature`.
pub fn detect_feature_announcement(analysis: &str) -> Option<String> {
    let lower = analysis.to_lowercase();
    let is_launch = lower.contains("yes") && LAUNCH_KEYWORDS.iter().any(|k| lower.contains(k));
    if !is_launch {
        return None;
    }
    let name = analysis
        .lines()
        .find(|line| line.to_lowercase().contains("feature/product name:"))
        .and_then(|line| line.split_once(':'))
        .map(|(_, value)| value.trim().trim_matches('*').trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "Unknown Feature".to_string());
    Some(name)
}
