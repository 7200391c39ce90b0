//! Source registry and runtime settings.
//!
//! Source profiles come from an optional YAML registry file shaped like:
//!
//! ```yaml
//! sources:
//!   - source_id: grab
//!     display_name: Grab
//!     listing_url: https://www.grab.com/sg/press/
//!     link_selector: a.blogHyperlink
//!     cache_file_id: grab_articles
//! ```
//!
//! Omitted fields fall back to the defaults on [`SourceProfile`]. Without a
//! registry file the built-in Grab profile is used.

use crate::models::{ExtractionStrategy, PanelSelectors, SourceProfile, default_date_formats};
use serde::Deserialize;
use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;
use tracing::{info, instrument};

/// Shortest allowed per-request timeout.
pub const MIN_TIMEOUT_SECS: u64 = 15;
/// Longest allowed per-request timeout.
pub const MAX_TIMEOUT_SECS: u64 = 30;
/// Gemini model used when none is configured.
pub const DEFAULT_MODEL: &str = "gemini-1.5-pro";

#[derive(Debug, Deserialize)]
struct SourceRegistry {
    sources: Vec<SourceProfile>,
}

/// Profiles compiled into the binary.
pub fn builtin_profiles() -> Vec<SourceProfile> {
    vec![SourceProfile {
        source_id: "grab".to_string(),
        display_name: "Grab".to_string(),
        listing_url: "https://www.grab.com/sg/press/".to_string(),
        link_selector: "a.blogHyperlink".to_string(),
        cache_file_id: "grab_articles".to_string(),
        date_formats: default_date_formats(),
        limit: 10,
        enabled: true,
        strategy: ExtractionStrategy::StructuredPanel(PanelSelectors::default()),
    }]
}

/// Parse a YAML registry document into source profiles.
pub fn parse_registry(yaml: &str) -> Result<Vec<SourceProfile>, serde_yaml::Error> {
    let registry: SourceRegistry = serde_yaml::from_str(yaml)?;
    Ok(registry.sources)
}

/// Load the profiles from `path`, or the built-in ones when no path is given.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a valid registry.
#[instrument(level = "info")]
pub async fn load_profiles(path: Option<&str>) -> Result<Vec<SourceProfile>, Box<dyn Error>> {
    let Some(path) = path else {
        info!("No source registry given; using built-in profiles");
        return Ok(builtin_profiles());
    };
    let yaml = fs::read_to_string(path).await?;
    let profiles = parse_registry(&yaml)?;
    info!(count = profiles.len(), path, "Loaded source registry");
    Ok(profiles)
}

/// Settings shared by every run, assembled from the CLI.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory holding the seen-URL cache files.
    pub cache_dir: PathBuf,
    /// Per-request HTTP timeout, within [`MIN_TIMEOUT_SECS`]..=[`MAX_TIMEOUT_SECS`].
    pub timeout: Duration,
    pub gemini_api_key: Option<String>,
    pub model: String,
}

impl Settings {
    pub fn new(
        cache_dir: impl Into<PathBuf>,
        timeout_secs: u64,
        gemini_api_key: Option<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            timeout: Duration::from_secs(timeout_secs.clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS)),
            gemini_api_key: gemini_api_key.filter(|k| !k.trim().is_empty()),
            model: model.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_grab_profile() {
        let profiles = builtin_profiles();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].source_id, "grab");
        assert_eq!(profiles[0].limit, 10);
    }

    #[test]
    fn test_parse_registry_applies_defaults() {
        let yaml = r#"
sources:
  - source_id: grab
    display_name: Grab
    listing_url: https://www.grab.com/sg/press/
    link_selector: a.blogHyperlink
    cache_file_id: grab_articles
  - source_id: gojek
    display_name: Gojek
    listing_url: https://www.gojek.com/blog/
    link_selector: a[href]
    cache_file_id: gojek_articles
    limit: 5
    enabled: false
    strategy:
      kind: anchor_heuristic
"#;
        let profiles = parse_registry(yaml).unwrap();
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0], builtin_profiles()[0]);
        assert_eq!(profiles[1].limit, 5);
        assert!(!profiles[1].enabled);
        assert_eq!(profiles[1].strategy, ExtractionStrategy::anchor_heuristic());
    }

    #[test]
    fn test_parse_registry_rejects_missing_fields() {
        assert!(parse_registry("sources:\n  - source_id: x\n").is_err());
    }

    #[tokio::test]
    async fn test_load_profiles_without_path_uses_builtin() {
        let profiles = load_profiles(None).await.unwrap();
        assert_eq!(profiles, builtin_profiles());
    }

    #[tokio::test]
    async fn test_load_profiles_from_shipped_registry() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/sources.yaml");
        let profiles = load_profiles(Some(path)).await.unwrap();
        assert!(profiles.iter().any(|p| p.source_id == "grab"));
    }

    #[test]
    fn test_settings_clamp_timeout_and_blank_key() {
        let s = Settings::new(".", 5, Some("  ".to_string()), DEFAULT_MODEL);
        assert_eq!(s.timeout, Duration::from_secs(15));
        assert!(s.gemini_api_key.is_none());

        let s = Settings::new(".", 90, Some("key".to_string()), DEFAULT_MODEL);
        assert_eq!(s.timeout, Duration::from_secs(30));
        assert_eq!(s.gemini_api_key.as_deref(), Some("key"));
    }
}
