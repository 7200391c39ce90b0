//! Seen-URL cache: which article URLs have already been analysed, per source.
//!
//! Each source owns one plain-text file, `<cache_dir>/<cache_file_id>.txt`,
//! holding one URL per line in append order. The file is UTF-8, has no
//! header, and blank lines are ignored on read.
//!
//! Reads and writes never fail the caller. A missing or unreadable file
//! loads as an empty set, and a failed append is logged and dropped; the
//! article may then be analysed again on a later run.

use crate::models::SourceProfile;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

/// URLs already processed for one source.
pub type SeenUrlSet = HashSet<String>;

/// File-backed, append-only store of processed article URLs.
#[derive(Debug, Clone)]
pub struct SeenUrlStore {
    dir: PathBuf,
}

impl SeenUrlStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the cache file backing `profile`.
    pub fn path_for(&self, profile: &SourceProfile) -> PathBuf {
        self.dir.join(format!("{}.txt", profile.cache_file_id))
    }

    /// Load the persisted URL set for `profile`.
    ///
    /// Returns an empty set when the file does not exist or cannot be read.
    #[instrument(level = "info", skip_all, fields(source_id = %profile.source_id))]
    pub async fn load(&self, profile: &SourceProfile) -> SeenUrlSet {
        let path = self.path_for(profile);
        match fs::read_to_string(&path).await {
            Ok(text) => {
                let seen: SeenUrlSet = text
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(str::to_string)
                    .collect();
                info!(path = %path.display(), count = seen.len(), "Loaded seen-URL cache");
                seen
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No seen-URL cache yet; starting empty");
                SeenUrlSet::new()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not read seen-URL cache; treating as empty");
                SeenUrlSet::new()
            }
        }
    }

    /// Append `url` to the cache file for `profile`.
    ///
    /// Redundant calls are harmless: duplicates collapse when the file is loaded.
    #[instrument(level = "info", skip_all, fields(source_id = %profile.source_id, %url))]
    pub async fn mark_seen(&self, profile: &SourceProfile, url: &str) {
        let path = self.path_for(profile);
        if let Err(e) = self.append_line(&path, url).await {
            warn!(path = %path.display(), error = %e, "Could not append to seen-URL cache");
        } else {
            debug!(path = %path.display(), "Marked URL as seen");
        }
    }

    async fn append_line(&self, path: &Path, url: &str) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(format!("{url}\n").as_bytes()).await?;
        file.flush().await
    }
}
