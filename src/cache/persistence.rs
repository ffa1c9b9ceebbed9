//! Best-effort JSON file persistence for a cache level
//!
//! Memory is authoritative. A file that cannot be read starts the level
//! empty; a file that cannot be written is logged by the caller and ignored.

use crate::cache::entry::CacheEntry;
use crate::models::CacheLevel;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Serialize, Deserialize)]
struct CacheSnapshot {
    level: CacheLevel,
    saved_at: DateTime<Utc>,
    entries: Vec<CacheEntry>,
}

#[derive(Debug, Clone)]
pub struct CacheFile {
    level: CacheLevel,
    path: PathBuf,
}

impl CacheFile {
    /// `<dir>/<cache_name>.json`
    pub fn new(dir: &Path, level: CacheLevel) -> Self {
        Self {
            level,
            path: dir.join(format!("{}.json", level.cache_name())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load persisted entries, dropping expired ones. Never fails.
    pub async fn load(&self) -> Vec<CacheEntry> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(cache = %self.level, "No persisted cache found, starting empty");
                return Vec::new();
            }
            Err(e) => {
                warn!(cache = %self.level, path = %self.path.display(), "Failed to read cache file: {}", e);
                return Vec::new();
            }
        };

        let snapshot: CacheSnapshot = match serde_json::from_slice(&bytes) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(cache = %self.level, path = %self.path.display(), "Ignoring malformed cache file: {}", e);
                return Vec::new();
            }
        };

        let now = Utc::now();
        let total = snapshot.entries.len();
        let entries: Vec<CacheEntry> = snapshot
            .entries
            .into_iter()
            .filter(|e| !e.is_expired_at(now))
            .collect();

        info!(
            cache = %self.level,
            loaded = entries.len(),
            expired = total - entries.len(),
            "Loaded persisted cache"
        );

        entries
    }

    /// Rewrite the whole file via a temp file + rename
    pub async fn save(&self, entries: Vec<CacheEntry>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let count = entries.len();
        let snapshot = CacheSnapshot {
            level: self.level,
            saved_at: Utc::now(),
            entries,
        };
        let json = serde_json::to_vec_pretty(&snapshot)?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(cache = %self.level, entries = count, "Saved cache file");
        Ok(())
    }

    pub async fn remove(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::CacheValue;
    use std::time::Duration;

    fn entry(key: &str, ttl: Duration) -> CacheEntry {
        CacheEntry::new(
            key.to_string(),
            vec![0.6, 0.8],
            CacheValue::Context(vec![format!("context for {}", key)]),
            ttl,
        )
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let file = CacheFile::new(dir.path(), CacheLevel::Rag);

        file.save(vec![entry("what is an etf", Duration::from_secs(3600))])
            .await
            .unwrap();
        assert!(file.path().ends_with("rag_cache.json"));

        let loaded = file.load().await;
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].key_text, "what is an etf");
    }

    #[tokio::test]
    async fn test_load_drops_expired_entries() {
        let dir = tempfile::tempdir().unwrap();
        let file = CacheFile::new(dir.path(), CacheLevel::Response);

        let mut stale = entry("stale", Duration::from_secs(10));
        stale.created_at = Utc::now() - chrono::Duration::seconds(60);
        let fresh = entry("fresh", Duration::from_secs(3600));

        file.save(vec![stale, fresh]).await.unwrap();

        let loaded = file.load().await;
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].key_text, "fresh");
    }

    #[tokio::test]
    async fn test_missing_and_malformed_files_load_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = CacheFile::new(dir.path(), CacheLevel::Rag);
        assert!(file.load().await.is_empty());

        tokio::fs::write(file.path(), b"{ not json").await.unwrap();
        assert!(file.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let file = CacheFile::new(dir.path(), CacheLevel::Rag);
        file.remove().await.unwrap();

        file.save(vec![]).await.unwrap();
        file.remove().await.unwrap();
        assert!(!file.path().exists());
    }
}
