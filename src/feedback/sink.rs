//! Where quality records end up

use crate::error::AssistantError;
use crate::models::QualityRecord;
use crate::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

#[async_trait]
pub trait FeedbackSink: Send + Sync {
    async fn persist(&self, record: &QualityRecord) -> Result<()>;
}

/// One pretty-printed JSON file per record under `<dir>/quality_scores/`
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            dir: data_dir.join("quality_scores"),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_name(record: &QualityRecord) -> String {
        format!(
            "quality_{}_{}.json",
            record.timestamp.format("%Y%m%d_%H%M%S_%6f"),
            record.record_id.simple()
        )
    }
}

#[async_trait]
impl FeedbackSink for JsonFileSink {
    async fn persist(&self, record: &QualityRecord) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AssistantError::Persistence(format!("create {}: {}", self.dir.display(), e)))?;

        let path = self.dir.join(Self::file_name(record));
        let json = serde_json::to_vec_pretty(record)?;

        tokio::fs::write(&path, json)
            .await
            .map_err(|e| AssistantError::Persistence(format!("write {}: {}", path.display(), e)))?;

        debug!(path = %path.display(), "Quality record written");
        Ok(())
    }
}

/// Keeps records in memory; handy when no data directory is configured
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<QualityRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<QualityRecord> {
        self.records
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

#[async_trait]
impl FeedbackSink for MemorySink {
    async fn persist(&self, record: &QualityRecord) -> Result<()> {
        self.records
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(record.clone());
        Ok(())
    }
}
