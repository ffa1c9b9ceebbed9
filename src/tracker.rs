//! Per-agent performance tracking with exponential moving averages
//!
//! Written only by the feedback worker, read by the API. Each update swaps
//! in a fresh `Arc<PerformanceStats>` so readers never see a half-applied
//! sample.

use crate::models::PerformanceStats;
use crate::Result;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub const DEFAULT_ALPHA: f64 = 0.1;

/// `alpha * sample + (1 - alpha) * previous`
pub fn ema(previous: f64, sample: f64, alpha: f64) -> f64 {
    alpha * sample + (1.0 - alpha) * previous
}

pub struct PerformanceTracker {
    alpha: f64,
    stats: RwLock<HashMap<String, Arc<PerformanceStats>>>,
    file: Option<PathBuf>,
}

impl PerformanceTracker {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(f64::EPSILON, 1.0),
            stats: RwLock::new(HashMap::new()),
            file: None,
        }
    }

    /// Persist under `<data_dir>/performance_metrics/current_metrics.json`,
    /// loading whatever is already there
    pub async fn persisted_in(mut self, data_dir: &Path) -> Self {
        let file = data_dir.join("performance_metrics").join("current_metrics.json");

        match tokio::fs::read(&file).await {
            Ok(bytes) => match serde_json::from_slice::<BTreeMap<String, PerformanceStats>>(&bytes) {
                Ok(loaded) => {
                    info!(agents = loaded.len(), "Loaded performance metrics");
                    let stats = self.stats.get_mut();
                    for (agent, s) in loaded {
                        stats.insert(agent, Arc::new(s));
                    }
                }
                Err(e) => warn!(path = %file.display(), "Ignoring malformed metrics file: {}", e),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %file.display(), "Failed to read metrics file: {}", e),
        }

        self.file = Some(file);
        self
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Fold one sample into `agent`'s averages. The first sample seeds them.
    pub async fn record(&self, agent: &str, success: bool, latency: Duration, quality: Option<f32>) {
        let success = if success { 1.0 } else { 0.0 };
        let latency = latency.as_secs_f64();

        let updated = {
            let mut stats = self.stats.write().await;
            let next = match stats.get(agent) {
                Some(prev) => {
                    let (avg_quality_ema, quality_samples) = match quality.map(f64::from) {
                        // the first rated sample seeds the average
                        Some(q) if prev.quality_samples == 0 => (q, 1),
                        Some(q) => (
                            ema(prev.avg_quality_ema, q, self.alpha),
                            prev.quality_samples + 1,
                        ),
                        None => (prev.avg_quality_ema, prev.quality_samples),
                    };
                    PerformanceStats {
                        success_rate_ema: ema(prev.success_rate_ema, success, self.alpha),
                        avg_latency_ema: ema(prev.avg_latency_ema, latency, self.alpha),
                        avg_quality_ema,
                        sample_count: prev.sample_count + 1,
                        quality_samples,
                        updated_at: Utc::now(),
                    }
                }
                None => PerformanceStats {
                    success_rate_ema: success,
                    avg_latency_ema: latency,
                    avg_quality_ema: quality.map(f64::from).unwrap_or(0.0),
                    sample_count: 1,
                    quality_samples: u64::from(quality.is_some()),
                    updated_at: Utc::now(),
                },
            };

            debug!(
                agent,
                success = next.success_rate_ema,
                latency = next.avg_latency_ema,
                quality = next.avg_quality_ema,
                "Updated performance metrics"
            );

            stats.insert(agent.to_string(), Arc::new(next));
            stats
                .iter()
                .map(|(k, v)| (k.clone(), PerformanceStats::clone(v)))
                .collect::<BTreeMap<_, _>>()
        };

        if let Err(e) = self.save(&updated).await {
            warn!("Failed to persist performance metrics: {}", e);
        }
    }

    pub async fn snapshot(&self, agent: &str) -> Option<PerformanceStats> {
        self.stats
            .read()
            .await
            .get(agent)
            .map(|s| PerformanceStats::clone(s))
    }

    pub async fn snapshot_all(&self) -> BTreeMap<String, PerformanceStats> {
        self.stats
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), PerformanceStats::clone(v)))
            .collect()
    }

    async fn save(&self, snapshot: &BTreeMap<String, PerformanceStats>) -> Result<()> {
        let Some(file) = &self.file else {
            return Ok(());
        };

        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = file.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(snapshot)?).await?;
        tokio::fs::rename(&tmp, file).await?;
        Ok(())
    }
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        Self::new(DEFAULT_ALPHA)
    }
}
