//! L1 (retrieved context) + L2 (complete answers) behind one handle

use crate::cache::entry::CacheValue;
use crate::cache::store::{CacheStats, SemanticCache};
use crate::embedding::Embedder;
use crate::models::{AgentDomain, CacheLevel};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Which levels a clear applies to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheScope {
    #[default]
    All,
    Rag,
    Response,
}

impl CacheScope {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "all" => Some(CacheScope::All),
            "rag" | "l1" => Some(CacheScope::Rag),
            "response" | "llm" | "l2" => Some(CacheScope::Response),
            _ => None,
        }
    }
}

/// Both levels plus their combined counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwoLevelStats {
    pub rag: CacheStats,
    pub response: CacheStats,
}

pub struct TwoLevelCache {
    rag: SemanticCache,
    response: SemanticCache,
}

impl TwoLevelCache {
    pub fn new(rag: SemanticCache, response: SemanticCache) -> Self {
        Self { rag, response }
    }

    /// In-memory levels with default thresholds sharing one embedder
    pub fn in_memory(embedder: Arc<dyn Embedder>) -> Self {
        Self::new(
            SemanticCache::new(CacheLevel::Rag, embedder.clone()),
            SemanticCache::new(CacheLevel::Response, embedder),
        )
    }

    /// Default-threshold levels persisted under `dir`
    pub async fn persisted_in(dir: &Path, embedder: Arc<dyn Embedder>) -> Self {
        Self::new(
            SemanticCache::new(CacheLevel::Rag, embedder.clone())
                .persisted_in(dir)
                .await,
            SemanticCache::new(CacheLevel::Response, embedder)
                .persisted_in(dir)
                .await,
        )
    }

    pub fn rag(&self) -> &SemanticCache {
        &self.rag
    }

    pub fn response(&self) -> &SemanticCache {
        &self.response
    }

    pub async fn get_rag_context(&self, query: &str) -> Option<Vec<String>> {
        let hit = self.rag.lookup(query).await?;
        hit.entry.value.as_context().map(<[String]>::to_vec)
    }

    pub async fn set_rag_context(&self, query: &str, chunks: Vec<String>) -> bool {
        self.rag.insert(query, CacheValue::Context(chunks)).await
    }

    /// Answers are partitioned by agent so one domain never serves another's
    pub async fn get_response(&self, domain: AgentDomain, query: &str) -> Option<String> {
        let hit = self.response.lookup_in(domain.as_str(), query).await?;
        hit.entry.value.as_response().map(str::to_string)
    }

    pub async fn set_response(&self, domain: AgentDomain, query: &str, answer: &str) -> bool {
        self.response
            .insert_in(domain.as_str(), query, CacheValue::Response(answer.to_string()))
            .await
    }

    pub async fn stats(&self) -> TwoLevelStats {
        TwoLevelStats {
            rag: self.rag.stats().await,
            response: self.response.stats().await,
        }
    }

    pub async fn clear(&self, scope: CacheScope) {
        match scope {
            CacheScope::All => {
                self.rag.clear().await;
                self.response.clear().await;
            }
            CacheScope::Rag => self.rag.clear().await,
            CacheScope::Response => self.response.clear().await,
        }
    }

    /// Sweep both levels, returning the total number removed
    pub async fn evict_expired(&self) -> usize {
        self.rag.evict_expired().await + self.response.evict_expired().await
    }

    /// Run `evict_expired` every `every` until `shutdown` flips to true
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        every: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // first tick completes immediately
            ticker.tick().await;
            info!(interval_secs = every.as_secs(), "Cache sweeper started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = cache.evict_expired().await;
                        debug!(evicted, "Cache sweep complete");
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Cache sweeper stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AssistantError;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct TableEmbedder(HashMap<String, Vec<f32>>);

    #[async_trait]
    impl Embedder for TableEmbedder {
        fn name(&self) -> &'static str {
            "table"
        }

        async fn embed(&self, text: &str) -> crate::Result<Vec<f32>> {
            self.0
                .get(text)
                .cloned()
                .ok_or_else(|| AssistantError::Embedding(text.to_string()))
        }
    }

    fn at(similarity: f32) -> Vec<f32> {
        vec![similarity, (1.0 - similarity * similarity).sqrt()]
    }

    fn embedder() -> Arc<dyn Embedder> {
        Arc::new(TableEmbedder(
            [
                ("how do etfs work", vec![1.0, 0.0]),
                ("how do exchange traded funds work", at(0.93)),
                ("tell me about etfs and taxes", at(0.80)),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
        ))
    }

    #[tokio::test]
    async fn test_rephrasing_between_thresholds_hits_only_l2() {
        let cache = TwoLevelCache::in_memory(embedder());
        cache
            .set_rag_context("how do etfs work", vec!["[Source 1: ETFs]\nFunds that trade.".into()])
            .await;
        cache
            .set_response(
                AgentDomain::Finance,
                "how do etfs work",
                "ETFs are baskets that trade like stocks.",
            )
            .await;

        // 0.93: below L1's 0.95, above L2's 0.92
        let q = "how do exchange traded funds work";
        assert!(cache.get_rag_context(q).await.is_none());
        assert_eq!(
            cache.get_response(AgentDomain::Finance, q).await.as_deref(),
            Some("ETFs are baskets that trade like stocks.")
        );

        // 0.80: misses both
        let q = "tell me about etfs and taxes";
        assert!(cache.get_rag_context(q).await.is_none());
        assert!(cache.get_response(AgentDomain::Finance, q).await.is_none());

        let stats = cache.stats().await;
        assert_eq!(stats.rag.hits, 0);
        assert_eq!(stats.response.hits, 1);
    }

    #[tokio::test]
    async fn test_clear_scopes() {
        let cache = TwoLevelCache::in_memory(embedder());
        cache.set_rag_context("how do etfs work", vec!["ctx".into()]).await;
        cache
            .set_response(AgentDomain::Finance, "how do etfs work", "answer")
            .await;

        cache.clear(CacheScope::Rag).await;
        assert!(cache.rag().is_empty().await);
        assert_eq!(cache.response().len().await, 1);

        cache.clear(CacheScope::All).await;
        assert!(cache.response().is_empty().await);
    }

    #[tokio::test]
    async fn test_response_level_is_partitioned_by_domain() {
        let cache = TwoLevelCache::in_memory(embedder());
        cache
            .set_response(AgentDomain::Finance, "how do etfs work", "finance answer")
            .await;

        let q = "how do exchange traded funds work";
        assert!(cache.get_response(AgentDomain::Tax, q).await.is_none());
        assert!(cache.get_response(AgentDomain::Tax, "how do etfs work").await.is_none());
        assert_eq!(
            cache.get_response(AgentDomain::Finance, q).await.as_deref(),
            Some("finance answer")
        );
    }

    #[test]
    fn test_scope_parse() {
        assert_eq!(CacheScope::parse("ALL"), Some(CacheScope::All));
        assert_eq!(CacheScope::parse("llm"), Some(CacheScope::Response));
        assert_eq!(CacheScope::parse("rag"), Some(CacheScope::Rag));
        assert_eq!(CacheScope::parse("disk"), None);
    }

    #[tokio::test]
    async fn test_sweeper_evicts_and_stops() {
        let cache = Arc::new(TwoLevelCache::in_memory(embedder()));
        cache
            .rag()
            .insert_with_ttl("how do etfs work", CacheValue::Context(vec![]), Duration::ZERO)
            .await;

        let (tx, rx) = watch::channel(false);
        let handle = cache.spawn_sweeper(Duration::from_millis(10), rx);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(cache.rag().is_empty().await);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
