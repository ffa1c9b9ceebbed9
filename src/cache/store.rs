//! Semantic cache for a single level
//!
//! Entries are keyed by scope and exact query text; lookups match by
//! embedding similarity against every live entry in the same scope.

use crate::cache::entry::{CacheEntry, CacheValue};
use crate::cache::persistence::CacheFile;
use crate::cache::similarity::cosine_similarity;
use crate::embedding::Embedder;
use crate::models::CacheLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Counters for one cache level
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheStats {
    pub level: CacheLevel,
    pub threshold: f32,
    pub entries: usize,
    pub total_queries: u64,
    pub hits: u64,
    pub misses: u64,
    /// Percent of lookups that hit
    pub hit_rate: f64,
    pub evictions: u64,
}

/// A matched entry and the score it matched with
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub entry: CacheEntry,
    pub similarity: f32,
}

pub struct SemanticCache {
    level: CacheLevel,
    threshold: f32,
    default_ttl: Duration,
    max_entries: usize,
    embedder: Arc<dyn Embedder>,
    // keyed by `CacheEntry::id`
    entries: RwLock<HashMap<String, CacheEntry>>,
    file: Option<CacheFile>,
    // serialises snapshot + write so files never go backwards
    save_lock: Mutex<()>,
    total_queries: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl SemanticCache {
    pub fn new(level: CacheLevel, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            level,
            threshold: level.default_threshold(),
            default_ttl: DEFAULT_TTL,
            max_entries: DEFAULT_MAX_ENTRIES,
            embedder,
            entries: RwLock::new(HashMap::new()),
            file: None,
            save_lock: Mutex::new(()),
            total_queries: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    /// Back this level with `<dir>/<cache_name>.json` and load what is there
    pub async fn persisted_in(mut self, dir: &Path) -> Self {
        let file = CacheFile::new(dir, self.level);
        let loaded = file.load().await;

        let entries = self.entries.get_mut();
        for entry in loaded {
            let scope = entry.scope.clone();
            let entry = entry.in_scope(&scope);
            entries.insert(entry.id.clone(), entry);
        }

        self.file = Some(file);
        self
    }

    pub fn level(&self) -> CacheLevel {
        self.level
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Best live entry with similarity >= threshold in the unscoped partition
    pub async fn lookup(&self, query: &str) -> Option<CacheHit> {
        self.lookup_in("", query).await
    }

    /// Best live entry with similarity >= threshold among entries in `scope`
    pub async fn lookup_in(&self, scope: &str, query: &str) -> Option<CacheHit> {
        self.total_queries.fetch_add(1, Ordering::Relaxed);

        if self.entries.read().await.is_empty() {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(cache = %self.level, "Cache miss (empty)");
            return None;
        }

        let embedding = match self.embedder.embed(query).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!(cache = %self.level, "Embedding failed during lookup, treating as miss: {}", e);
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        self.lookup_embedding(scope, &embedding).await
    }

    async fn lookup_embedding(&self, scope: &str, embedding: &[f32]) -> Option<CacheHit> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;

        let evicted = Self::remove_expired(&mut entries, now);
        if evicted > 0 {
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
            debug!(cache = %self.level, evicted, "Evicted expired entries on lookup");
        }

        let best = best_match(&entries, scope, embedding);

        match best {
            Some((key, similarity)) if similarity >= self.threshold => {
                let entry = entries.get_mut(&key)?;
                entry.mark_accessed();
                self.hits.fetch_add(1, Ordering::Relaxed);
                info!(
                    cache = %self.level,
                    scope,
                    similarity = similarity,
                    matched = %entry.key_text,
                    "Cache hit"
                );
                Some(CacheHit {
                    entry: entry.clone(),
                    similarity,
                })
            }
            best => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                info!(
                    cache = %self.level,
                    scope,
                    best_similarity = best.map(|(_, s)| s).unwrap_or(0.0),
                    threshold = self.threshold,
                    "Cache miss"
                );
                None
            }
        }
    }

    pub async fn insert(&self, query: &str, value: CacheValue) -> bool {
        self.store("", query, value, self.default_ttl).await
    }

    pub async fn insert_with_ttl(&self, query: &str, value: CacheValue, ttl: Duration) -> bool {
        self.store("", query, value, ttl).await
    }

    /// Insert into `scope` with the default ttl
    pub async fn insert_in(&self, scope: &str, query: &str, value: CacheValue) -> bool {
        self.store(scope, query, value, self.default_ttl).await
    }

    /// Store `value` under `(scope, query)`, replacing any entry with the same
    /// key. Returns `false` when the query could not be embedded.
    async fn store(&self, scope: &str, query: &str, value: CacheValue, ttl: Duration) -> bool {
        let embedding = match self.embedder.embed(query).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!(cache = %self.level, "Embedding failed, skipping insert: {}", e);
                return false;
            }
        };

        let entry = CacheEntry::new(query.to_string(), embedding, value, ttl).in_scope(scope);

        {
            let mut entries = self.entries.write().await;
            if entries.insert(entry.id.clone(), entry).is_some() {
                debug!(cache = %self.level, "Replaced existing entry");
            }
            if entries.len() > self.max_entries {
                self.evict_oldest(&mut entries);
            }
        }

        debug!(cache = %self.level, scope, "Inserted entry");
        self.persist().await;
        true
    }

    /// Remove every expired entry, returning how many went
    pub async fn evict_expired(&self) -> usize {
        let evicted = {
            let mut entries = self.entries.write().await;
            Self::remove_expired(&mut entries, Utc::now())
        };

        if evicted > 0 {
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
            info!(cache = %self.level, evicted, "Evicted expired entries");
            self.persist().await;
        }
        evicted
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drop every entry, reset counters and delete the backing file
    pub async fn clear(&self) {
        let _guard = self.save_lock.lock().await;
        let removed = {
            let mut entries = self.entries.write().await;
            let removed = entries.len();
            entries.clear();
            removed
        };

        self.total_queries.store(0, Ordering::Relaxed);
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);

        if let Some(file) = &self.file {
            if let Err(e) = file.remove().await {
                warn!(cache = %self.level, "Failed to delete cache file: {}", e);
            }
        }
        info!(cache = %self.level, removed, "Cache cleared");
    }

    pub async fn stats(&self) -> CacheStats {
        let total_queries = self.total_queries.load(Ordering::Relaxed);
        let hits = self.hits.load(Ordering::Relaxed);
        let hit_rate = if total_queries > 0 {
            hits as f64 * 100.0 / total_queries as f64
        } else {
            0.0
        };

        CacheStats {
            level: self.level,
            threshold: self.threshold,
            entries: self.len().await,
            total_queries,
            hits,
            misses: self.misses.load(Ordering::Relaxed),
            hit_rate,
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    async fn persist(&self) {
        let Some(file) = &self.file else {
            return;
        };

        let _guard = self.save_lock.lock().await;
        let snapshot: Vec<CacheEntry> = self.entries.read().await.values().cloned().collect();

        if let Err(e) = file.save(snapshot).await {
            warn!(
                cache = %self.level,
                path = %file.path().display(),
                "Failed to persist cache, continuing in memory: {}",
                e
            );
        }
    }

    fn remove_expired(entries: &mut HashMap<String, CacheEntry>, now: DateTime<Utc>) -> usize {
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        before - entries.len()
    }

    fn evict_oldest(&self, entries: &mut HashMap<String, CacheEntry>) {
        let oldest = entries
            .values()
            .min_by_key(|e| e.created_at)
            .map(|e| e.id.clone());

        if let Some(key) = oldest {
            entries.remove(&key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            debug!(cache = %self.level, "Evicted oldest entry at capacity");
        }
    }
}

/// Highest scoring id within `scope`; equal scores go to the most recently created entry
fn best_match(
    entries: &HashMap<String, CacheEntry>,
    scope: &str,
    embedding: &[f32],
) -> Option<(String, f32)> {
    let mut best: Option<(&CacheEntry, f32)> = None;

    for entry in entries.values().filter(|e| e.scope == scope) {
        let score = cosine_similarity(embedding, &entry.key_embedding);
        let better = match best {
            None => true,
            Some((current, current_score)) => {
                score > current_score
                    || (score == current_score && entry.created_at > current.created_at)
            }
        };
        if better {
            best = Some((entry, score));
        }
    }

    best.map(|(entry, score)| (entry.id.clone(), score))
}
