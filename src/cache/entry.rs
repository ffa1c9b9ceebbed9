//! Cache entry with TTL support

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

/// What a cache level stores for a query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum CacheValue {
    /// Retrieved context chunks (L1)
    Context(Vec<String>),
    /// Generated answer text (L2)
    Response(String),
}

impl CacheValue {
    pub fn as_context(&self) -> Option<&[String]> {
        match self {
            CacheValue::Context(chunks) => Some(chunks),
            CacheValue::Response(_) => None,
        }
    }

    pub fn as_response(&self) -> Option<&str> {
        match self {
            CacheValue::Response(text) => Some(text),
            CacheValue::Context(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub id: String,
    /// Partition within a level; lookups only match entries in the same scope
    #[serde(default)]
    pub scope: String,
    pub key_text: String,
    pub key_embedding: Vec<f32>,
    pub value: CacheValue,
    pub created_at: DateTime<Utc>,
    pub ttl_ms: u64,
    #[serde(default)]
    pub access_count: u64,
    #[serde(default)]
    pub last_accessed: Option<DateTime<Utc>>,
}

impl CacheEntry {
    pub fn new(key_text: String, key_embedding: Vec<f32>, value: CacheValue, ttl: Duration) -> Self {
        Self {
            id: entry_id("", &key_text),
            scope: String::new(),
            key_text,
            key_embedding,
            value,
            created_at: Utc::now(),
            ttl_ms: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
            access_count: 0,
            last_accessed: None,
        }
    }

    /// Move the entry into `scope`, re-deriving its id
    pub fn in_scope(mut self, scope: &str) -> Self {
        self.id = entry_id(scope, &self.key_text);
        self.scope = scope.to_string();
        self
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// Valid while `now - created_at <= ttl`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(self.ttl()) {
            Ok(ttl) => now - self.created_at > ttl,
            // ttl beyond chrono's range never elapses
            Err(_) => false,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn mark_accessed(&mut self) {
        self.access_count += 1;
        self.last_accessed = Some(Utc::now());
    }
}

/// Stable id for a key: hex SHA-256 of the exact query text,
/// prefixed by the scope when there is one
pub fn entry_id(scope: &str, key_text: &str) -> String {
    let mut hasher = Sha256::new();
    if !scope.is_empty() {
        hasher.update(scope.as_bytes());
        hasher.update([0u8]);
    }
    hasher.update(key_text.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ttl: Duration) -> CacheEntry {
        CacheEntry::new(
            "what is compound interest".to_string(),
            vec![1.0, 0.0],
            CacheValue::Response("Interest on interest.".to_string()),
            ttl,
        )
    }

    #[test]
    fn test_entry_creation() {
        let e = entry(Duration::from_secs(3600));
        assert_eq!(e.id, entry_id("", "what is compound interest"));
        assert!(e.scope.is_empty());
        assert_eq!(e.id.len(), 64);
        assert_eq!(e.ttl(), Duration::from_secs(3600));
        assert!(!e.is_expired());
    }

    #[test]
    fn test_expiry_boundary() {
        let e = entry(Duration::from_secs(60));
        let at_ttl = e.created_at + chrono::Duration::seconds(60);
        let past_ttl = at_ttl + chrono::Duration::milliseconds(1);

        assert!(!e.is_expired_at(at_ttl));
        assert!(e.is_expired_at(past_ttl));
    }

    #[test]
    fn test_zero_ttl_expires_immediately_after_creation() {
        let e = entry(Duration::ZERO);
        assert!(e.is_expired_at(e.created_at + chrono::Duration::milliseconds(1)));
    }

    #[test]
    fn test_sub_second_ttl_is_kept() {
        let e = entry(Duration::from_millis(1500));
        assert_eq!(e.ttl(), Duration::from_millis(1500));
        assert!(!e.is_expired_at(e.created_at + chrono::Duration::milliseconds(1200)));
        assert!(e.is_expired_at(e.created_at + chrono::Duration::milliseconds(1501)));

        let short = entry(Duration::from_millis(500));
        assert!(!short.is_expired_at(short.created_at + chrono::Duration::milliseconds(400)));
    }

    #[test]
    fn test_scope_changes_id_but_not_key() {
        let e = entry(Duration::from_secs(60)).in_scope("tax");
        assert_eq!(e.scope, "tax");
        assert_eq!(e.key_text, "what is compound interest");
        assert_ne!(e.id, entry_id("", "what is compound interest"));
        assert_eq!(e.id, entry_id("tax", "what is compound interest"));
    }

    #[test]
    fn test_mark_accessed() {
        let mut e = entry(Duration::from_secs(60));
        e.mark_accessed();
        e.mark_accessed();
        assert_eq!(e.access_count, 2);
        assert!(e.last_accessed.is_some());
    }

    #[test]
    fn test_value_accessors() {
        let ctx = CacheValue::Context(vec!["chunk".into()]);
        assert_eq!(ctx.as_context().map(|c| c.len()), Some(1));
        assert!(ctx.as_response().is_none());
    }
}
