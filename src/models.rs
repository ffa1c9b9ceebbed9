//! Core data models for the financial education assistant

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

//
// ================= Enums =================
//

/// Specialist agent a query is routed to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum AgentDomain {
    Finance,
    Portfolio,
    Market,
    Goal,
    News,
    Tax,
    Reject,
}

impl AgentDomain {
    pub const ALL: [AgentDomain; 7] = [
        AgentDomain::Finance,
        AgentDomain::Portfolio,
        AgentDomain::Market,
        AgentDomain::Goal,
        AgentDomain::News,
        AgentDomain::Tax,
        AgentDomain::Reject,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentDomain::Finance => "finance",
            AgentDomain::Portfolio => "portfolio",
            AgentDomain::Market => "market",
            AgentDomain::Goal => "goal",
            AgentDomain::News => "news",
            AgentDomain::Tax => "tax",
            AgentDomain::Reject => "reject",
        }
    }

    /// Parse a routing label ("finance", " Tax\n", ...). Unknown labels map to `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().to_lowercase();
        Self::ALL.into_iter().find(|d| d.as_str() == label)
    }
}

impl fmt::Display for AgentDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The two independent caching tiers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CacheLevel {
    /// L1: retrieved context chunks
    Rag,
    /// L2: complete generated answers
    Response,
}

impl CacheLevel {
    /// Default similarity threshold for a hit at this level
    pub fn default_threshold(&self) -> f32 {
        match self {
            CacheLevel::Rag => 0.95,
            CacheLevel::Response => 0.92,
        }
    }

    /// Name used for log lines and persistence files
    pub fn cache_name(&self) -> &'static str {
        match self {
            CacheLevel::Rag => "rag_cache",
            CacheLevel::Response => "response_cache",
        }
    }
}

impl fmt::Display for CacheLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cache_name())
    }
}

//
// ================= Gate =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RetryReason {
    TooShort,
    UnhelpfulPhrase,
    MissingDisclaimer,
    MissingExample,
    MissingNumber,
    None,
}

/// Outcome of the fast-failure gate for one response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryDecision {
    pub should_retry: bool,
    /// First flag raised in rule order, `RetryReason::None` when clean
    pub reason: RetryReason,
    /// Every flag raised
    pub flags: Vec<RetryReason>,
}

impl RetryDecision {
    pub fn pass() -> Self {
        Self {
            should_retry: false,
            reason: RetryReason::None,
            flags: Vec::new(),
        }
    }

    pub fn from_flags(flags: Vec<RetryReason>) -> Self {
        match flags.first().copied() {
            Some(reason) => Self {
                should_retry: true,
                reason,
                flags,
            },
            None => Self::pass(),
        }
    }
}

//
// ================= Generation =================
//

/// Text produced by the language model plus how long it took
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Generation {
    pub text: String,
    pub latency_ms: u64,
}

/// One retrieved piece of supporting context
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextChunk {
    pub title: String,
    pub content: String,
    pub score: f32,
}

//
// ================= Feedback =================
//

/// Unit of work for the background feedback worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackTask {
    pub task_id: Uuid,
    pub query: String,
    pub response: String,
    pub agent_name: String,
    pub latency_ms: u64,
    pub timestamp: DateTime<Utc>,
    pub retry_count: u32,
    #[serde(default)]
    pub cache_hit: bool,
}

impl FeedbackTask {
    pub fn new(
        query: impl Into<String>,
        response: impl Into<String>,
        agent_name: impl Into<String>,
        latency_ms: u64,
        retry_count: u32,
    ) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            query: query.into(),
            response: response.into(),
            agent_name: agent_name.into(),
            latency_ms,
            timestamp: Utc::now(),
            retry_count,
            cache_hit: false,
        }
    }

    pub fn with_cache_hit(mut self, cache_hit: bool) -> Self {
        self.cache_hit = cache_hit;
        self
    }
}

/// Persisted result of evaluating one feedback task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityRecord {
    pub record_id: Uuid,
    pub task_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub query: String,
    pub response: String,
    pub agent_name: String,
    pub quality_score: f32,
    pub retry_count: u32,
    pub cache_hit: bool,
    pub evaluator: String,
}

impl QualityRecord {
    const QUERY_LIMIT: usize = 200;
    const RESPONSE_LIMIT: usize = 500;

    pub fn from_task(task: &FeedbackTask, quality_score: f32, evaluator: &str) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            task_id: task.task_id,
            timestamp: Utc::now(),
            query: truncate_chars(&task.query, Self::QUERY_LIMIT),
            response: truncate_chars(&task.response, Self::RESPONSE_LIMIT),
            agent_name: task.agent_name.clone(),
            quality_score: (quality_score * 100.0).round() / 100.0,
            retry_count: task.retry_count,
            cache_hit: task.cache_hit,
            evaluator: evaluator.to_string(),
        }
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

/// Per-agent exponential moving averages
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerformanceStats {
    pub success_rate_ema: f64,
    /// Seconds
    pub avg_latency_ema: f64,
    /// Meaningless while `quality_samples` is zero
    pub avg_quality_ema: f64,
    pub sample_count: u64,
    #[serde(default)]
    pub quality_samples: u64,
    pub updated_at: DateTime<Utc>,
}

//
// ================= Final Response =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    ResponseCache,
    Generated,
    Rejected,
    Degraded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantResponse {
    pub answer: String,
    pub domain: AgentDomain,
    pub source: ResponseSource,
    pub retried: bool,
    pub context_cache_hit: bool,
    pub context_chunks: usize,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate: Option<RetryDecision>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_labels() {
        assert_eq!(AgentDomain::from_label(" Tax\n"), Some(AgentDomain::Tax));
        assert_eq!(AgentDomain::from_label("reject"), Some(AgentDomain::Reject));
        assert_eq!(AgentDomain::from_label("weather"), None);
        assert_eq!(AgentDomain::Portfolio.to_string(), "portfolio");
    }

    #[test]
    fn test_retry_decision_from_flags() {
        let clean = RetryDecision::from_flags(vec![]);
        assert!(!clean.should_retry);
        assert_eq!(clean.reason, RetryReason::None);

        let flagged = RetryDecision::from_flags(vec![
            RetryReason::UnhelpfulPhrase,
            RetryReason::MissingDisclaimer,
        ]);
        assert!(flagged.should_retry);
        assert_eq!(flagged.reason, RetryReason::UnhelpfulPhrase);
        assert_eq!(flagged.flags.len(), 2);
    }

    #[test]
    fn test_quality_record_truncates() {
        let task = FeedbackTask::new("q".repeat(300), "r".repeat(900), "finance", 120, 1);
        let record = QualityRecord::from_task(&task, 3.456, "heuristic");

        assert_eq!(record.query.chars().count(), 200);
        assert_eq!(record.response.chars().count(), 500);
        assert_eq!(record.quality_score, 3.46);
        assert_eq!(record.retry_count, 1);
    }

    #[test]
    fn test_cache_level_defaults() {
        assert_eq!(CacheLevel::Rag.default_threshold(), 0.95);
        assert_eq!(CacheLevel::Response.default_threshold(), 0.92);
        assert_eq!(CacheLevel::Response.cache_name(), "response_cache");
    }
}
