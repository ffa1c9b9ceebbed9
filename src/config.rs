//! Runtime configuration
//!
//! Defaults suit a local run; every knob can be overridden from the
//! environment (a `.env` file is honoured).

use crate::error::AssistantError;
use crate::Result;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// `None` runs the offline mock model and hashing embedder
    pub api_key: Option<String>,
    pub model: String,
    pub embedding_model: String,
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: crate::llm::gemini::DEFAULT_MODEL.to_string(),
            embedding_model: crate::llm::gemini::DEFAULT_EMBEDDING_MODEL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Where the level files live; `None` keeps both levels in memory only
    pub dir: Option<PathBuf>,
    pub rag_threshold: f32,
    pub response_threshold: f32,
    pub ttl: Duration,
    pub max_entries: usize,
    /// Zero disables the background sweeper
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            rag_threshold: 0.95,
            response_threshold: 0.92,
            ttl: Duration::from_secs(24 * 60 * 60),
            max_entries: 10_000,
            sweep_interval: Duration::from_secs(10 * 60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeedbackConfig {
    /// Root for `quality_scores/` and `performance_metrics/`; `None` keeps records in memory
    pub dir: Option<PathBuf>,
    pub queue_capacity: usize,
    pub success_threshold: f32,
    pub ema_alpha: f64,
    pub task_timeout: Duration,
    pub join_timeout: Duration,
    /// Grade answers with the model instead of heuristics
    pub use_llm_judge: bool,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            dir: None,
            queue_capacity: 256,
            success_threshold: 3.0,
            ema_alpha: 0.1,
            task_timeout: Duration::from_secs(30),
            join_timeout: Duration::from_secs(5),
            use_llm_judge: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// JSON array of `{title, content}`; `None` uses the built-in notes
    pub knowledge_base_path: Option<PathBuf>,
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            knowledge_base_path: None,
            top_k: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub llm: LlmConfig,
    pub cache: CacheConfig,
    pub feedback: FeedbackConfig,
    pub retrieval: RetrievalConfig,
    pub port: u16,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            cache: CacheConfig::default(),
            feedback: FeedbackConfig::default(),
            retrieval: RetrievalConfig::default(),
            port: 8080,
        }
    }
}

impl AssistantConfig {
    /// Defaults overridden by environment variables, then validated
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        let config = Self::default().with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(key) = env_string("GEMINI_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(model) = env_string("GEMINI_MODEL") {
            self.llm.model = model;
        }
        if let Some(model) = env_string("GEMINI_EMBEDDING_MODEL") {
            self.llm.embedding_model = model;
        }
        if let Some(secs) = env_parse::<u64>("LLM_TIMEOUT_SECS")? {
            self.llm.timeout = Duration::from_secs(secs);
        }

        if let Some(dir) = env_string("ASSISTANT_CACHE_DIR") {
            self.cache.dir = Some(PathBuf::from(dir));
        }
        if let Some(threshold) = env_parse("RAG_SIMILARITY_THRESHOLD")? {
            self.cache.rag_threshold = threshold;
        }
        if let Some(threshold) = env_parse("RESPONSE_SIMILARITY_THRESHOLD")? {
            self.cache.response_threshold = threshold;
        }
        if let Some(secs) = env_parse::<u64>("CACHE_TTL_SECS")? {
            self.cache.ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("CACHE_SWEEP_SECS")? {
            self.cache.sweep_interval = Duration::from_secs(secs);
        }
        if let Some(max) = env_parse("CACHE_MAX_ENTRIES")? {
            self.cache.max_entries = max;
        }

        if let Some(dir) = env_string("FEEDBACK_DIR") {
            self.feedback.dir = Some(PathBuf::from(dir));
        }
        if let Some(capacity) = env_parse("FEEDBACK_QUEUE_CAPACITY")? {
            self.feedback.queue_capacity = capacity;
        }
        if let Some(threshold) = env_parse("FEEDBACK_SUCCESS_THRESHOLD")? {
            self.feedback.success_threshold = threshold;
        }
        if let Some(alpha) = env_parse("PERFORMANCE_EMA_ALPHA")? {
            self.feedback.ema_alpha = alpha;
        }
        if let Some(judge) = env_parse("FEEDBACK_USE_LLM_JUDGE")? {
            self.feedback.use_llm_judge = judge;
        }

        if let Some(path) = env_string("KNOWLEDGE_BASE_PATH") {
            self.retrieval.knowledge_base_path = Some(PathBuf::from(path));
        }
        if let Some(k) = env_parse("RETRIEVAL_TOP_K")? {
            self.retrieval.top_k = k;
        }

        if let Some(port) = env_parse("PORT")?.or(env_parse("API_PORT")?) {
            self.port = port;
        }

        info!(
            model = %self.llm.model,
            live_model = self.llm.api_key.is_some(),
            cache_dir = ?self.cache.dir,
            feedback_dir = ?self.feedback.dir,
            "Configuration loaded"
        );
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, threshold) in [
            ("rag_threshold", self.cache.rag_threshold),
            ("response_threshold", self.cache.response_threshold),
        ] {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(AssistantError::Config(format!(
                    "{} must be within [0, 1], got {}",
                    name, threshold
                )));
            }
        }

        if self.cache.max_entries == 0 {
            return Err(AssistantError::Config("cache max_entries must be positive".to_string()));
        }
        if self.feedback.queue_capacity == 0 {
            return Err(AssistantError::Config("feedback queue_capacity must be positive".to_string()));
        }
        if !(0.0..=5.0).contains(&self.feedback.success_threshold) {
            return Err(AssistantError::Config(format!(
                "success_threshold must be within [0, 5], got {}",
                self.feedback.success_threshold
            )));
        }
        if !(self.feedback.ema_alpha > 0.0 && self.feedback.ema_alpha <= 1.0) {
            return Err(AssistantError::Config(format!(
                "ema_alpha must be within (0, 1], got {}",
                self.feedback.ema_alpha
            )));
        }
        if self.retrieval.top_k == 0 {
            return Err(AssistantError::Config("retrieval top_k must be positive".to_string()));
        }
        Ok(())
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env_string(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| AssistantError::Config(format!("invalid {}={:?}: {}", key, raw, e))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AssistantConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache.rag_threshold, 0.95);
        assert_eq!(config.cache.response_threshold, 0.92);
        assert_eq!(config.cache.sweep_interval, Duration::from_secs(600));
        assert_eq!(config.feedback.queue_capacity, 256);
        assert_eq!(config.feedback.ema_alpha, 0.1);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut config = AssistantConfig::default();
        config.cache.rag_threshold = 1.5;
        assert!(matches!(config.validate(), Err(AssistantError::Config(_))));

        let mut config = AssistantConfig::default();
        config.feedback.ema_alpha = 0.0;
        assert!(config.validate().is_err());

        let mut config = AssistantConfig::default();
        config.feedback.queue_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_parse_reports_bad_values() {
        // unique key so parallel tests don't collide
        env::set_var("ASSISTANT_TEST_BAD_NUMBER", "abc");
        let parsed = env_parse::<u64>("ASSISTANT_TEST_BAD_NUMBER");
        assert!(matches!(parsed, Err(AssistantError::Config(_))));

        env::set_var("ASSISTANT_TEST_GOOD_NUMBER", " 42 ");
        assert_eq!(env_parse::<u64>("ASSISTANT_TEST_GOOD_NUMBER").unwrap(), Some(42));
        assert_eq!(env_parse::<u64>("ASSISTANT_TEST_UNSET_NUMBER").unwrap(), None);
    }
}
