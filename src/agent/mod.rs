//! Main assistant - implements the per-query pipeline
//!
//! ROUTE → L2 CACHE → CONTEXT (L1 / RETRIEVE) → GENERATE → GATE → RETRY? → CACHE → FEEDBACK

pub mod prompts;

use crate::cache::{SemanticCache, TwoLevelCache, TwoLevelStats};
use crate::config::AssistantConfig;
use crate::embedding::{Embedder, HashingEmbedder};
use crate::error::AssistantError;
use crate::feedback::{
    FeedbackQueue, FeedbackSink, FeedbackWorker, HeuristicEvaluator, JsonFileSink,
    LlmJudgeEvaluator, MemorySink, QualityEvaluator, WorkerConfig, WorkerStats,
};
use crate::gate::{create_default_gate, FastFailureGate};
use crate::llm::{GeminiClient, GeminiEmbedder, LanguageModel, MockModel, Prompt};
use crate::models::{AssistantResponse, CacheLevel, FeedbackTask, ResponseSource};
use crate::retrieval::{format_chunks, KnowledgeBase, Retriever};
use crate::retry::{RetryController, RetryOutcome};
use crate::router::QueryRouter;
use crate::tracker::PerformanceTracker;
use crate::Result;
use prompts::{AgentProfile, DEGRADED_MESSAGE, REJECT_MESSAGE};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const DEFAULT_TOP_K: usize = 3;

struct Sweeper {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Application root: owns every component and answers queries
pub struct Assistant {
    router: QueryRouter,
    model: Arc<dyn LanguageModel>,
    retriever: Arc<dyn Retriever>,
    cache: Arc<TwoLevelCache>,
    gate: FastFailureGate,
    retry: RetryController,
    feedback: FeedbackWorker,
    tracker: Arc<PerformanceTracker>,
    top_k: usize,
    sweeper: Mutex<Option<Sweeper>>,
}

impl Assistant {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        retriever: Arc<dyn Retriever>,
        cache: Arc<TwoLevelCache>,
        feedback: FeedbackWorker,
        tracker: Arc<PerformanceTracker>,
    ) -> Self {
        Self {
            router: QueryRouter::new(),
            model,
            retriever,
            cache,
            gate: create_default_gate(),
            retry: RetryController::new(),
            feedback,
            tracker,
            top_k: DEFAULT_TOP_K,
            sweeper: Mutex::new(None),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn with_gate(mut self, gate: FastFailureGate) -> Self {
        self.gate = gate;
        self
    }

    /// Wire up every component from configuration and start background tasks
    pub async fn from_config(config: &AssistantConfig) -> Result<Self> {
        config.validate()?;

        let (model, embedder): (Arc<dyn LanguageModel>, Arc<dyn Embedder>) =
            match &config.llm.api_key {
                Some(key) => (
                    Arc::new(GeminiClient::new(key.as_str(), config.llm.model.as_str(), config.llm.timeout)?),
                    Arc::new(GeminiEmbedder::new(
                        key.as_str(),
                        config.llm.embedding_model.as_str(),
                        config.llm.timeout,
                    )?),
                ),
                None => {
                    warn!("GEMINI_API_KEY not set, using offline mock model");
                    (Arc::new(MockModel), Arc::new(HashingEmbedder::new()))
                }
            };

        let retriever: Arc<dyn Retriever> = match &config.retrieval.knowledge_base_path {
            Some(path) => Arc::new(KnowledgeBase::from_json_file(path, embedder.clone()).await?),
            None => Arc::new(KnowledgeBase::with_builtin_documents(embedder.clone()).await?),
        };

        let cache = Arc::new(build_cache(config, embedder).await);

        let mut tracker = PerformanceTracker::new(config.feedback.ema_alpha);
        let sink: Arc<dyn FeedbackSink> = match &config.feedback.dir {
            Some(dir) => {
                tracker = tracker.persisted_in(dir).await;
                Arc::new(JsonFileSink::new(dir))
            }
            None => Arc::new(MemorySink::new()),
        };
        let tracker = Arc::new(tracker);

        let evaluator: Arc<dyn QualityEvaluator> =
            if config.feedback.use_llm_judge && config.llm.api_key.is_some() {
                Arc::new(LlmJudgeEvaluator::new(model.clone()))
            } else {
                Arc::new(HeuristicEvaluator)
            };

        let feedback = FeedbackWorker::start(
            Arc::new(FeedbackQueue::new(config.feedback.queue_capacity)),
            evaluator,
            sink,
            tracker.clone(),
            WorkerConfig {
                success_threshold: config.feedback.success_threshold,
                task_timeout: config.feedback.task_timeout,
                join_timeout: config.feedback.join_timeout,
            },
        );

        let assistant = Self::new(model, retriever, cache, feedback, tracker)
            .with_top_k(config.retrieval.top_k);

        if !config.cache.sweep_interval.is_zero() {
            assistant.start_sweeper(config.cache.sweep_interval).await;
        }

        info!(model = assistant.model.name(), "Assistant initialized");
        Ok(assistant)
    }

    /// Periodically evict expired cache entries until `shutdown`
    pub async fn start_sweeper(&self, every: Duration) {
        let mut slot = self.sweeper.lock().await;
        if slot.is_some() {
            return;
        }
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = self.cache.spawn_sweeper(every, shutdown_rx);
        *slot = Some(Sweeper {
            shutdown_tx,
            handle,
        });
    }

    /// Answer one query
    pub async fn handle(&self, query: &str) -> Result<AssistantResponse> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AssistantError::InvalidQuery("query is empty".to_string()));
        }

        let started = Instant::now();
        let domain = self.router.route(query);

        info!(agent = %domain, "Handling query");

        // === ROUTE ===
        let Some(profile) = prompts::profile(domain) else {
            info!("Query rejected as off-topic");
            return Ok(AssistantResponse {
                answer: REJECT_MESSAGE.to_string(),
                domain,
                source: ResponseSource::Rejected,
                retried: false,
                context_cache_hit: false,
                context_chunks: 0,
                latency_ms: elapsed_ms(started),
                gate: None,
            });
        };

        // === L2 ===
        let cached = if profile.caches_answers {
            self.cache.get_response(domain, query).await
        } else {
            None
        };
        if let Some(answer) = cached {
            let latency_ms = elapsed_ms(started);
            self.enqueue_feedback(
                FeedbackTask::new(query, answer.as_str(), domain.as_str(), latency_ms, 0)
                    .with_cache_hit(true),
            );
            return Ok(AssistantResponse {
                answer,
                domain,
                source: ResponseSource::ResponseCache,
                retried: false,
                context_cache_hit: false,
                context_chunks: 0,
                latency_ms,
                gate: None,
            });
        }

        // === CONTEXT ===
        let (context, context_cache_hit) = self.load_context(query, &profile).await;

        // === GENERATE ===
        let prompt = Prompt::new(profile.system_prompt, query);
        let mut regenerated = false;
        let mut attempt = self.model.generate(&prompt, &context).await;
        if let Err(e) = &attempt {
            if e.is_transient() {
                warn!(agent = %domain, "Transient generation failure, trying once more: {}", e);
                regenerated = true;
                attempt = self.model.generate(&prompt, &context).await;
            }
        }
        let first = match attempt {
            Ok(generation) => generation,
            Err(e) => {
                error!(agent = %domain, "Generation failed: {}", e);
                return Ok(AssistantResponse {
                    answer: DEGRADED_MESSAGE.to_string(),
                    domain,
                    source: ResponseSource::Degraded,
                    retried: regenerated,
                    context_cache_hit,
                    context_chunks: context.len(),
                    latency_ms: elapsed_ms(started),
                    gate: None,
                });
            }
        };

        // === GATE / RETRY ===
        // one extra model call per query at most
        let decision = self.gate.evaluate(&first.text, domain);
        let outcome = if regenerated {
            RetryOutcome {
                generation: first,
                attempted: true,
                used_retry: false,
            }
        } else {
            self.retry
                .maybe_retry(&prompt, &context, first, &decision, self.model.as_ref())
                .await
        };

        let final_decision = if outcome.used_retry {
            self.gate.evaluate(&outcome.generation.text, domain)
        } else {
            decision
        };

        // === CACHE ===
        if final_decision.should_retry {
            debug!(reason = ?final_decision.reason, "Answer failed the gate, not caching");
        } else if profile.caches_answers {
            self.cache
                .set_response(domain, query, &outcome.generation.text)
                .await;
        }

        // === FEEDBACK ===
        let latency_ms = elapsed_ms(started);
        self.enqueue_feedback(FeedbackTask::new(
            query,
            outcome.generation.text.as_str(),
            domain.as_str(),
            latency_ms,
            outcome.retry_count(),
        ));

        info!(
            agent = %domain,
            latency_ms,
            retried = outcome.attempted,
            context_chunks = context.len(),
            "Query answered"
        );

        Ok(AssistantResponse {
            answer: outcome.generation.text,
            domain,
            source: ResponseSource::Generated,
            retried: outcome.attempted,
            context_cache_hit,
            context_chunks: context.len(),
            latency_ms,
            gate: Some(final_decision),
        })
    }

    /// L1 first, then the retriever. Failures degrade to no context.
    async fn load_context(&self, query: &str, profile: &AgentProfile) -> (Vec<String>, bool) {
        if !profile.uses_retrieval {
            return (Vec::new(), false);
        }

        if let Some(context) = self.cache.get_rag_context(query).await {
            return (context, true);
        }

        match self.retriever.retrieve(query, self.top_k).await {
            Ok(chunks) => {
                let context = format_chunks(&chunks);
                if !context.is_empty() {
                    self.cache.set_rag_context(query, context.clone()).await;
                }
                (context, false)
            }
            Err(e) => {
                warn!("Retrieval failed, answering without context: {}", e);
                (Vec::new(), false)
            }
        }
    }

    fn enqueue_feedback(&self, task: FeedbackTask) {
        // the queue sheds and counts on overflow
        self.feedback.enqueue(task);
    }

    pub fn cache(&self) -> &Arc<TwoLevelCache> {
        &self.cache
    }

    pub async fn cache_stats(&self) -> TwoLevelStats {
        self.cache.stats().await
    }

    pub fn tracker(&self) -> &Arc<PerformanceTracker> {
        &self.tracker
    }

    pub fn feedback_stats(&self) -> WorkerStats {
        self.feedback.stats()
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Stop the sweeper, then drain and join the feedback worker
    pub async fn shutdown(&self) -> Result<()> {
        if let Some(sweeper) = self.sweeper.lock().await.take() {
            sweeper.shutdown_tx.send(true).ok();
            if tokio::time::timeout(Duration::from_secs(1), sweeper.handle)
                .await
                .is_err()
            {
                warn!("Cache sweeper did not stop in time");
            }
        }

        self.feedback.shutdown().await
    }
}

async fn build_cache(config: &AssistantConfig, embedder: Arc<dyn Embedder>) -> TwoLevelCache {
    let rag = build_level(config, CacheLevel::Rag, config.cache.rag_threshold, &embedder).await;
    let response = build_level(
        config,
        CacheLevel::Response,
        config.cache.response_threshold,
        &embedder,
    )
    .await;
    TwoLevelCache::new(rag, response)
}

async fn build_level(
    config: &AssistantConfig,
    level: CacheLevel,
    threshold: f32,
    embedder: &Arc<dyn Embedder>,
) -> SemanticCache {
    let settings = &config.cache;
    let cache = SemanticCache::new(level, embedder.clone())
        .with_threshold(threshold)
        .with_ttl(settings.ttl)
        .with_max_entries(settings.max_entries);

    match &settings.dir {
        Some(dir) => cache.persisted_in(dir).await,
        None => cache,
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
