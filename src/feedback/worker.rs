//! Single background consumer of the feedback queue

use crate::error::AssistantError;
use crate::feedback::evaluator::{QualityEvaluator, MAX_SCORE};
use crate::feedback::queue::{EnqueueOutcome, FeedbackQueue};
use crate::feedback::sink::FeedbackSink;
use crate::models::{FeedbackTask, QualityRecord};
use crate::tracker::PerformanceTracker;
use crate::Result;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Quality at or above this counts as a successful answer
    pub success_threshold: f32,
    /// Upper bound on one evaluation
    pub task_timeout: Duration,
    /// How long `shutdown` waits for the drain to finish
    pub join_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            success_threshold: 3.0,
            task_timeout: Duration::from_secs(30),
            join_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkerStats {
    pub processed: u64,
    pub failed: u64,
    pub dropped: u64,
    pub pending: usize,
    pub persist_failures: u64,
}

#[derive(Default)]
struct Counters {
    processed: AtomicU64,
    failed: AtomicU64,
    persist_failures: AtomicU64,
}

/// Everything the loop needs, moved into the spawned task
struct Pipeline {
    queue: Arc<FeedbackQueue>,
    evaluator: Arc<dyn QualityEvaluator>,
    sink: Arc<dyn FeedbackSink>,
    tracker: Arc<PerformanceTracker>,
    counters: Arc<Counters>,
    config: WorkerConfig,
}

pub struct FeedbackWorker {
    queue: Arc<FeedbackQueue>,
    counters: Arc<Counters>,
    shutdown_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
    join_timeout: Duration,
}

impl FeedbackWorker {
    /// Spawn the consumer task. Must be called inside a tokio runtime.
    pub fn start(
        queue: Arc<FeedbackQueue>,
        evaluator: Arc<dyn QualityEvaluator>,
        sink: Arc<dyn FeedbackSink>,
        tracker: Arc<PerformanceTracker>,
        config: WorkerConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let counters = Arc::new(Counters::default());
        let join_timeout = config.join_timeout;

        info!(
            evaluator = evaluator.name(),
            capacity = queue.capacity(),
            "Starting feedback worker"
        );

        let pipeline = Pipeline {
            queue: queue.clone(),
            evaluator,
            sink,
            tracker,
            counters: counters.clone(),
            config,
        };
        let handle = tokio::spawn(pipeline.run(shutdown_rx));

        Self {
            queue,
            counters,
            shutdown_tx,
            handle: Mutex::new(Some(handle)),
            join_timeout,
        }
    }

    /// Hand a task to the worker; never blocks
    pub fn enqueue(&self, task: FeedbackTask) -> EnqueueOutcome {
        self.queue.enqueue(task)
    }

    pub fn queue(&self) -> &Arc<FeedbackQueue> {
        &self.queue
    }

    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            processed: self.counters.processed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.queue.dropped(),
            pending: self.queue.len(),
            persist_failures: self.counters.persist_failures.load(Ordering::Relaxed),
        }
    }

    /// Signal, let the worker drain what is queued, then join.
    /// Calling it again is a no-op.
    pub async fn shutdown(&self) -> Result<()> {
        if self.shutdown_tx.send(true).is_err() {
            debug!("Feedback worker already stopped");
        }

        let Some(handle) = self.handle.lock().await.take() else {
            return Ok(());
        };

        match tokio::time::timeout(self.join_timeout, handle).await {
            Ok(Ok(())) => {
                info!(stats = ?self.stats(), "Feedback worker stopped");
                Ok(())
            }
            Ok(Err(e)) => Err(AssistantError::WorkerShutdown(format!(
                "worker task failed: {}",
                e
            ))),
            Err(_) => {
                warn!(pending = self.queue.len(), "Feedback worker did not stop in time");
                Err(AssistantError::WorkerShutdown(format!(
                    "timed out after {:?}",
                    self.join_timeout
                )))
            }
        }
    }
}

impl Pipeline {
    async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                biased;
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                task = self.queue.pop() => self.process(task).await,
            }
        }

        let mut drained = 0usize;
        while let Some(task) = self.queue.try_pop() {
            self.process(task).await;
            drained += 1;
        }
        debug!(drained, "Feedback queue drained");
    }

    async fn process(&self, task: FeedbackTask) {
        let evaluation = AssertUnwindSafe(tokio::time::timeout(
            self.config.task_timeout,
            self.evaluator.score(&task),
        ))
        .catch_unwind()
        .await;

        let score = match evaluation {
            Ok(Ok(Ok(score))) => score.clamp(0.0, MAX_SCORE),
            Ok(Ok(Err(e))) => {
                warn!(task_id = %task.task_id, "Quality evaluation failed: {}", e);
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                return;
            }
            Ok(Err(_)) => {
                warn!(task_id = %task.task_id, timeout = ?self.config.task_timeout, "Quality evaluation timed out");
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                return;
            }
            Err(_) => {
                error!(task_id = %task.task_id, "Quality evaluation panicked");
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        let record = QualityRecord::from_task(&task, score, self.evaluator.name());
        if let Err(e) = self.sink.persist(&record).await {
            warn!(task_id = %task.task_id, "Failed to persist quality record: {}", e);
            self.counters.persist_failures.fetch_add(1, Ordering::Relaxed);
        }

        self.tracker
            .record(
                &task.agent_name,
                score >= self.config.success_threshold,
                Duration::from_millis(task.latency_ms),
                Some(score),
            )
            .await;

        self.counters.processed.fetch_add(1, Ordering::Relaxed);
        debug!(
            task_id = %task.task_id,
            agent = %task.agent_name,
            score = score,
            cache_hit = task.cache_hit,
            "Background quality check complete"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::evaluator::HeuristicEvaluator;
    use crate::feedback::sink::MemorySink;
    use async_trait::async_trait;

    /// "panic" panics, "fail" errors, "slow" sleeps, anything else scores 4
    struct TrickyEvaluator;

    #[async_trait]
    impl QualityEvaluator for TrickyEvaluator {
        fn name(&self) -> &'static str {
            "tricky"
        }

        async fn score(&self, task: &FeedbackTask) -> Result<f32> {
            match task.response.as_str() {
                "panic" => panic!("evaluator blew up"),
                "fail" => Err(AssistantError::Evaluation("bad".to_string())),
                "slow" => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(5.0)
                }
                _ => Ok(4.0),
            }
        }
    }

    fn task(response: &str) -> FeedbackTask {
        FeedbackTask::new("What is a 401k?", response, "finance", 1200, 0)
    }

    fn start(
        evaluator: Arc<dyn QualityEvaluator>,
        capacity: usize,
    ) -> (FeedbackWorker, Arc<MemorySink>, Arc<PerformanceTracker>) {
        let sink = Arc::new(MemorySink::new());
        let tracker = Arc::new(PerformanceTracker::default());
        let worker = FeedbackWorker::start(
            Arc::new(FeedbackQueue::new(capacity)),
            evaluator,
            sink.clone(),
            tracker.clone(),
            WorkerConfig {
                task_timeout: Duration::from_millis(50),
                ..WorkerConfig::default()
            },
        );
        (worker, sink, tracker)
    }

    async fn wait_for(worker: &FeedbackWorker, done: u64) {
        for _ in 0..200 {
            let stats = worker.stats();
            if stats.processed + stats.failed >= done {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("worker did not finish: {:?}", worker.stats());
    }

    #[tokio::test]
    async fn test_processes_tasks_into_sink_and_tracker() {
        let (worker, sink, tracker) = start(Arc::new(HeuristicEvaluator), 16);

        worker.enqueue(task("I don't know."));
        wait_for(&worker, 1).await;

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].evaluator, "heuristic");
        assert!((records[0].quality_score - 1.5).abs() < 1e-6);

        // 1.5 < 3.0 so the sample is a failure
        let stats = tracker.snapshot("finance").await.unwrap();
        assert_eq!(stats.success_rate_ema, 0.0);
        assert!((stats.avg_latency_ema - 1.2).abs() < 1e-9);

        worker.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_the_loop() {
        let (worker, sink, _) = start(Arc::new(TrickyEvaluator), 16);

        worker.enqueue(task("panic"));
        worker.enqueue(task("fail"));
        worker.enqueue(task("slow"));
        worker.enqueue(task("fine"));
        wait_for(&worker, 4).await;

        let stats = worker.stats();
        assert_eq!(stats.failed, 3);
        assert_eq!(stats.processed, 1);
        assert_eq!(sink.records().len(), 1);

        worker.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue_and_is_idempotent() {
        let (worker, sink, _) = start(Arc::new(TrickyEvaluator), 16);

        for _ in 0..5 {
            worker.enqueue(task("fine"));
        }
        worker.shutdown().await.unwrap();

        assert_eq!(worker.stats().processed, 5);
        assert_eq!(worker.stats().pending, 0);
        assert_eq!(sink.records().len(), 5);

        worker.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_stats_report_queue_drops() {
        let (worker, _, _) = start(Arc::new(TrickyEvaluator), 1);
        worker.shutdown().await.unwrap();

        // worker gone, nothing consumes
        worker.enqueue(task("fine"));
        assert_eq!(worker.enqueue(task("fine")), EnqueueOutcome::DroppedOldest);
        assert_eq!(worker.stats().dropped, 1);
        assert_eq!(worker.stats().pending, 1);
    }
}
