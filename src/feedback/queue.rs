//! Bounded drop-oldest FIFO between the request path and the worker

use crate::models::FeedbackTask;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;
use tracing::{debug, warn};

pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    /// Queued after discarding the oldest waiting task
    DroppedOldest,
}

pub struct FeedbackQueue {
    capacity: usize,
    tasks: Mutex<VecDeque<FeedbackTask>>,
    notify: Notify,
    enqueued: AtomicU64,
    dropped: AtomicU64,
}

impl FeedbackQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            tasks: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            enqueued: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Push without blocking; a full queue sheds its oldest task
    pub fn enqueue(&self, task: FeedbackTask) -> EnqueueOutcome {
        let outcome = {
            let mut tasks = self.tasks.lock().unwrap_or_else(|p| p.into_inner());
            let outcome = if tasks.len() >= self.capacity {
                if let Some(shed) = tasks.pop_front() {
                    warn!(task_id = %shed.task_id, agent = %shed.agent_name, "Feedback queue full, dropping oldest task");
                }
                self.dropped.fetch_add(1, Ordering::Relaxed);
                EnqueueOutcome::DroppedOldest
            } else {
                EnqueueOutcome::Queued
            };
            debug!(task_id = %task.task_id, "Feedback task queued");
            tasks.push_back(task);
            outcome
        };

        self.enqueued.fetch_add(1, Ordering::Relaxed);
        self.notify.notify_one();
        outcome
    }

    pub fn try_pop(&self) -> Option<FeedbackTask> {
        self.tasks
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front()
    }

    /// Wait for the next task
    pub async fn pop(&self) -> FeedbackTask {
        loop {
            if let Some(task) = self.try_pop() {
                return task;
            }
            self.notify.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for FeedbackQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
