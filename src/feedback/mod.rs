//! Asynchronous feedback: score answers off the request path
//!
//! Requests push a `FeedbackTask` onto a bounded queue and move on. One
//! worker task evaluates each answer, writes a quality record and feeds the
//! performance tracker.

pub mod evaluator;
pub mod queue;
pub mod sink;
pub mod worker;

pub use evaluator::{HeuristicEvaluator, JudgeScores, LlmJudgeEvaluator, QualityEvaluator};
pub use queue::{EnqueueOutcome, FeedbackQueue};
pub use sink::{FeedbackSink, JsonFileSink, MemorySink};
pub use worker::{FeedbackWorker, WorkerConfig, WorkerStats};
