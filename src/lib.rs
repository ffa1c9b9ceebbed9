//! Financial Education Assistant
//!
//! A question-answering service for personal-finance learners that:
//! - Routes each query to a specialist agent (or rejects off-topic ones)
//! - Grounds answers in retrieved reference material
//! - Reuses context and answers through a two-level semantic cache
//! - Screens answers with a fast-failure gate and retries once with guidance
//! - Grades answers off the request path and tracks per-agent averages
//!
//! PER-QUERY LOOP:
//! ROUTE → L2 CACHE → CONTEXT → GENERATE → GATE → RETRY? → CACHE → FEEDBACK

pub mod agent;
pub mod api;
pub mod cache;
pub mod config;
pub mod embedding;
pub mod error;
pub mod feedback;
pub mod gate;
pub mod llm;
pub mod models;
pub mod retrieval;
pub mod retry;
pub mod router;
pub mod tracker;

pub use error::{AssistantError, Result};

// Re-export common types
pub use agent::Assistant;
pub use config::AssistantConfig;
pub use models::*;
