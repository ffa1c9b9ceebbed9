//! Two-level semantic cache
//!
//! L1 holds retrieved context keyed by query, L2 holds complete answers.
//! Each level matches by cosine similarity of query embeddings against its
//! own threshold and persists itself to a JSON file on a best-effort basis.

pub mod entry;
pub mod persistence;
pub mod similarity;
pub mod store;
pub mod two_level;

pub use entry::{CacheEntry, CacheValue};
pub use similarity::cosine_similarity;
pub use store::{CacheHit, CacheStats, SemanticCache};
pub use two_level::{CacheScope, TwoLevelCache, TwoLevelStats};
