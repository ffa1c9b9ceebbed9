//! Retrieval of supporting context for educational answers

use crate::cache::similarity::cosine_similarity;
use crate::embedding::Embedder;
use crate::error::AssistantError;
use crate::models::ContextChunk;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[async_trait]
pub trait Retriever: Send + Sync {
    /// Top `k` chunks for `query`, best first
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ContextChunk>>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub title: String,
    pub content: String,
}

impl Document {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }
}

/// `[Source i: title]\ncontent`, numbered from 1
pub fn format_chunks(chunks: &[ContextChunk]) -> Vec<String> {
    chunks
        .iter()
        .enumerate()
        .map(|(i, c)| format!("[Source {}: {}]\n{}", i + 1, c.title, c.content))
        .collect()
}

struct IndexedDocument {
    document: Document,
    embedding: Vec<f32>,
}

/// In-memory document store ranked by embedding similarity
pub struct KnowledgeBase {
    embedder: Arc<dyn Embedder>,
    documents: RwLock<Vec<IndexedDocument>>,
}

impl KnowledgeBase {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            documents: RwLock::new(Vec::new()),
        }
    }

    /// Load a JSON array of `{title, content}` objects
    pub async fn from_json_file(path: &Path, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let raw = tokio::fs::read(path).await.map_err(|e| {
            AssistantError::Retrieval(format!("cannot read {}: {}", path.display(), e))
        })?;
        let documents: Vec<Document> = serde_json::from_slice(&raw)?;

        let kb = Self::new(embedder);
        kb.add_documents(documents).await?;
        info!(path = %path.display(), documents = kb.len().await, "Knowledge base loaded");
        Ok(kb)
    }

    /// Small starter set of educational notes
    pub async fn with_builtin_documents(embedder: Arc<dyn Embedder>) -> Result<Self> {
        let kb = Self::new(embedder);
        kb.add_documents(builtin_documents()).await?;
        Ok(kb)
    }

    pub async fn add_document(&self, document: Document) -> Result<()> {
        let text = format!("{}\n{}", document.title, document.content);
        let embedding = self.embedder.embed(&text).await?;
        self.documents.write().await.push(IndexedDocument {
            document,
            embedding,
        });
        Ok(())
    }

    pub async fn add_documents(&self, documents: Vec<Document>) -> Result<()> {
        for document in documents {
            self.add_document(document).await?;
        }
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl Retriever for KnowledgeBase {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ContextChunk>> {
        let documents = self.documents.read().await;
        if documents.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| AssistantError::Retrieval(format!("query embedding failed: {}", e)))?;

        let mut scored: Vec<ContextChunk> = documents
            .iter()
            .map(|d| ContextChunk {
                title: d.document.title.clone(),
                content: d.document.content.clone(),
                score: cosine_similarity(&query_embedding, &d.embedding),
            })
            .filter(|c| c.score > 0.0)
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);

        debug!(requested = k, returned = scored.len(), "Retrieved context");
        Ok(scored)
    }
}

fn builtin_documents() -> Vec<Document> {
    vec![
        Document::new(
            "Compound interest",
            "Compound interest is interest earned on both the original principal and on \
             interest already added. $1,000 at 5% a year becomes $1,050 after one year and \
             about $1,628 after ten years.",
        ),
        Document::new(
            "Index funds and ETFs",
            "An index fund holds every security in a market index such as the S&P 500, so \
             its return tracks the index minus a small fee. ETFs are funds that trade on an \
             exchange throughout the day like a stock.",
        ),
        Document::new(
            "Budgeting with 50/30/20",
            "The 50/30/20 budget puts 50% of take-home pay toward needs, 30% toward wants and \
             20% toward savings and debt repayment.",
        ),
        Document::new(
            "Emergency funds",
            "An emergency fund covers three to six months of essential expenses and is kept \
             in a liquid, low-risk account such as a high-yield savings account.",
        ),
        Document::new(
            "Capital gains tax",
            "Gains on assets held longer than one year are usually taxed at long-term capital \
             gains rates, which are lower than ordinary income rates. Short-term gains are \
             taxed as ordinary income.",
        ),
        Document::new(
            "Diversification and rebalancing",
            "Diversification spreads money across asset classes so one loss does not sink the \
             portfolio. Rebalancing periodically sells what has grown and buys what has lagged \
             to return to the target allocation.",
        ),
        Document::new(
            "Retirement accounts",
            "A 401(k) is an employer-sponsored retirement account funded with pre-tax pay. A \
             Roth IRA is funded with after-tax money and qualified withdrawals are tax free.",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;

    fn embedder() -> Arc<dyn Embedder> {
        Arc::new(HashingEmbedder::new())
    }

    #[tokio::test]
    async fn test_retrieve_ranks_relevant_document_first() {
        let kb = KnowledgeBase::with_builtin_documents(embedder()).await.unwrap();
        let chunks = kb.retrieve("how does compound interest grow", 3).await.unwrap();

        assert!(!chunks.is_empty() && chunks.len() <= 3);
        assert_eq!(chunks[0].title, "Compound interest");
        assert!(chunks.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_empty_knowledge_base_returns_nothing() {
        let kb = KnowledgeBase::new(embedder());
        assert!(kb.is_empty().await);
        assert!(kb.retrieve("anything", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.json");
        std::fs::write(
            &path,
            r#"[{"title": "APR", "content": "Annual percentage rate of a loan."}]"#,
        )
        .unwrap();

        let kb = KnowledgeBase::from_json_file(&path, embedder()).await.unwrap();
        assert_eq!(kb.len().await, 1);

        let missing = KnowledgeBase::from_json_file(&dir.path().join("nope.json"), embedder()).await;
        assert!(matches!(missing, Err(AssistantError::Retrieval(_))));
    }

    #[test]
    fn test_format_chunks() {
        let chunks = vec![
            ContextChunk {
                title: "ETFs".into(),
                content: "Funds that trade.".into(),
                score: 0.9,
            },
            ContextChunk {
                title: "Bonds".into(),
                content: "Loans to issuers.".into(),
                score: 0.5,
            },
        ];
        assert_eq!(
            format_chunks(&chunks),
            vec![
                "[Source 1: ETFs]\nFunds that trade.".to_string(),
                "[Source 2: Bonds]\nLoans to issuers.".to_string()
            ]
        );
    }
}
