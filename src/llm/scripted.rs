//! Canned language model for tests

use super::{LanguageModel, Prompt};
use crate::error::AssistantError;
use crate::models::Generation;
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Replays a fixed list of replies in order and records every prompt it saw
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String>>>,
    // answer once the script runs out
    fallback: Option<String>,
    prompts: Mutex<Vec<Prompt>>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Result<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            fallback: None,
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Every call answers with the same text
    pub fn always(text: &str) -> Self {
        Self {
            fallback: Some(text.to_string()),
            ..Self::new(Vec::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &Prompt, _context: &[String]) -> Result<Generation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(prompt.clone());

        let reply = self
            .replies
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front()
            .unwrap_or_else(|| match &self.fallback {
                Some(text) => Ok(text.clone()),
                None => Err(AssistantError::Llm("script exhausted".to_string())),
            });

        reply.map(|text| Generation {
            text,
            latency_ms: 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_model_replays_then_errors() {
        let model = ScriptedModel::new(vec![
            Ok("first".to_string()),
            Err(AssistantError::Llm("boom".to_string())),
        ]);
        let prompt = Prompt::new("s", "q");

        assert_eq!(model.generate(&prompt, &[]).await.unwrap().text, "first");
        assert!(model.generate(&prompt, &[]).await.is_err());
        assert!(model.generate(&prompt, &[]).await.is_err());
        assert_eq!(model.calls(), 3);
        assert_eq!(model.prompts().len(), 3);
    }
}
