//! Language model trait and implementations
//!
//! Agents hand the model a system instruction, the user's turn and any
//! retrieved context. The model returns plain answer text.

use crate::models::Generation;
use crate::Result;
use async_trait::async_trait;
use std::time::Instant;

pub mod gemini;
#[cfg(test)]
mod scripted;

pub use gemini::{GeminiClient, GeminiEmbedder};
#[cfg(test)]
pub(crate) use scripted::ScriptedModel;

/// One generation request
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }

    /// Same system instruction with extra lines appended to the user turn
    pub fn with_instructions(&self, instructions: &[&str]) -> Self {
        if instructions.is_empty() {
            return self.clone();
        }

        let mut user = self.user.clone();
        user.push_str("\n\nWhen answering:");
        for line in instructions {
            user.push_str("\n- ");
            user.push_str(line);
        }

        Self {
            system: self.system.clone(),
            user,
        }
    }

    /// User turn with context blocks placed ahead of the question
    pub fn render_user(&self, context: &[String]) -> String {
        if context.is_empty() {
            return self.user.clone();
        }

        format!(
            "Use the following reference material where relevant.\n\n{}\n\nQuestion: {}",
            context.join("\n\n"),
            self.user
        )
    }
}

/// Trait for answer generation (LLM controlled)
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &Prompt, context: &[String]) -> Result<Generation>;
}

/// Offline model for development.
/// Keeps the assistant functional without an API key.
pub struct MockModel;

#[async_trait]
impl LanguageModel for MockModel {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, prompt: &Prompt, context: &[String]) -> Result<Generation> {
        let started = Instant::now();

        let mut text = format!(
            "Here is an educational overview for your question: \"{}\". ",
            prompt.user.lines().next().unwrap_or_default().trim()
        );
        if let Some(first) = context.first() {
            text.push_str("From the reference material: ");
            text.push_str(first.lines().last().unwrap_or_default());
            text.push(' ');
        }
        text.push_str(
            "For example, setting aside 10% of a $3,000 monthly income builds $3,600 in a year. \
             This is general education and not financial advice; consult a licensed professional \
             for decisions about your own situation.",
        );

        Ok(Generation {
            text,
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_instructions_appends_lines() {
        let prompt = Prompt::new("system", "What is an ETF?");
        let retried = prompt.with_instructions(&["Be specific.", "Give an example."]);

        assert_eq!(retried.system, "system");
        assert!(retried.user.starts_with("What is an ETF?"));
        assert!(retried.user.contains("- Be specific.\n- Give an example."));
        assert_eq!(prompt.with_instructions(&[]), prompt);
    }

    #[test]
    fn test_render_user_with_context() {
        let prompt = Prompt::new("system", "What is an ETF?");
        assert_eq!(prompt.render_user(&[]), "What is an ETF?");

        let rendered = prompt.render_user(&["[Source 1: ETFs]\nFunds that trade.".to_string()]);
        assert!(rendered.contains("[Source 1: ETFs]"));
        assert!(rendered.ends_with("Question: What is an ETF?"));
    }

    #[tokio::test]
    async fn test_mock_model_mentions_question_and_disclaimer() {
        let generation = MockModel
            .generate(&Prompt::new("s", "What is a budget?"), &[])
            .await
            .unwrap();
        assert!(generation.text.contains("What is a budget?"));
        assert!(generation.text.contains("consult"));
    }
}
