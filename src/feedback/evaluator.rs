//! Quality evaluators run by the feedback worker

use crate::error::AssistantError;
use crate::llm::{LanguageModel, Prompt};
use crate::models::FeedbackTask;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub const MAX_SCORE: f32 = 5.0;

/// Scores an answer in `[0, 5]`
#[async_trait]
pub trait QualityEvaluator: Send + Sync {
    fn name(&self) -> &'static str;

    async fn score(&self, task: &FeedbackTask) -> Result<f32>;
}

/// Cheap text heuristics, no model call
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicEvaluator;

impl HeuristicEvaluator {
    const EXAMPLE_MARKERS: [&'static str; 3] = ["example", "for instance", "such as"];
    const DISCLAIMER_MARKERS: [&'static str; 4] = ["consult", "professional", "advisor", "disclaimer"];

    pub fn score_text(&self, response: &str, agent_name: &str) -> f32 {
        let length = response.chars().count();
        let lowered = response.to_lowercase();
        let mut score = MAX_SCORE;

        if length < 50 {
            score -= 2.0;
        } else if length < 100 {
            score -= 0.5;
        }

        if lowered.contains("i don't know") && length < 150 {
            score -= 1.5;
        }

        if Self::EXAMPLE_MARKERS.iter().any(|m| lowered.contains(m)) {
            score += 0.3;
        }

        if response.chars().any(|c| c.is_ascii_digit()) {
            score += 0.2;
        }

        if matches!(agent_name, "tax" | "portfolio")
            && !Self::DISCLAIMER_MARKERS.iter().any(|m| lowered.contains(m))
        {
            score -= 1.0;
        }

        score.clamp(0.0, MAX_SCORE)
    }
}

#[async_trait]
impl QualityEvaluator for HeuristicEvaluator {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    async fn score(&self, task: &FeedbackTask) -> Result<f32> {
        Ok(self.score_text(&task.response, &task.agent_name))
    }
}

/// Scores parsed from a judge reply
#[derive(Debug, Default, Clone, PartialEq)]
pub struct JudgeScores {
    pub overall: Option<u8>,
    pub accuracy: Option<u8>,
    pub completeness: Option<u8>,
    pub clarity: Option<u8>,
    pub safety: Option<u8>,
}

impl JudgeScores {
    pub const DEFAULT_SCORE: f32 = 3.0;

    pub fn parse(reply: &str) -> Self {
        Self {
            overall: extract_score(reply, "overall score"),
            accuracy: extract_score(reply, "accuracy score"),
            completeness: extract_score(reply, "completeness score"),
            clarity: extract_score(reply, "clarity score"),
            safety: extract_score(reply, "safety score"),
        }
    }

    /// Overall score, else the mean of the dimensions found, else 3
    pub fn resolve(&self) -> f32 {
        if let Some(overall) = self.overall {
            return f32::from(overall);
        }

        let dims: Vec<f32> = [self.accuracy, self.completeness, self.clarity, self.safety]
            .into_iter()
            .flatten()
            .map(f32::from)
            .collect();

        if dims.is_empty() {
            Self::DEFAULT_SCORE
        } else {
            dims.iter().sum::<f32>() / dims.len() as f32
        }
    }
}

/// Accepts "Overall Score (1-5): 4", "overall score: 4/5", "Overall Score [4]"
fn extract_score(reply: &str, label: &str) -> Option<u8> {
    let lowered = reply.to_lowercase();

    for (idx, _) in lowered.match_indices(label) {
        let mut rest = lowered[idx + label.len()..].trim_start();
        if let Some(stripped) = rest.strip_prefix("(1-5)") {
            rest = stripped;
        }
        let rest = rest.trim_start_matches(|c: char| c.is_whitespace() || matches!(c, ':' | '-' | '['));

        if let Some(digit) = rest.chars().next().and_then(|c| c.to_digit(10)) {
            if (1..=5).contains(&digit) {
                return Some(digit as u8);
            }
        }
    }
    None
}

/// Asks a language model to grade the answer
pub struct LlmJudgeEvaluator {
    model: Arc<dyn LanguageModel>,
}

impl LlmJudgeEvaluator {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    fn build_prompt(task: &FeedbackTask) -> Prompt {
        let system = format!(
            "You are an expert evaluator of {} answers from a financial education assistant. \
             Grade each answer on:\n\
             1. Accuracy - factual and financial correctness\n\
             2. Completeness - addresses every part of the question\n\
             3. Clarity - easy to follow and well structured\n\
             4. Safety - appropriate disclaimers, no harmful advice",
            task.agent_name
        );

        let user = format!(
            "User Query: {}\n\nAgent Response: {}\n\n\
             Reply in exactly this format:\n\
             Overall Score (1-5): [score]\n\
             Accuracy Score (1-5): [score]\n\
             Completeness Score (1-5): [score]\n\
             Clarity Score (1-5): [score]\n\
             Safety Score (1-5): [score]",
            task.query, task.response
        );

        Prompt::new(system, user)
    }
}

#[async_trait]
impl QualityEvaluator for LlmJudgeEvaluator {
    fn name(&self) -> &'static str {
        "llm_judge"
    }

    async fn score(&self, task: &FeedbackTask) -> Result<f32> {
        let reply = self
            .model
            .generate(&Self::build_prompt(task), &[])
            .await
            .map_err(|e| AssistantError::Evaluation(format!("judge call failed: {}", e)))?;

        let scores = JudgeScores::parse(&reply.text);
        debug!(task_id = %task.task_id, ?scores, "Judge scores parsed");
        Ok(scores.resolve())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedModel;

    fn task(agent: &str, response: &str) -> FeedbackTask {
        FeedbackTask::new("What is a Roth IRA?", response, agent, 100, 0)
    }

    #[test]
    fn test_heuristic_penalises_short_unhelpful_answers() {
        let eval = HeuristicEvaluator;
        // 5 - 2 (short) - 1.5 (i don't know)
        assert!((eval.score_text("I don't know.", "finance") - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_heuristic_rewards_examples_and_numbers() {
        let eval = HeuristicEvaluator;
        let text = "A Roth IRA is funded with after-tax money. For example, contributing \
            $6,000 a year lets qualified withdrawals come out tax free in retirement.";
        // capped at 5
        assert_eq!(eval.score_text(text, "finance"), 5.0);
    }

    #[test]
    fn test_heuristic_tax_without_disclaimer() {
        let eval = HeuristicEvaluator;
        let text = "Capital gains on assets held over 1 year are taxed at long-term rates \
            which are lower than ordinary income rates for most people.";
        // 5 + 0.2 (digit) - 1 (no disclaimer)
        assert!((eval.score_text(text, "tax") - 4.2).abs() < 1e-5);
    }

    #[test]
    fn test_parse_full_reply() {
        let reply = "Overall Score (1-5): 4\nAccuracy Score (1-5): 5\n\
            Completeness Score (1-5): 3\nClarity Score (1-5): 4\nSafety Score (1-5): 4";
        let scores = JudgeScores::parse(reply);
        assert_eq!(scores.overall, Some(4));
        assert_eq!(scores.accuracy, Some(5));
        assert_eq!(scores.resolve(), 4.0);
    }

    #[test]
    fn test_parse_variants_and_fallbacks() {
        assert_eq!(extract_score("overall score: 2/5", "overall score"), Some(2));
        assert_eq!(extract_score("Overall Score [5]", "overall score"), Some(5));
        assert_eq!(extract_score("Overall Score (1-5): 9", "overall score"), None);

        let dims_only = JudgeScores::parse("Accuracy Score: 4\nClarity Score: 2");
        assert_eq!(dims_only.resolve(), 3.0);
        let dims_only = JudgeScores::parse("Accuracy Score: 5\nClarity Score: 4");
        assert_eq!(dims_only.resolve(), 4.5);

        assert_eq!(JudgeScores::parse("no scores here").resolve(), JudgeScores::DEFAULT_SCORE);
    }

    #[tokio::test]
    async fn test_judge_uses_model_reply() {
        let model = Arc::new(ScriptedModel::new(vec![Ok("Overall Score (1-5): 2".to_string())]));
        let judge = LlmJudgeEvaluator::new(model.clone());

        let score = judge.score(&task("tax", "Taxes exist.")).await.unwrap();
        assert_eq!(score, 2.0);
        assert!(model.prompts()[0].user.contains("Agent Response: Taxes exist."));
    }

    #[tokio::test]
    async fn test_judge_failure_is_evaluation_error() {
        let judge = LlmJudgeEvaluator::new(Arc::new(ScriptedModel::new(vec![])));
        let result = judge.score(&task("finance", "x")).await;
        assert!(matches!(result, Err(AssistantError::Evaluation(_))));
    }
}
