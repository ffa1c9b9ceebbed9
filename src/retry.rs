//! Single corrective retry after a failed gate check

use crate::llm::{LanguageModel, Prompt};
use crate::models::{Generation, RetryDecision, RetryReason};
use tracing::{info, warn};

/// What the controller did with a first answer
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome {
    /// Final answer to return
    pub generation: Generation,
    /// A second model call was made
    pub attempted: bool,
    /// `generation` came from that second call
    pub used_retry: bool,
}

impl RetryOutcome {
    pub fn retry_count(&self) -> u32 {
        u32::from(self.attempted)
    }
}

/// Corrective instruction for one gate flag
pub fn corrective_instruction(reason: RetryReason) -> Option<&'static str> {
    match reason {
        RetryReason::TooShort => {
            Some("Give a complete explanation of at least a few sentences, not a one-line reply.")
        }
        RetryReason::UnhelpfulPhrase => Some(
            "Answer directly and confidently with general educational information; do not say you don't know or are unsure.",
        ),
        RetryReason::MissingDisclaimer => Some(
            "End with a short note that this is general education and the user should consult a qualified professional.",
        ),
        RetryReason::MissingExample => {
            Some("Include one concrete worked example with realistic numbers.")
        }
        RetryReason::MissingNumber => {
            Some("Quote at least one specific figure such as a percentage, price or index level.")
        }
        RetryReason::None => None,
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RetryController;

impl RetryController {
    pub fn new() -> Self {
        Self
    }

    /// Re-ask the model once when `decision` says so.
    ///
    /// The second answer is returned as-is even if it would fail the gate
    /// again. A failed or blank second answer keeps `first`.
    pub async fn maybe_retry(
        &self,
        prompt: &Prompt,
        context: &[String],
        first: Generation,
        decision: &RetryDecision,
        model: &dyn LanguageModel,
    ) -> RetryOutcome {
        if !decision.should_retry {
            return RetryOutcome {
                generation: first,
                attempted: false,
                used_retry: false,
            };
        }

        let instructions: Vec<&str> = decision
            .flags
            .iter()
            .filter_map(|flag| corrective_instruction(*flag))
            .collect();
        let corrected = prompt.with_instructions(&instructions);

        info!(reason = ?decision.reason, flags = decision.flags.len(), "Retrying generation");

        match model.generate(&corrected, context).await {
            Ok(second) if !second.text.trim().is_empty() => RetryOutcome {
                generation: Generation {
                    text: second.text,
                    latency_ms: first.latency_ms + second.latency_ms,
                },
                attempted: true,
                used_retry: true,
            },
            Ok(_) => {
                warn!("Retry returned blank text, keeping first answer");
                RetryOutcome {
                    generation: first,
                    attempted: true,
                    used_retry: false,
                }
            }
            Err(e) => {
                warn!("Retry generation failed, keeping first answer: {}", e);
                RetryOutcome {
                    generation: first,
                    attempted: true,
                    used_retry: false,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AssistantError;
    use crate::gate::create_default_gate;
    use crate::llm::ScriptedModel;
    use crate::models::AgentDomain;

    fn first(text: &str) -> Generation {
        Generation {
            text: text.to_string(),
            latency_ms: 10,
        }
    }

    #[tokio::test]
    async fn test_no_retry_when_gate_passes() {
        let model = ScriptedModel::always("unused");
        let outcome = RetryController::new()
            .maybe_retry(
                &Prompt::new("s", "q"),
                &[],
                first("fine"),
                &RetryDecision::pass(),
                &model,
            )
            .await;

        assert_eq!(outcome.generation.text, "fine");
        assert!(!outcome.attempted);
        assert_eq!(outcome.retry_count(), 0);
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_i_dont_know_retries_exactly_once() {
        let gate = create_default_gate();
        // second answer still fails the gate and is returned anyway
        let model = ScriptedModel::new(vec![Ok("Not sure, sorry.".to_string())]);
        let decision = gate.evaluate("I don't know.", AgentDomain::Market);
        assert!(decision.flags.contains(&RetryReason::UnhelpfulPhrase));

        let outcome = RetryController::new()
            .maybe_retry(&Prompt::new("s", "How did markets do?"), &[], first("I don't know."), &decision, &model)
            .await;

        assert_eq!(model.calls(), 1);
        assert!(outcome.attempted && outcome.used_retry);
        assert_eq!(outcome.generation.text, "Not sure, sorry.");
        assert_eq!(outcome.retry_count(), 1);

        let sent = &model.prompts()[0];
        assert!(sent.user.contains("do not say you don't know"));
        assert!(sent.user.contains("specific figure"));
    }

    #[tokio::test]
    async fn test_failed_retry_keeps_first_answer() {
        let model = ScriptedModel::new(vec![Err(AssistantError::Llm("timeout".to_string()))]);
        let decision = RetryDecision::from_flags(vec![RetryReason::TooShort]);

        let outcome = RetryController::new()
            .maybe_retry(&Prompt::new("s", "q"), &[], first("short"), &decision, &model)
            .await;

        assert_eq!(outcome.generation.text, "short");
        assert!(outcome.attempted);
        assert!(!outcome.used_retry);
        assert_eq!(outcome.retry_count(), 1);
    }

    #[tokio::test]
    async fn test_blank_retry_keeps_first_answer() {
        let model = ScriptedModel::new(vec![Ok("   ".to_string())]);
        let decision = RetryDecision::from_flags(vec![RetryReason::MissingExample]);

        let outcome = RetryController::new()
            .maybe_retry(&Prompt::new("s", "q"), &[], first("original"), &decision, &model)
            .await;

        assert_eq!(outcome.generation.text, "original");
        assert!(!outcome.used_retry);
    }

    #[test]
    fn test_every_flag_has_an_instruction() {
        for reason in [
            RetryReason::TooShort,
            RetryReason::UnhelpfulPhrase,
            RetryReason::MissingDisclaimer,
            RetryReason::MissingExample,
            RetryReason::MissingNumber,
        ] {
            assert!(corrective_instruction(reason).is_some());
        }
        assert!(corrective_instruction(RetryReason::None).is_none());
    }
}
