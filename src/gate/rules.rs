//! Standard gate rules

use crate::gate::{GateRule, NormalizedText};
use crate::models::{AgentDomain, RetryReason};

/// Rule: answer must reach a per-domain minimum length
pub struct LengthRule {
    finance: usize,
    portfolio: usize,
    tax: usize,
    goal: usize,
    market: usize,
    news: usize,
}

impl LengthRule {
    pub fn min_chars(&self, domain: AgentDomain) -> usize {
        match domain {
            AgentDomain::Finance => self.finance,
            AgentDomain::Portfolio => self.portfolio,
            AgentDomain::Tax => self.tax,
            AgentDomain::Goal => self.goal,
            AgentDomain::Market => self.market,
            AgentDomain::News => self.news,
            AgentDomain::Reject => 0,
        }
    }
}

impl Default for LengthRule {
    fn default() -> Self {
        Self {
            finance: 100,
            portfolio: 100,
            tax: 100,
            goal: 80,
            market: 60,
            news: 60,
        }
    }
}

impl GateRule for LengthRule {
    fn name(&self) -> &'static str {
        "min_length"
    }

    fn flag(&self) -> RetryReason {
        RetryReason::TooShort
    }

    fn fails(&self, text: &NormalizedText<'_>, domain: AgentDomain) -> bool {
        text.char_count < self.min_chars(domain)
    }
}

/// Rule: no refusal or hedging boilerplate
pub struct UnhelpfulPhraseRule {
    phrases: Vec<&'static str>,
}

impl Default for UnhelpfulPhraseRule {
    fn default() -> Self {
        Self {
            phrases: vec![
                "i don't know",
                "i do not know",
                "i cannot help with that",
                "i can't help with that",
                "i'm not sure",
                "i am not sure",
                "i am unable to",
                "i'm unable to",
                "as an ai language model",
            ],
        }
    }
}

impl GateRule for UnhelpfulPhraseRule {
    fn name(&self) -> &'static str {
        "unhelpful_phrase"
    }

    fn flag(&self) -> RetryReason {
        RetryReason::UnhelpfulPhrase
    }

    fn fails(&self, text: &NormalizedText<'_>, _domain: AgentDomain) -> bool {
        text.contains_any(&self.phrases)
    }
}

/// Rule: tax and portfolio answers point the user at a professional
pub struct SafetyDisclaimerRule {
    markers: Vec<&'static str>,
}

impl Default for SafetyDisclaimerRule {
    fn default() -> Self {
        Self {
            markers: vec![
                "consult",
                "professional",
                "advisor",
                "disclaimer",
                "not financial advice",
            ],
        }
    }
}

impl GateRule for SafetyDisclaimerRule {
    fn name(&self) -> &'static str {
        "safety_disclaimer"
    }

    fn flag(&self) -> RetryReason {
        RetryReason::MissingDisclaimer
    }

    fn fails(&self, text: &NormalizedText<'_>, domain: AgentDomain) -> bool {
        matches!(domain, AgentDomain::Tax | AgentDomain::Portfolio)
            && !text.contains_any(&self.markers)
    }
}

/// Rule: educational finance answers include a worked example
pub struct ExampleRule {
    markers: Vec<&'static str>,
}

impl Default for ExampleRule {
    fn default() -> Self {
        Self {
            markers: vec!["example", "for instance", "such as", "e.g.", "imagine"],
        }
    }
}

impl GateRule for ExampleRule {
    fn name(&self) -> &'static str {
        "concrete_example"
    }

    fn flag(&self) -> RetryReason {
        RetryReason::MissingExample
    }

    fn fails(&self, text: &NormalizedText<'_>, domain: AgentDomain) -> bool {
        domain == AgentDomain::Finance && !text.contains_any(&self.markers)
    }
}

/// Rule: market answers quote at least one figure
pub struct NumberRule;

impl GateRule for NumberRule {
    fn name(&self) -> &'static str {
        "market_figure"
    }

    fn flag(&self) -> RetryReason {
        RetryReason::MissingNumber
    }

    fn fails(&self, text: &NormalizedText<'_>, domain: AgentDomain) -> bool {
        domain == AgentDomain::Market && !text.original.chars().any(|c| c.is_ascii_digit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_counts_trimmed_chars() {
        let rule = LengthRule::default();
        let padded = format!("   {}   ", "é".repeat(60));
        let text = NormalizedText::new(&padded);

        assert_eq!(text.char_count, 60);
        assert!(!rule.fails(&text, AgentDomain::Market));
        assert!(rule.fails(&text, AgentDomain::Goal));
    }

    #[test]
    fn test_example_rule_only_for_finance() {
        let rule = ExampleRule::default();
        let text = NormalizedText::new("Budgeting is planning spending.");
        assert!(rule.fails(&text, AgentDomain::Finance));
        assert!(!rule.fails(&text, AgentDomain::Goal));

        let text = NormalizedText::new("Costs such as rent come first.");
        assert!(!rule.fails(&text, AgentDomain::Finance));
    }

    #[test]
    fn test_disclaimer_is_case_insensitive() {
        let rule = SafetyDisclaimerRule::default();
        let text = NormalizedText::new("Rebalance yearly. This is NOT FINANCIAL ADVICE.");
        assert!(!rule.fails(&text, AgentDomain::Portfolio));
    }
}
