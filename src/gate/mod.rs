//! Fast-failure gate for generated answers
//!
//! Rules-based check run on every fresh answer before it is returned.
//! Deterministic, synchronous, no I/O.

pub mod rules;

use crate::models::{AgentDomain, RetryDecision, RetryReason};
use tracing::{debug, info};

pub use rules::{
    ExampleRule, LengthRule, NumberRule, SafetyDisclaimerRule, UnhelpfulPhraseRule,
};

/// Trait for gate rules
pub trait GateRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Flag raised when this rule fails
    fn flag(&self) -> RetryReason;

    /// `text` is already trimmed and lowercased with apostrophes normalised
    fn fails(&self, text: &NormalizedText<'_>, domain: AgentDomain) -> bool;
}

/// Answer text prepared once for all rules
pub struct NormalizedText<'a> {
    pub original: &'a str,
    pub lowered: String,
    pub char_count: usize,
}

impl<'a> NormalizedText<'a> {
    pub fn new(original: &'a str) -> Self {
        let trimmed = original.trim();
        Self {
            original,
            lowered: trimmed
                .to_lowercase()
                .replace(['\u{2018}', '\u{2019}', '\u{02BC}'], "'"),
            char_count: trimmed.chars().count(),
        }
    }

    pub fn contains_any(&self, needles: &[&str]) -> bool {
        needles.iter().any(|n| self.lowered.contains(n))
    }
}

/// Ordered rule table; the first failing rule names the decision's reason
pub struct FastFailureGate {
    rules: Vec<Box<dyn GateRule>>,
}

impl FastFailureGate {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn add_rule(&mut self, rule: Box<dyn GateRule>) {
        self.rules.push(rule);
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn evaluate(&self, response: &str, domain: AgentDomain) -> RetryDecision {
        let text = NormalizedText::new(response);
        let mut flags = Vec::new();

        for rule in &self.rules {
            if rule.fails(&text, domain) {
                debug!(rule = rule.name(), agent = %domain, "Gate rule failed");
                let flag = rule.flag();
                if !flags.contains(&flag) {
                    flags.push(flag);
                }
            }
        }

        let decision = RetryDecision::from_flags(flags);

        info!(
            agent = %domain,
            chars = text.char_count,
            should_retry = decision.should_retry,
            reason = ?decision.reason,
            "Gate evaluated"
        );

        decision
    }
}

impl Default for FastFailureGate {
    fn default() -> Self {
        create_default_gate()
    }
}

/// Gate with the standard rule table
pub fn create_default_gate() -> FastFailureGate {
    let mut gate = FastFailureGate::new();
    gate.add_rule(Box::new(LengthRule::default()));
    gate.add_rule(Box::new(UnhelpfulPhraseRule::default()));
    gate.add_rule(Box::new(SafetyDisclaimerRule::default()));
    gate.add_rule(Box::new(ExampleRule::default()));
    gate.add_rule(Box::new(NumberRule));
    gate
}

//
// ================= Tests =================
//
