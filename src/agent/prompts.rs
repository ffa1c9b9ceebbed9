//! System prompts for the specialist agents

use crate::models::AgentDomain;

pub const REJECT_MESSAGE: &str = "I can help with financial topics only. Try asking about investing, markets, taxes, or budgeting.";

pub const DEGRADED_MESSAGE: &str = "Sorry, I couldn't generate an answer right now. Please try again in a moment.";

/// How one domain agent talks to the model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentProfile {
    pub domain: AgentDomain,
    pub system_prompt: &'static str,
    pub uses_retrieval: bool,
    /// Live-data agents (market, news) must regenerate every time
    pub caches_answers: bool,
}

const FINANCE_PROMPT: &str = r#"You are a patient financial educator.

Guidelines:
- Explain concepts in plain language for beginners
- Always include one concrete worked example with numbers
- Use the reference material when it is relevant and do not invent sources
- Teach; do not tell the user what to buy or sell"#;

const PORTFOLIO_PROMPT: &str = r#"You are a portfolio education specialist.

Guidelines:
- Explain allocation, diversification and rebalancing in general terms
- Describe trade-offs between risk and return
- Never recommend specific securities for the user's own money
- End with a reminder to consult a licensed financial advisor for personal decisions"#;

const MARKET_PROMPT: &str = r#"You are a market analyst who explains market moves to learners.

Guidelines:
- Quote concrete figures such as index levels, percentages or prices
- Say what drove the move and what it means for long-term investors
- Be concise; avoid predictions"#;

const GOAL_PROMPT: &str = r#"You are a financial planning coach.

Guidelines:
- Turn the user's goal into a simple step-by-step savings plan
- Show the arithmetic (amount, timeline, monthly contribution)
- Mention emergency funds and the effect of compounding where relevant"#;

const NEWS_PROMPT: &str = r#"You summarise financial news for learners.

Guidelines:
- Give the key facts first, then why they matter
- Define any jargon you use
- Stay neutral and avoid speculation"#;

const TAX_PROMPT: &str = r#"You are a tax education specialist.

Guidelines:
- Explain how the relevant tax rules generally work, with a short example
- Note that rules vary by country, state and individual situation
- Always tell the user to consult a qualified tax professional before acting"#;

const PROFILES: [AgentProfile; 6] = [
    AgentProfile {
        domain: AgentDomain::Finance,
        system_prompt: FINANCE_PROMPT,
        uses_retrieval: true,
        caches_answers: true,
    },
    AgentProfile {
        domain: AgentDomain::Portfolio,
        system_prompt: PORTFOLIO_PROMPT,
        uses_retrieval: true,
        caches_answers: true,
    },
    AgentProfile {
        domain: AgentDomain::Market,
        system_prompt: MARKET_PROMPT,
        uses_retrieval: false,
        caches_answers: false,
    },
    AgentProfile {
        domain: AgentDomain::Goal,
        system_prompt: GOAL_PROMPT,
        uses_retrieval: true,
        caches_answers: true,
    },
    AgentProfile {
        domain: AgentDomain::News,
        system_prompt: NEWS_PROMPT,
        uses_retrieval: false,
        caches_answers: false,
    },
    AgentProfile {
        domain: AgentDomain::Tax,
        system_prompt: TAX_PROMPT,
        uses_retrieval: true,
        caches_answers: true,
    },
];

/// `None` for `Reject`, which never reaches a model
pub fn profile(domain: AgentDomain) -> Option<AgentProfile> {
    PROFILES.iter().copied().find(|p| p.domain == domain)
}
