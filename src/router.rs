//! Query Router
//!
//! Picks the specialist agent for a query by keyword scoring:
//! - each domain has a static keyword table, one point per matching term
//! - ties go to the more specific domain (tax > portfolio > market > news > goal > finance)
//! - no domain match falls back to finance for general money talk, otherwise reject

use crate::models::AgentDomain;
use tracing::debug;

/// Static keyword tables, matched on whole words
const TAX_KEYWORDS: &[&str] = &[
    "tax", "taxes", "taxed", "taxable", "irs", "deduction", "deductions", "deductible",
    "capital gains", "tax bracket", "write off", "refund", "filing", "w 2", "1099",
    "401k", "401 k", "ira", "roth", "hsa",
];

const PORTFOLIO_KEYWORDS: &[&str] = &[
    "portfolio", "portfolios", "allocation", "asset allocation", "rebalance", "rebalancing",
    "diversify", "diversification", "diversified", "holdings", "risk tolerance", "my stocks",
    "my investments",
];

const MARKET_KEYWORDS: &[&str] = &[
    "market", "markets", "stock market", "stock price", "share price", "price of", "ticker",
    "s p 500", "dow", "nasdaq", "trading", "bull", "bear", "rally", "sell off", "today",
    "quote", "volatility",
];

const NEWS_KEYWORDS: &[&str] = &[
    "news", "headline", "headlines", "latest", "announcement", "announced", "earnings report",
    "fed", "federal reserve", "this week", "recent", "recently", "happened",
];

const GOAL_KEYWORDS: &[&str] = &[
    "goal", "goals", "save for", "saving for", "retire", "retirement", "emergency fund",
    "down payment", "college", "plan for", "target", "by age", "house", "wedding",
    "how much should i save", "financial plan",
];

const FINANCE_KEYWORDS: &[&str] = &[
    "compound interest", "interest", "interest rate", "budget", "budgeting", "credit",
    "credit score", "debt", "loan", "loans", "mortgage", "etf", "etfs", "index fund",
    "index funds", "mutual fund", "bond", "bonds", "stock", "stocks", "dividend", "dividends",
    "inflation", "apr", "apy", "savings", "invest", "investing", "investment", "asset", "assets",
];

/// Weaker signals that still make a query financial
const GENERAL_FINANCE_TERMS: &[&str] = &[
    "money", "finance", "finances", "financial", "bank", "banking", "cash", "pay", "salary",
    "income", "spend", "spending", "wealth", "economy", "save", "saving", "afford",
];

/// Tie-break order, most specific first
const PRIORITY: [(AgentDomain, &[&str]); 6] = [
    (AgentDomain::Tax, TAX_KEYWORDS),
    (AgentDomain::Portfolio, PORTFOLIO_KEYWORDS),
    (AgentDomain::Market, MARKET_KEYWORDS),
    (AgentDomain::News, NEWS_KEYWORDS),
    (AgentDomain::Goal, GOAL_KEYWORDS),
    (AgentDomain::Finance, FINANCE_KEYWORDS),
];

/// Keyword router
#[derive(Debug, Default, Clone, Copy)]
pub struct QueryRouter;

impl QueryRouter {
    pub fn new() -> Self {
        Self
    }

    pub fn route(&self, query: &str) -> AgentDomain {
        let text = normalize(query);

        let mut best = (AgentDomain::Reject, 0usize);
        for (domain, keywords) in PRIORITY {
            let score = keywords.iter().filter(|kw| contains_term(&text, kw)).count();
            // strict > keeps the earlier (higher priority) domain on ties
            if score > best.1 {
                best = (domain, score);
            }
        }

        let domain = match best {
            (domain, score) if score > 0 => domain,
            _ if GENERAL_FINANCE_TERMS.iter().any(|t| contains_term(&text, t)) => {
                AgentDomain::Finance
            }
            _ => AgentDomain::Reject,
        };

        debug!(agent = %domain, score = best.1, "Query routed");
        domain
    }
}

/// Lowercase, punctuation to spaces, padded so terms match on word edges
fn normalize(query: &str) -> String {
    let mut text = String::with_capacity(query.len() + 2);
    text.push(' ');
    let mut last_space = true;
    for c in query.to_lowercase().chars() {
        if c.is_alphanumeric() {
            text.push(c);
            last_space = false;
        } else if !last_space {
            text.push(' ');
            last_space = true;
        }
    }
    if !last_space {
        text.push(' ');
    }
    text
}

fn contains_term(padded: &str, term: &str) -> bool {
    padded.match_indices(term).any(|(idx, _)| {
        let before = padded[..idx].ends_with(' ');
        let after = padded[idx + term.len()..].starts_with(' ');
        before && after
    })
}
