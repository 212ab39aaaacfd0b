//! Intent classification
//!
//! Two-tier routing: a completion-backed primary classifier picks one of
//! five labels; any failure (transport, quota, unrecognized label) degrades
//! to deterministic keyword rules. The pipeline is never blocked by an
//! unreliable classification service.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::completion::CompletionService;
use crate::error::{OrchestrationError, Result};
use crate::models::Intent;

/// Route decision seam. The engine owns one of these; tests substitute
/// fixed-route doubles.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, query: &str, has_document_context: bool) -> Intent;
}

//
// ================= Keyword Fallback =================
//

/// Query terms that point at an uploaded document. Only consulted when
/// document context is actually available.
const DOCUMENT_KEYWORDS: &[&str] = &["document", "report", "file", "this", "uploaded"];

/// Query terms that make a question market-data work. "risk" is included:
/// portfolio-risk questions are answered from holdings quotes.
const FINANCIAL_KEYWORDS: &[&str] = &[
    "price",
    "stock",
    "market",
    "trading",
    "portfolio",
    "earnings",
    "financial",
    "risk",
];

/// Deterministic classification. Rules apply in strict order:
/// document check, then financial check, then the chat default.
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn classify(query: &str, has_document_context: bool) -> Intent {
        let query_lower = query.to_lowercase();

        if has_document_context
            && DOCUMENT_KEYWORDS
                .iter()
                .any(|keyword| query_lower.contains(keyword))
        {
            return Intent::DocumentOnly;
        }

        if FINANCIAL_KEYWORDS
            .iter()
            .any(|keyword| query_lower.contains(keyword))
        {
            return Intent::MarketData;
        }

        Intent::GeneralChat
    }
}

//
// ================= Completion-Backed Primary =================
//

const ROUTING_INSTRUCTIONS: &str = r#"You route financial questions to the right capability.

Labels:
1. DOCUMENT_ONLY: questions about uploaded documents (earnings reports, annual reports, filings)
2. MARKET_DATA: current stock prices, market data, real-time quotes
3. NEWS_SEARCH: latest news, recent events, market sentiment
4. MARKET_AND_NEWS: needs both current market data AND recent news
5. GENERAL_CHAT: greetings, casual conversation, non-financial questions

Examples:
- "What's in the uploaded earnings report?" -> DOCUMENT_ONLY
- "Apple stock price today?" -> MARKET_DATA
- "Latest Tesla news?" -> NEWS_SEARCH
- "NVDA price and recent news?" -> MARKET_AND_NEWS
- "Hello, how are you?" -> GENERAL_CHAT

Respond with ONLY the label: DOCUMENT_ONLY, MARKET_DATA, NEWS_SEARCH, MARKET_AND_NEWS, or GENERAL_CHAT"#;

const INTENT_LABELS: &[(&str, Intent)] = &[
    ("DOCUMENT_ONLY", Intent::DocumentOnly),
    ("MARKET_AND_NEWS", Intent::MarketAndNews),
    ("MARKET_DATA", Intent::MarketData),
    ("NEWS_SEARCH", Intent::NewsSearch),
    ("GENERAL_CHAT", Intent::GeneralChat),
];

/// Primary classifier: one completion call, strict label parse, no retries.
pub struct CompletionClassifier {
    completion: Arc<dyn CompletionService>,
}

impl CompletionClassifier {
    pub fn new(completion: Arc<dyn CompletionService>) -> Self {
        Self { completion }
    }

    pub async fn classify(&self, query: &str, has_document_context: bool) -> Result<Intent> {
        let input = format!(
            "Query: \"{}\"\nDocument context available: {}\nToday's date: {}",
            query,
            has_document_context,
            Utc::now().format("%Y-%m-%d")
        );

        let raw = self.completion.complete(ROUTING_INSTRUCTIONS, &input).await?;

        parse_intent_label(&raw).ok_or_else(|| {
            OrchestrationError::Unknown(format!("unrecognized intent label: {}", raw))
        })
    }
}

/// Parses a model reply into an intent. Exact match first, then a substring
/// scan so verbose replies ("The label is MARKET_DATA.") still resolve.
fn parse_intent_label(raw: &str) -> Option<Intent> {
    let cleaned = raw
        .trim()
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
        .to_uppercase();

    for (label, intent) in INTENT_LABELS {
        if cleaned == *label {
            return Some(*intent);
        }
    }

    for (label, intent) in INTENT_LABELS {
        if cleaned.contains(label) {
            return Some(*intent);
        }
    }

    None
}

//
// ================= Composed Strategy Pair =================
//

/// LLM-first, keyword-fallback. The only `IntentClassifier` used in
/// production wiring.
pub struct TieredClassifier {
    primary: CompletionClassifier,
}

impl TieredClassifier {
    pub fn new(completion: Arc<dyn CompletionService>) -> Self {
        Self {
            primary: CompletionClassifier::new(completion),
        }
    }
}

#[async_trait]
impl IntentClassifier for TieredClassifier {
    async fn classify(&self, query: &str, has_document_context: bool) -> Intent {
        match self.primary.classify(query, has_document_context).await {
            Ok(intent) => {
                debug!(intent = %intent, "Primary classifier selected route");
                intent
            }
            Err(e) => {
                warn!("Primary classifier unusable ({}); applying keyword rules", e);
                let intent = KeywordClassifier::classify(query, has_document_context);
                debug!(intent = %intent, "Keyword fallback selected route");
                intent
            }
        }
    }
}
