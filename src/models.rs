//! Core data models for the finance assistant

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Document context shorter than this (after trimming) is treated as noise by
/// the router, not as an uploaded document.
pub const MIN_ROUTABLE_CONTEXT_CHARS: usize = 20;

//
// ================= Enums =================
//

/// The classified category of a query. Derived once per query and immutable
/// afterwards; every routing decision keys off this value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    DocumentOnly,
    MarketData,
    NewsSearch,
    MarketAndNews,
    GeneralChat,
}

/// Identifies which handler node produced a result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    MarketData,
    News,
    Document,
    GeneralChat,
}

/// Why a handler run produced no usable answer. Soft failures only: these
/// feed escalation and apology selection, never the caller's error channel.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    #[error("provider unavailable")]
    ProviderUnavailable,

    #[error("no data found")]
    NoDataFound,

    #[error("response not relevant to the query")]
    NotRelevant,

    #[error("upstream error: {0}")]
    UpstreamError(String),
}

//
// ================= Query =================
//

/// Immutable input to one orchestration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query_id: Uuid,
    pub text: String,
    pub document_context: String,
    pub asked_at: DateTime<Utc>,
}

impl QueryRequest {
    pub fn new(text: impl Into<String>, document_context: impl Into<String>) -> Self {
        Self {
            query_id: Uuid::new_v4(),
            text: text.into(),
            document_context: document_context.into(),
            asked_at: Utc::now(),
        }
    }

    /// Whether enough document context was supplied for routing to consider
    /// the document path at all. Counts characters, not bytes, so multibyte
    /// snippets are measured the same as ASCII ones.
    pub fn has_document_context(&self) -> bool {
        self.document_context.trim().chars().count() > MIN_ROUTABLE_CONTEXT_CHARS
    }

    /// Date stamp used to anchor prompts to "today".
    pub fn date_stamp(&self) -> String {
        self.asked_at.format("%Y-%m-%d").to_string()
    }
}

//
// ================= Handler Results =================
//

/// Output of exactly one handler node invocation. Synthesis reads these,
/// never edits them in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerResult {
    pub source: HandlerKind,
    pub text: String,
    pub succeeded: bool,
    pub failure: Option<FailureReason>,
}

impl HandlerResult {
    pub fn success(source: HandlerKind, text: impl Into<String>) -> Self {
        Self {
            source,
            text: text.into(),
            succeeded: true,
            failure: None,
        }
    }

    pub fn failure(source: HandlerKind, reason: FailureReason) -> Self {
        Self {
            source,
            text: String::new(),
            succeeded: false,
            failure: Some(reason),
        }
    }
}

/// Results accumulated by one engine run, keyed by handler, plus the
/// fallback-attempt counter. Owned exclusively by that run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HandlerOutcomes {
    results: HashMap<HandlerKind, HandlerResult>,
    pub fallback_attempts: u32,
}

/// Fixed iteration order so synthesis output is deterministic regardless of
/// execution interleaving.
const OUTCOME_ORDER: [HandlerKind; 4] = [
    HandlerKind::MarketData,
    HandlerKind::News,
    HandlerKind::Document,
    HandlerKind::GeneralChat,
];

impl HandlerOutcomes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, result: HandlerResult) {
        self.results.insert(result.source, result);
    }

    pub fn get(&self, kind: HandlerKind) -> Option<&HandlerResult> {
        self.results.get(&kind)
    }

    pub fn succeeded(&self, kind: HandlerKind) -> bool {
        self.get(kind).map(|r| r.succeeded).unwrap_or(false)
    }

    /// Texts of all succeeded handlers, in stable handler order.
    pub fn succeeded_texts(&self) -> Vec<&str> {
        OUTCOME_ORDER
            .iter()
            .filter_map(|kind| self.get(*kind))
            .filter(|r| r.succeeded && !r.text.trim().is_empty())
            .map(|r| r.text.as_str())
            .collect()
    }

    pub fn escalated(&self) -> bool {
        self.fallback_attempts > 0
    }
}

//
// ================= Final Outcome =================
//

/// Everything one orchestration run produced, for callers that want more
/// than the answer string (API layer, CLI trace printout).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub query_id: Uuid,
    pub intent: Intent,
    pub answer: String,
    pub outcomes: HandlerOutcomes,
    pub stage_trace: Vec<String>,
    pub elapsed_ms: u64,
    pub completed_at: DateTime<Utc>,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Intent::DocumentOnly => "document_only",
            Intent::MarketData => "market_data",
            Intent::NewsSearch => "news_search",
            Intent::MarketAndNews => "market_and_news",
            Intent::GeneralChat => "general_chat",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HandlerKind::MarketData => "market_data",
            HandlerKind::News => "news",
            HandlerKind::Document => "document",
            HandlerKind::GeneralChat => "general_chat",
        };
        write!(f, "{}", s)
    }
}
