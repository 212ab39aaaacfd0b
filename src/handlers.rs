//! Handler nodes
//!
//! One handler per answer source: market quotes, news search, uploaded
//! documents, and plain conversation. Each runs independently against a
//! query and reports a `HandlerResult`; soft failures (no data, irrelevant
//! output) ride inside the result so the engine can escalate or apologize,
//! while infrastructure errors use the `Err` channel.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::completion::CompletionService;
use crate::error::Result;
use crate::models::{FailureReason, HandlerKind, HandlerResult, QueryRequest};
use crate::providers::{MarketDataProvider, NewsSearchProvider};
use crate::relevance::is_relevant;

/// Returned verbatim when a document question arrives with nothing uploaded.
pub const NO_DOCUMENT_CONTEXT_REPLY: &str =
    "No document context available. Upload a document first, then ask about it.";

#[async_trait]
pub trait Handler: Send + Sync {
    /// Which result slot this handler writes.
    fn kind(&self) -> HandlerKind;

    /// Run the handler against one query.
    async fn run(&self, request: &QueryRequest) -> Result<HandlerResult>;
}

//
// ================= Market Data Handler =================
//

const MARKET_ANALYSIS_INSTRUCTIONS: &str = "You are a financial market analyst. Provide a brief \
analysis of the supplied market data, quoting exact prices and percentage moves from it. Keep the \
response to 2-3 sentences. If the data does not cover what was asked, say \"Current market data \
for [company] is not available.\"";

/// Fetches quotes, asks the model for a short analysis, then gates the
/// analysis through the relevancy check before accepting it.
pub struct MarketDataHandler {
    provider: Arc<dyn MarketDataProvider>,
    completion: Arc<dyn CompletionService>,
}

impl MarketDataHandler {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        completion: Arc<dyn CompletionService>,
    ) -> Self {
        Self {
            provider,
            completion,
        }
    }
}

#[async_trait]
impl Handler for MarketDataHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::MarketData
    }

    async fn run(&self, request: &QueryRequest) -> Result<HandlerResult> {
        let payload = match self.provider.fetch(&request.text).await {
            Ok(payload) => payload,
            Err(reason) => {
                warn!(query_id = %request.query_id, %reason, "market data fetch failed");
                return Ok(HandlerResult::failure(HandlerKind::MarketData, reason));
            }
        };

        let input = format!(
            "Current date: {}\n\nMarket data:\n{}\n\nQuery: {}",
            request.date_stamp(),
            payload,
            request.text
        );
        let analysis = self
            .completion
            .complete(MARKET_ANALYSIS_INSTRUCTIONS, &input)
            .await?;

        // A confident-sounding analysis of the wrong thing is worse than
        // admitting failure, so the gate runs on the model output too.
        if !is_relevant(&request.text, &analysis) {
            warn!(query_id = %request.query_id, "market analysis rejected as not relevant");
            return Ok(HandlerResult::failure(
                HandlerKind::MarketData,
                FailureReason::NotRelevant,
            ));
        }

        debug!(query_id = %request.query_id, chars = analysis.len(), "market analysis ready");
        Ok(HandlerResult::success(HandlerKind::MarketData, analysis))
    }
}

//
// ================= News Handler =================
//

const NEWS_SUMMARY_INSTRUCTIONS: &str = "Summarize the latest financial news briefly. Reference \
the current date, highlight only the most important recent developments, keep the summary to 2-3 \
sentences, and include specific dates when the articles carry them.";

/// Runs one or more framed news searches and condenses whatever they find
/// into a dated summary.
pub struct NewsHandler {
    provider: Arc<dyn NewsSearchProvider>,
    completion: Arc<dyn CompletionService>,
}

impl NewsHandler {
    pub fn new(
        provider: Arc<dyn NewsSearchProvider>,
        completion: Arc<dyn CompletionService>,
    ) -> Self {
        Self {
            provider,
            completion,
        }
    }

    /// A query can fan out into several searches when it asks for several
    /// kinds of coverage in one breath ("Tesla earnings news"). A query
    /// that names no particular coverage still gets the headline search.
    fn framed_searches(query: &str) -> Vec<String> {
        let lower = query.to_lowercase();
        let wants_earnings = lower.contains("earnings") || lower.contains("results");
        let wants_sentiment = lower.contains("sentiment");

        let mut searches = Vec::new();
        // Only "earnings" and "sentiment" name specific coverage; "results"
        // adds the earnings search without dropping the headline one.
        if lower.contains("news")
            || lower.contains("latest")
            || (!lower.contains("earnings") && !wants_sentiment)
        {
            searches.push(format!("{} latest financial news", query));
        }
        if wants_earnings {
            searches.push(format!("{} earnings quarterly results", query));
        }
        if wants_sentiment {
            searches.push(format!("{} market sentiment analyst opinion", query));
        }
        searches
    }
}

#[async_trait]
impl Handler for NewsHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::News
    }

    async fn run(&self, request: &QueryRequest) -> Result<HandlerResult> {
        let searches = Self::framed_searches(&request.text);
        let mut fragments = Vec::new();
        let mut last_failure = None;

        for search in &searches {
            match self.provider.fetch(search).await {
                Ok(found) => fragments.push(found),
                Err(reason) => {
                    debug!(query_id = %request.query_id, search = %search, %reason, "news search came back empty");
                    last_failure = Some(reason);
                }
            }
        }

        if fragments.is_empty() {
            let reason = last_failure.unwrap_or(FailureReason::NoDataFound);
            warn!(query_id = %request.query_id, %reason, "every news search failed");
            return Ok(HandlerResult::failure(HandlerKind::News, reason));
        }

        let input = format!(
            "Current date: {}\n\nNews data:\n{}\n\nQuery: {}",
            request.date_stamp(),
            fragments.join("\n\n"),
            request.text
        );
        let summary = self
            .completion
            .complete(NEWS_SUMMARY_INSTRUCTIONS, &input)
            .await?;

        debug!(
            query_id = %request.query_id,
            searches = searches.len(),
            used = fragments.len(),
            "news summary ready"
        );
        Ok(HandlerResult::success(HandlerKind::News, summary))
    }
}

//
// ================= Document Handler =================
//

const DOCUMENT_ANSWER_INSTRUCTIONS: &str = "Answer the question based ONLY on the provided \
document context. Be concise and factual. Provide a brief, direct answer in 2-3 sentences. If the \
context does not contain the answer, say \"The uploaded document doesn't contain information \
about this topic.\"";

/// Answers strictly from the document context carried by the request.
pub struct DocumentHandler {
    completion: Arc<dyn CompletionService>,
}

impl DocumentHandler {
    pub fn new(completion: Arc<dyn CompletionService>) -> Self {
        Self { completion }
    }
}

#[async_trait]
impl Handler for DocumentHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Document
    }

    async fn run(&self, request: &QueryRequest) -> Result<HandlerResult> {
        let context = request.document_context.trim();
        if context.is_empty() {
            // A missing upload is an answerable state, not a failure: the
            // reply tells the user what to do next.
            debug!(query_id = %request.query_id, "document handler invoked with no context");
            return Ok(HandlerResult::success(
                HandlerKind::Document,
                NO_DOCUMENT_CONTEXT_REPLY,
            ));
        }

        let input = format!("Question: {}\n\nDocument context:\n{}", request.text, context);
        let answer = self
            .completion
            .complete(DOCUMENT_ANSWER_INSTRUCTIONS, &input)
            .await?;

        debug!(query_id = %request.query_id, context_chars = context.len(), "document answer ready");
        Ok(HandlerResult::success(HandlerKind::Document, answer))
    }
}

//
// ================= General Chat Handler =================
//

const GENERAL_CHAT_INSTRUCTIONS: &str = "You are a helpful assistant for a finance \
question-and-answer service. Provide a friendly, conversational response in 2-3 sentences. If the \
query is a greeting, respond warmly. If it is a general question, give a brief but informative \
answer.";

/// Catch-all conversational handler. It has no provider to fail, so it
/// either answers or surfaces a completion error.
pub struct GeneralChatHandler {
    completion: Arc<dyn CompletionService>,
}

impl GeneralChatHandler {
    pub fn new(completion: Arc<dyn CompletionService>) -> Self {
        Self { completion }
    }
}

#[async_trait]
impl Handler for GeneralChatHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::GeneralChat
    }

    async fn run(&self, request: &QueryRequest) -> Result<HandlerResult> {
        let input = format!(
            "Today's date: {}\n\nQuery: {}",
            request.date_stamp(),
            request.text
        );
        let reply = self
            .completion
            .complete(GENERAL_CHAT_INSTRUCTIONS, &input)
            .await?;

        Ok(HandlerResult::success(HandlerKind::GeneralChat, reply))
    }
}

//
// ================= Tests =================
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OrchestrationError;
    use crate::providers::FetchResult;
    use std::sync::Mutex;

    struct ScriptedCompletion {
        reply: String,
    }

    #[async_trait]
    impl CompletionService for ScriptedCompletion {
        async fn complete(&self, _instructions: &str, _input: &str) -> Result<String> {
            Ok(self.reply.clone())
        }
    }

    struct FailingCompletion;

    #[async_trait]
    impl CompletionService for FailingCompletion {
        async fn complete(&self, _instructions: &str, _input: &str) -> Result<String> {
            Err(OrchestrationError::RateLimited(
                "completion service quota exhausted".to_string(),
            ))
        }
    }

    struct ScriptedMarket {
        outcome: FetchResult,
    }

    #[async_trait]
    impl MarketDataProvider for ScriptedMarket {
        async fn fetch(&self, _query: &str) -> FetchResult {
            self.outcome.clone()
        }
    }

    struct RecordingNews {
        outcome: FetchResult,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NewsSearchProvider for RecordingNews {
        async fn fetch(&self, query: &str) -> FetchResult {
            self.seen.lock().unwrap().push(query.to_string());
            self.outcome.clone()
        }
    }

    fn scripted(reply: &str) -> Arc<ScriptedCompletion> {
        Arc::new(ScriptedCompletion {
            reply: reply.to_string(),
        })
    }

    #[tokio::test]
    async fn test_market_provider_failure_is_soft() {
        let handler = MarketDataHandler::new(
            Arc::new(ScriptedMarket {
                outcome: Err(FailureReason::ProviderUnavailable),
            }),
            scripted("unused"),
        );

        let result = handler
            .run(&QueryRequest::new("Apple stock price", ""))
            .await
            .unwrap();

        assert!(!result.succeeded);
        assert_eq!(result.failure, Some(FailureReason::ProviderUnavailable));
    }

    #[tokio::test]
    async fn test_market_analysis_passes_relevancy_gate() {
        let handler = MarketDataHandler::new(
            Arc::new(ScriptedMarket {
                outcome: Ok(
                    "Stock quotes:\nAAPL (Apple Inc.): $189.44, +1.20% change, volume 52300000"
                        .to_string(),
                ),
            }),
            scripted("Apple is trading at $189.44, up 1.20% on the day."),
        );

        let result = handler
            .run(&QueryRequest::new("Apple stock price today?", ""))
            .await
            .unwrap();

        assert!(result.succeeded);
        assert!(result.text.contains("$189.44"));
    }

    #[tokio::test]
    async fn test_irrelevant_market_analysis_becomes_soft_failure() {
        let handler = MarketDataHandler::new(
            Arc::new(ScriptedMarket {
                outcome: Ok(
                    "Stock quotes:\nAAPL (Apple Inc.): $189.44, +1.20% change".to_string()
                ),
            }),
            // No prices, no percentages: fails the financial-marker check.
            scripted("Current market data for Apple is not something I can see right now."),
        );

        let result = handler
            .run(&QueryRequest::new("Apple stock price today?", ""))
            .await
            .unwrap();

        assert!(!result.succeeded);
        assert_eq!(result.failure, Some(FailureReason::NotRelevant));
    }

    #[tokio::test]
    async fn test_news_fans_out_for_compound_queries() {
        let provider = Arc::new(RecordingNews {
            outcome: Ok(
                "Top financial headlines:\n1. Tesla beats delivery estimates (Reuters)".to_string()
            ),
            seen: Mutex::new(Vec::new()),
        });
        let handler = NewsHandler::new(
            provider.clone(),
            scripted("Tesla beat delivery estimates this week."),
        );

        let result = handler
            .run(&QueryRequest::new("Tesla earnings news", ""))
            .await
            .unwrap();
        assert!(result.succeeded);

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].contains("latest financial news"));
        assert!(seen[1].contains("earnings quarterly results"));
    }

    #[tokio::test]
    async fn test_news_results_wording_keeps_the_headline_search() {
        let provider = Arc::new(RecordingNews {
            outcome: Ok(
                "Top financial headlines:\n1. Tesla posts record quarter (Reuters)".to_string()
            ),
            seen: Mutex::new(Vec::new()),
        });
        let handler = NewsHandler::new(
            provider.clone(),
            scripted("Tesla posted a record quarter this week."),
        );

        let result = handler
            .run(&QueryRequest::new("Tesla results", ""))
            .await
            .unwrap();
        assert!(result.succeeded);

        // "results" is not specific coverage, so the headline search still
        // runs alongside the earnings one.
        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].contains("latest financial news"));
        assert!(seen[1].contains("earnings quarterly results"));
    }

    #[tokio::test]
    async fn test_news_reports_last_failure_when_every_search_misses() {
        let handler = NewsHandler::new(
            Arc::new(RecordingNews {
                outcome: Err(FailureReason::NoDataFound),
                seen: Mutex::new(Vec::new()),
            }),
            scripted("unused"),
        );

        let result = handler
            .run(&QueryRequest::new("obscure startup sentiment", ""))
            .await
            .unwrap();

        assert!(!result.succeeded);
        assert_eq!(result.failure, Some(FailureReason::NoDataFound));
    }

    #[test]
    fn test_plain_query_gets_one_headline_search() {
        let searches = NewsHandler::framed_searches("Tesla");
        assert_eq!(searches.len(), 1);
        assert!(searches[0].contains("latest financial news"));
    }

    #[test]
    fn test_news_and_sentiment_query_fans_out() {
        let searches = NewsHandler::framed_searches("latest NVDA sentiment");
        assert_eq!(searches.len(), 2);
        assert!(searches[1].contains("sentiment"));
    }

    #[tokio::test]
    async fn test_document_handler_reports_missing_context() {
        let handler = DocumentHandler::new(scripted("unused"));

        let result = handler
            .run(&QueryRequest::new("Summarize this report", "   "))
            .await
            .unwrap();

        assert!(result.succeeded);
        assert!(result.text.contains("No document context available"));
    }

    #[tokio::test]
    async fn test_document_handler_answers_from_context() {
        let handler = DocumentHandler::new(scripted("Revenue grew 12% year over year."));
        let request = QueryRequest::new(
            "What was revenue growth?",
            "Document 1 (q3_report.pdf):\nRevenue grew 12% year over year to $4.1B.",
        );

        let result = handler.run(&request).await.unwrap();

        assert!(result.succeeded);
        assert_eq!(result.source, HandlerKind::Document);
        assert!(result.text.contains("12%"));
    }

    #[tokio::test]
    async fn test_general_chat_propagates_completion_errors() {
        let handler = GeneralChatHandler::new(Arc::new(FailingCompletion));

        let err = handler
            .run(&QueryRequest::new("hello there", ""))
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestrationError::RateLimited(_)));
    }

    #[tokio::test]
    async fn test_general_chat_answers() {
        let handler = GeneralChatHandler::new(scripted("Hello! How can I help you today?"));

        let result = handler
            .run(&QueryRequest::new("hi", ""))
            .await
            .unwrap();

        assert!(result.succeeded);
        assert_eq!(result.source, HandlerKind::GeneralChat);
    }
}
