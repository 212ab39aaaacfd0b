//! Orchestration engine - drives one query through the pipeline
//!
//! CLASSIFY → ROUTE → EXECUTE → ESCALATE? → SYNTHESIZE → NORMALIZE
//!
//! Escalation runs at most once per query, and only for the market-data
//! route: a failed quote lookup gets one shot at a news-search answer
//! before the apology text wins. Every other failure mode resolves in
//! place.

use crate::classifier::IntentClassifier;
use crate::error::{OrchestrationError, Result};
use crate::handlers::Handler;
use crate::models::{
    FailureReason, HandlerKind, HandlerOutcomes, HandlerResult, Intent, QueryOutcome, QueryRequest,
};
use crate::normalizer::Normalizer;
use crate::synthesizer::Synthesizer;
use chrono::Utc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Shown instead of an answer when the completion service ran out of quota
/// mid-pipeline.
pub const RATE_LIMITED_MESSAGE: &str = "Your question hit the answer service's rate limit. \
Please try again in a moment, or break the question into smaller parts.";

/// Shown instead of an answer for failures nothing else caught.
pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong while answering your question. \
Please verify the service configuration and try again.";

/// Main engine that coordinates one query end to end
pub struct Orchestrator {
    classifier: Box<dyn IntentClassifier>,
    market: Box<dyn Handler>,
    news: Box<dyn Handler>,
    document: Box<dyn Handler>,
    chat: Box<dyn Handler>,
    synthesizer: Synthesizer,
    normalizer: Normalizer,
    handler_timeout: Duration,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        classifier: Box<dyn IntentClassifier>,
        market: Box<dyn Handler>,
        news: Box<dyn Handler>,
        document: Box<dyn Handler>,
        chat: Box<dyn Handler>,
        synthesizer: Synthesizer,
        normalizer: Normalizer,
        handler_timeout: Duration,
    ) -> Self {
        Self {
            classifier,
            market,
            news,
            document,
            chat,
            synthesizer,
            normalizer,
            handler_timeout,
        }
    }

    /// Run one query through every stage and return the full outcome.
    pub async fn run(&self, request: QueryRequest) -> Result<QueryOutcome> {
        let start_time = Instant::now();
        let mut stage_trace = Vec::new();

        info!(
            query_id = %request.query_id,
            query = %request.text,
            "Engine: starting query"
        );

        // === CLASSIFY ===
        stage_trace.push("CLASSIFY: Deriving intent".to_string());
        let intent = self
            .classifier
            .classify(&request.text, request.has_document_context())
            .await;

        stage_trace.push(format!("ROUTE: {}", intent));
        info!(query_id = %request.query_id, %intent, "Query classified");

        // === EXECUTE ===
        let mut outcomes = HandlerOutcomes::new();

        match intent {
            Intent::DocumentOnly => {
                let result = self.execute(self.document.as_ref(), &request).await?;
                Self::trace_execution(&mut stage_trace, &result);
                outcomes.record(result);
            }
            Intent::GeneralChat => {
                let result = self.execute(self.chat.as_ref(), &request).await?;
                Self::trace_execution(&mut stage_trace, &result);
                outcomes.record(result);
            }
            Intent::NewsSearch => {
                let result = self.execute(self.news.as_ref(), &request).await?;
                Self::trace_execution(&mut stage_trace, &result);
                outcomes.record(result);
            }
            Intent::MarketData => {
                let result = self.execute(self.market.as_ref(), &request).await?;
                Self::trace_execution(&mut stage_trace, &result);
                outcomes.record(result);

                // === ESCALATE ===
                // One alternate path only: the counter never passes 1.
                if !outcomes.succeeded(HandlerKind::MarketData) && outcomes.fallback_attempts == 0 {
                    outcomes.fallback_attempts += 1;
                    stage_trace.push("ESCALATE: News search fallback".to_string());
                    info!(
                        query_id = %request.query_id,
                        "Market data failed - escalating to news search"
                    );

                    let fallback = self.execute(self.news.as_ref(), &request).await?;
                    Self::trace_execution(&mut stage_trace, &fallback);
                    outcomes.record(fallback);
                }
            }
            Intent::MarketAndNews => {
                // Independent lookups, joined before synthesis.
                let (market_result, news_result) = tokio::join!(
                    self.execute(self.market.as_ref(), &request),
                    self.execute(self.news.as_ref(), &request),
                );
                let market_result = market_result?;
                let news_result = news_result?;
                Self::trace_execution(&mut stage_trace, &market_result);
                Self::trace_execution(&mut stage_trace, &news_result);
                outcomes.record(market_result);
                outcomes.record(news_result);
            }
        }

        // === SYNTHESIZE ===
        stage_trace.push("SYNTHESIZE: Building answer".to_string());
        let answer = self
            .synthesizer
            .synthesize(&request, intent, &outcomes)
            .await?;

        // === NORMALIZE ===
        stage_trace.push("NORMALIZE: Formatting pass".to_string());
        let answer = self.normalizer.normalize(&answer).await?;

        let elapsed_ms = start_time.elapsed().as_millis() as u64;
        info!(
            query_id = %request.query_id,
            %intent,
            escalated = outcomes.escalated(),
            elapsed_ms,
            "Engine: query complete"
        );

        Ok(QueryOutcome {
            query_id: request.query_id,
            intent,
            answer,
            outcomes,
            stage_trace,
            elapsed_ms,
            completed_at: Utc::now(),
        })
    }

    /// Entry point for callers that want only the answer text. Ordinary
    /// failures degrade to polite messages; only a missing credential
    /// surfaces as an error.
    pub async fn process(&self, query: &str, document_context: &str) -> Result<String> {
        let request = QueryRequest::new(query, document_context);
        let query_id = request.query_id;

        match self.run(request).await {
            Ok(outcome) => Ok(outcome.answer),
            Err(e) => match Self::recovery_message(&e) {
                Some(message) => {
                    warn!(%query_id, error = %e, "Run failed, degrading to message");
                    Ok(message.to_string())
                }
                None => {
                    error!(%query_id, error = %e, "Run failed fatally");
                    Err(e)
                }
            },
        }
    }

    /// User-facing message policy for run errors. `None` marks the error
    /// fatal: it must surface to the caller instead of becoming text.
    pub fn recovery_message(error: &OrchestrationError) -> Option<&'static str> {
        if error.is_fatal() {
            return None;
        }
        match error {
            OrchestrationError::RateLimited(_) => Some(RATE_LIMITED_MESSAGE),
            _ => Some(GENERIC_FAILURE_MESSAGE),
        }
    }

    /// Run one handler under the shared timeout. An elapsed timeout is a
    /// soft upstream failure, so it feeds the same escalation path as any
    /// provider outage.
    async fn execute(&self, handler: &dyn Handler, request: &QueryRequest) -> Result<HandlerResult> {
        let kind = handler.kind();
        debug!(query_id = %request.query_id, handler = %kind, "Running handler");

        match timeout(self.handler_timeout, handler.run(request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    query_id = %request.query_id,
                    handler = %kind,
                    timeout_secs = self.handler_timeout.as_secs(),
                    "Handler timed out"
                );
                Ok(HandlerResult::failure(
                    kind,
                    FailureReason::UpstreamError("timeout".to_string()),
                ))
            }
        }
    }

    fn trace_execution(stage_trace: &mut Vec<String>, result: &HandlerResult) {
        if result.succeeded {
            stage_trace.push(format!("EXECUTE: {} succeeded", result.source));
        } else {
            let reason = result
                .failure
                .as_ref()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            stage_trace.push(format!("EXECUTE: {} failed ({})", result.source, reason));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{CompletionService, MockCompletion};
    use crate::synthesizer::NOT_AVAILABLE_APOLOGY;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FixedClassifier(Intent);

    #[async_trait]
    impl IntentClassifier for FixedClassifier {
        async fn classify(&self, _query: &str, _has_document_context: bool) -> Intent {
            self.0
        }
    }

    enum Behavior {
        Succeed(&'static str),
        FailSoft(FailureReason),
        FailHard(fn() -> OrchestrationError),
        Stall,
    }

    struct StubHandler {
        kind: HandlerKind,
        behavior: Behavior,
        calls: Arc<AtomicUsize>,
    }

    impl StubHandler {
        fn boxed(kind: HandlerKind, behavior: Behavior) -> (Box<dyn Handler>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let handler = Box::new(Self {
                kind,
                behavior,
                calls: calls.clone(),
            });
            (handler, calls)
        }
    }

    #[async_trait]
    impl Handler for StubHandler {
        fn kind(&self) -> HandlerKind {
            self.kind
        }

        async fn run(&self, _request: &QueryRequest) -> Result<HandlerResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                Behavior::Succeed(text) => Ok(HandlerResult::success(self.kind, *text)),
                Behavior::FailSoft(reason) => Ok(HandlerResult::failure(self.kind, reason.clone())),
                Behavior::FailHard(make) => Err(make()),
                Behavior::Stall => {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok(HandlerResult::success(self.kind, "too late"))
                }
            }
        }
    }

    fn engine_with(
        intent: Intent,
        market: Box<dyn Handler>,
        news: Box<dyn Handler>,
        document: Box<dyn Handler>,
        chat: Box<dyn Handler>,
        handler_timeout: Duration,
    ) -> Orchestrator {
        // The echoing mock keeps upstream text observable in assertions.
        let completion: Arc<dyn CompletionService> = Arc::new(MockCompletion);
        Orchestrator::new(
            Box::new(FixedClassifier(intent)),
            market,
            news,
            document,
            chat,
            Synthesizer::new(completion.clone()),
            Normalizer::new(completion),
            handler_timeout,
        )
    }

    fn unused(kind: HandlerKind) -> Box<dyn Handler> {
        StubHandler::boxed(kind, Behavior::Succeed("unused")).0
    }

    #[tokio::test]
    async fn test_chat_route_passes_answer_through() {
        let (chat, chat_calls) = StubHandler::boxed(
            HandlerKind::GeneralChat,
            Behavior::Succeed("Hello! How can I help with your finances today?"),
        );
        let engine = engine_with(
            Intent::GeneralChat,
            unused(HandlerKind::MarketData),
            unused(HandlerKind::News),
            unused(HandlerKind::Document),
            chat,
            Duration::from_secs(5),
        );

        let outcome = engine.run(QueryRequest::new("hello", "")).await.unwrap();

        assert_eq!(outcome.intent, Intent::GeneralChat);
        assert_eq!(outcome.answer, "Hello! How can I help with your finances today?");
        assert_eq!(chat_calls.load(Ordering::SeqCst), 1);
        assert!(!outcome.outcomes.escalated());
    }

    #[tokio::test]
    async fn test_market_failure_escalates_to_news_exactly_once() {
        let (market, market_calls) = StubHandler::boxed(
            HandlerKind::MarketData,
            Behavior::FailSoft(FailureReason::ProviderUnavailable),
        );
        let (news, news_calls) = StubHandler::boxed(
            HandlerKind::News,
            Behavior::FailSoft(FailureReason::NoDataFound),
        );
        let engine = engine_with(
            Intent::MarketData,
            market,
            news,
            unused(HandlerKind::Document),
            unused(HandlerKind::GeneralChat),
            Duration::from_secs(5),
        );

        let outcome = engine
            .run(QueryRequest::new("XYZQ stock price", ""))
            .await
            .unwrap();

        assert_eq!(market_calls.load(Ordering::SeqCst), 1);
        assert_eq!(news_calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.outcomes.fallback_attempts, 1);
        assert_eq!(outcome.answer, NOT_AVAILABLE_APOLOGY);
        assert!(outcome
            .stage_trace
            .iter()
            .any(|s| s.starts_with("ESCALATE")));
    }

    #[tokio::test]
    async fn test_market_success_does_not_escalate() {
        let (market, _) = StubHandler::boxed(
            HandlerKind::MarketData,
            Behavior::Succeed("AAPL is trading at $189.44, up 1.20%."),
        );
        let (news, news_calls) =
            StubHandler::boxed(HandlerKind::News, Behavior::Succeed("unused"));
        let engine = engine_with(
            Intent::MarketData,
            market,
            news,
            unused(HandlerKind::Document),
            unused(HandlerKind::GeneralChat),
            Duration::from_secs(5),
        );

        let outcome = engine
            .run(QueryRequest::new("Apple stock price today?", ""))
            .await
            .unwrap();

        assert_eq!(news_calls.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.outcomes.fallback_attempts, 0);
        assert!(outcome.answer.contains("$189.44"));
    }

    #[tokio::test]
    async fn test_combined_route_runs_both_handlers_and_merges() {
        let (market, market_calls) = StubHandler::boxed(
            HandlerKind::MarketData,
            Behavior::Succeed("NVDA is at $885.12, up 2.1%."),
        );
        let (news, news_calls) = StubHandler::boxed(
            HandlerKind::News,
            Behavior::Succeed("Nvidia unveiled its next accelerator."),
        );
        let engine = engine_with(
            Intent::MarketAndNews,
            market,
            news,
            unused(HandlerKind::Document),
            unused(HandlerKind::GeneralChat),
            Duration::from_secs(5),
        );

        let outcome = engine
            .run(QueryRequest::new("NVDA price and recent news?", ""))
            .await
            .unwrap();

        assert_eq!(market_calls.load(Ordering::SeqCst), 1);
        assert_eq!(news_calls.load(Ordering::SeqCst), 1);
        // Echo merge keeps both fragments visible.
        assert!(outcome.answer.contains("$885.12"));
        assert!(outcome.answer.contains("accelerator"));
        assert!(!outcome.outcomes.escalated());
    }

    #[tokio::test]
    async fn test_stalled_handler_times_out_as_upstream_failure() {
        let (news, _) = StubHandler::boxed(HandlerKind::News, Behavior::Stall);
        let engine = engine_with(
            Intent::NewsSearch,
            unused(HandlerKind::MarketData),
            news,
            unused(HandlerKind::Document),
            unused(HandlerKind::GeneralChat),
            Duration::from_millis(20),
        );

        let outcome = engine
            .run(QueryRequest::new("latest market news", ""))
            .await
            .unwrap();

        let result = outcome.outcomes.get(HandlerKind::News).unwrap();
        assert!(!result.succeeded);
        assert_eq!(
            result.failure,
            Some(FailureReason::UpstreamError("timeout".to_string()))
        );
        assert_eq!(outcome.answer, NOT_AVAILABLE_APOLOGY);
    }

    #[tokio::test]
    async fn test_process_degrades_rate_limits_to_message() {
        let (chat, _) = StubHandler::boxed(
            HandlerKind::GeneralChat,
            Behavior::FailHard(|| OrchestrationError::RateLimited("quota exhausted".to_string())),
        );
        let engine = engine_with(
            Intent::GeneralChat,
            unused(HandlerKind::MarketData),
            unused(HandlerKind::News),
            unused(HandlerKind::Document),
            chat,
            Duration::from_secs(5),
        );

        let answer = engine.process("hello", "").await.unwrap();

        assert_eq!(answer, RATE_LIMITED_MESSAGE);
    }

    #[tokio::test]
    async fn test_process_degrades_unexpected_errors_to_generic_message() {
        let (chat, _) = StubHandler::boxed(
            HandlerKind::GeneralChat,
            Behavior::FailHard(|| OrchestrationError::ServiceUnavailable("503".to_string())),
        );
        let engine = engine_with(
            Intent::GeneralChat,
            unused(HandlerKind::MarketData),
            unused(HandlerKind::News),
            unused(HandlerKind::Document),
            chat,
            Duration::from_secs(5),
        );

        let answer = engine.process("hello", "").await.unwrap();

        assert_eq!(answer, GENERIC_FAILURE_MESSAGE);
    }

    #[test]
    fn test_recovery_policy_holds_back_only_fatal_errors() {
        let fatal = OrchestrationError::Configuration("GEMINI_API_KEY missing".to_string());
        assert!(fatal.is_fatal());
        assert!(Orchestrator::recovery_message(&fatal).is_none());

        let limited = OrchestrationError::RateLimited("quota exhausted".to_string());
        assert!(!limited.is_fatal());
        assert_eq!(
            Orchestrator::recovery_message(&limited),
            Some(RATE_LIMITED_MESSAGE)
        );

        assert_eq!(
            Orchestrator::recovery_message(&OrchestrationError::ServiceUnavailable(
                "503".to_string()
            )),
            Some(GENERIC_FAILURE_MESSAGE)
        );
    }

    // ----- wired pipeline, offline components -----

    use crate::classifier::TieredClassifier;
    use crate::handlers::{DocumentHandler, GeneralChatHandler, MarketDataHandler, NewsHandler};
    use crate::providers::{
        FetchResult, MarketDataProvider, NewsSearchProvider, StaticMarketDataProvider,
        StaticNewsSearchProvider,
    };

    fn offline_engine() -> Orchestrator {
        let completion: Arc<dyn CompletionService> = Arc::new(MockCompletion);
        Orchestrator::new(
            Box::new(TieredClassifier::new(completion.clone())),
            Box::new(MarketDataHandler::new(
                Arc::new(StaticMarketDataProvider),
                completion.clone(),
            )),
            Box::new(NewsHandler::new(
                Arc::new(StaticNewsSearchProvider),
                completion.clone(),
            )),
            Box::new(DocumentHandler::new(completion.clone())),
            Box::new(GeneralChatHandler::new(completion.clone())),
            Synthesizer::new(completion.clone()),
            Normalizer::new(completion),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_offline_pipeline_answers_price_query() {
        let engine = offline_engine();

        let outcome = engine
            .run(QueryRequest::new("Apple stock price today?", ""))
            .await
            .unwrap();

        assert_eq!(outcome.intent, Intent::MarketData);
        assert!(!outcome.outcomes.escalated());
        assert!(outcome.answer.contains('$'));
        assert!(outcome.answer.contains("AAPL"));
    }

    #[tokio::test]
    async fn test_document_wording_without_context_stays_off_document_route() {
        let engine = offline_engine();

        let outcome = engine
            .run(QueryRequest::new("Summarize this report", ""))
            .await
            .unwrap();

        assert_eq!(outcome.intent, Intent::GeneralChat);
    }

    #[tokio::test]
    async fn test_offline_combined_route_carries_both_fragments() {
        let completion: Arc<dyn CompletionService> = Arc::new(MockCompletion);
        let engine = Orchestrator::new(
            Box::new(FixedClassifier(Intent::MarketAndNews)),
            Box::new(MarketDataHandler::new(
                Arc::new(StaticMarketDataProvider),
                completion.clone(),
            )),
            Box::new(NewsHandler::new(
                Arc::new(StaticNewsSearchProvider),
                completion.clone(),
            )),
            Box::new(DocumentHandler::new(completion.clone())),
            Box::new(GeneralChatHandler::new(completion.clone())),
            Synthesizer::new(completion.clone()),
            Normalizer::new(completion),
            Duration::from_secs(5),
        );

        let outcome = engine
            .run(QueryRequest::new("NVDA price and recent news?", ""))
            .await
            .unwrap();

        assert!(outcome.answer.contains("NVDA"));
        assert!(outcome.answer.contains("Market data:"));
        assert!(outcome.answer.contains("Recent news:"));
    }

    #[tokio::test]
    async fn test_failing_providers_drive_escalation_once_through_real_handlers() {
        struct FailingMarket {
            calls: Arc<AtomicUsize>,
        }

        #[async_trait]
        impl MarketDataProvider for FailingMarket {
            async fn fetch(&self, _query: &str) -> FetchResult {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Err(FailureReason::ProviderUnavailable)
            }
        }

        struct FailingNews {
            calls: Arc<AtomicUsize>,
        }

        #[async_trait]
        impl NewsSearchProvider for FailingNews {
            async fn fetch(&self, _query: &str) -> FetchResult {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Err(FailureReason::NoDataFound)
            }
        }

        let market_calls = Arc::new(AtomicUsize::new(0));
        let news_calls = Arc::new(AtomicUsize::new(0));
        let completion: Arc<dyn CompletionService> = Arc::new(MockCompletion);
        let engine = Orchestrator::new(
            Box::new(FixedClassifier(Intent::MarketData)),
            Box::new(MarketDataHandler::new(
                Arc::new(FailingMarket {
                    calls: market_calls.clone(),
                }),
                completion.clone(),
            )),
            Box::new(NewsHandler::new(
                Arc::new(FailingNews {
                    calls: news_calls.clone(),
                }),
                completion.clone(),
            )),
            Box::new(DocumentHandler::new(completion.clone())),
            Box::new(GeneralChatHandler::new(completion.clone())),
            Synthesizer::new(completion.clone()),
            Normalizer::new(completion),
            Duration::from_secs(5),
        );

        let outcome = engine
            .run(QueryRequest::new("Tesla stock price", ""))
            .await
            .unwrap();

        assert_eq!(market_calls.load(Ordering::SeqCst), 1);
        assert_eq!(news_calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.outcomes.fallback_attempts, 1);
        assert_eq!(outcome.answer, NOT_AVAILABLE_APOLOGY);
    }

    #[tokio::test]
    async fn test_process_surfaces_configuration_errors() {
        let (chat, _) = StubHandler::boxed(
            HandlerKind::GeneralChat,
            Behavior::FailHard(|| {
                OrchestrationError::Configuration("GEMINI_API_KEY is not set".to_string())
            }),
        );
        let engine = engine_with(
            Intent::GeneralChat,
            unused(HandlerKind::MarketData),
            unused(HandlerKind::News),
            unused(HandlerKind::Document),
            chat,
            Duration::from_secs(5),
        );

        let err = engine.process("hello", "").await.unwrap_err();

        assert!(matches!(err, OrchestrationError::Configuration(_)));
    }
}
