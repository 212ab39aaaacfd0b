//! Answer synthesis
//!
//! Turns the results of one engine run into a single answer string.
//! Single-handler runs pass their text through verbatim; runs that
//! produced two fragments (market plus news) get one merge call to the
//! completion service. Failed runs turn into fixed apology texts rather
//! than error output.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::completion::CompletionService;
use crate::error::{OrchestrationError, Result};
use crate::models::{HandlerKind, HandlerOutcomes, Intent, QueryRequest};

/// Shown when a market-data query could not be answered, even after the
/// news fallback.
pub const NOT_AVAILABLE_APOLOGY: &str = "I'm sorry, but current market data for your query is \
not available. Please try asking about a specific stock symbol or check back later.";

/// Shown when a combined market-and-news query produced nothing usable.
pub const COULD_NOT_FIND_APOLOGY: &str = "I'm sorry, I couldn't find relevant information for \
your query. Please try rephrasing or asking about a specific company or topic.";

const MERGE_INSTRUCTIONS: &str = "Combine the supplied pieces of information into one natural \
response to the query. Keep it to 2-3 sentences and use only names and figures present in the \
information. Do not invent numbers.";

pub struct Synthesizer {
    completion: Arc<dyn CompletionService>,
}

impl Synthesizer {
    pub fn new(completion: Arc<dyn CompletionService>) -> Self {
        Self { completion }
    }

    /// Produce the answer for one completed run. Errors only on rate
    /// limiting; every other merge problem degrades to joined fragments.
    pub async fn synthesize(
        &self,
        request: &QueryRequest,
        intent: Intent,
        outcomes: &HandlerOutcomes,
    ) -> Result<String> {
        match intent {
            Intent::DocumentOnly => Ok(self.single(outcomes, HandlerKind::Document)),
            Intent::GeneralChat => Ok(self.single(outcomes, HandlerKind::GeneralChat)),
            Intent::NewsSearch => Ok(self.single(outcomes, HandlerKind::News)),
            Intent::MarketData => {
                if outcomes.escalated() {
                    // The market handler failed and the news fallback ran;
                    // whatever survived gets merged into the answer.
                    if outcomes.succeeded_texts().is_empty() {
                        Ok(NOT_AVAILABLE_APOLOGY.to_string())
                    } else {
                        self.merge(request, outcomes).await
                    }
                } else {
                    Ok(self.single(outcomes, HandlerKind::MarketData))
                }
            }
            Intent::MarketAndNews => {
                if outcomes.succeeded_texts().is_empty() {
                    Ok(COULD_NOT_FIND_APOLOGY.to_string())
                } else {
                    self.merge(request, outcomes).await
                }
            }
        }
    }

    /// Verbatim pass-through for a run that selected exactly one handler.
    fn single(&self, outcomes: &HandlerOutcomes, kind: HandlerKind) -> String {
        match outcomes.get(kind) {
            Some(result) if result.succeeded && !result.text.trim().is_empty() => {
                result.text.clone()
            }
            _ => NOT_AVAILABLE_APOLOGY.to_string(),
        }
    }

    /// One completion call over the labeled surviving fragments.
    async fn merge(&self, request: &QueryRequest, outcomes: &HandlerOutcomes) -> Result<String> {
        let mut labeled = Vec::new();
        if let Some(result) = outcomes.get(HandlerKind::MarketData) {
            if result.succeeded && !result.text.trim().is_empty() {
                labeled.push(format!("Market data: {}", result.text));
            }
        }
        if let Some(result) = outcomes.get(HandlerKind::News) {
            if result.succeeded && !result.text.trim().is_empty() {
                labeled.push(format!("Recent news: {}", result.text));
            }
        }

        let input = format!("Query: {}\n\nInformation:\n{}", request.text, labeled.join("\n\n"));
        match self.completion.complete(MERGE_INSTRUCTIONS, &input).await {
            Ok(merged) => {
                debug!(query_id = %request.query_id, fragments = labeled.len(), "merged fragments into answer");
                Ok(merged)
            }
            Err(OrchestrationError::RateLimited(msg)) => Err(OrchestrationError::RateLimited(msg)),
            Err(e) => {
                // Degraded but truthful: hand back the raw fragments rather
                // than losing data the handlers already fetched.
                warn!(query_id = %request.query_id, error = %e, "merge call failed, joining fragments");
                Ok(outcomes.succeeded_texts().join("\n\n"))
            }
        }
    }
}
