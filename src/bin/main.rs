use finance_assistant_orchestrator::{
    classifier::TieredClassifier,
    completion::{CompletionService, GeminiCompletion, MockCompletion},
    handlers::{DocumentHandler, GeneralChatHandler, MarketDataHandler, NewsHandler},
    models::QueryRequest,
    normalizer::Normalizer,
    orchestrator::Orchestrator,
    providers::{StaticMarketDataProvider, StaticNewsSearchProvider},
    synthesizer::Synthesizer,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const SAMPLE_REPORT: &str = "Q3 Earnings Report - Acme Devices Inc.\n\
Revenue grew 12% year over year to $4.1B, driven by wearables. Gross margin \
held at 44.5%. Management guided Q4 revenue to $4.4B and flagged component \
costs as the main risk to margins.";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    info!("Finance Assistant Orchestrator starting");

    // With a credential the full LLM pipeline runs; without one the offline
    // completion keeps the demo deterministic (keyword routing, verbatim
    // payloads).
    let completion: Arc<dyn CompletionService> = match std::env::var("GEMINI_API_KEY") {
        Ok(key) if !key.trim().is_empty() => Arc::new(GeminiCompletion::new(key)),
        _ => {
            info!("GEMINI_API_KEY not set - using the offline completion");
            Arc::new(MockCompletion)
        }
    };

    // Create components
    let market_provider = Arc::new(StaticMarketDataProvider);
    let news_provider = Arc::new(StaticNewsSearchProvider);

    // Create the engine
    let orchestrator = Orchestrator::new(
        Box::new(TieredClassifier::new(completion.clone())),
        Box::new(MarketDataHandler::new(market_provider, completion.clone())),
        Box::new(NewsHandler::new(news_provider, completion.clone())),
        Box::new(DocumentHandler::new(completion.clone())),
        Box::new(GeneralChatHandler::new(completion.clone())),
        Synthesizer::new(completion.clone()),
        Normalizer::new(completion),
        Duration::from_secs(30),
    );

    let samples: [(&str, &str); 5] = [
        ("Apple stock price today?", ""),
        ("How is the market doing today?", ""),
        ("NVDA price and recent news?", ""),
        ("Summarize this report", SAMPLE_REPORT),
        ("Hello, how are you?", ""),
    ];

    for (query, context) in samples {
        let request = QueryRequest::new(query, context);

        info!(
            query_id = %request.query_id,
            query = %query,
            "Running query"
        );

        match orchestrator.run(request).await {
            Ok(outcome) => {
                println!("\n=== QUERY: {} ===", query);
                println!("Intent: {}", outcome.intent);
                println!("Escalated: {}", outcome.outcomes.escalated());
                println!("Answer: {}", outcome.answer);
                println!("\nStage Trace:");
                for (i, stage) in outcome.stage_trace.iter().enumerate() {
                    println!("  {}: {}", i + 1, stage);
                }
                println!("Elapsed: {} ms", outcome.elapsed_ms);
            }
            Err(e) => {
                eprintln!("Query failed: {}", e);
                return Err(Box::new(e) as Box<dyn std::error::Error>);
            }
        }
    }

    Ok(())
}
