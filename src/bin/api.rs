use finance_assistant_orchestrator::{
    api::{start_server, ApiState},
    classifier::TieredClassifier,
    completion::{CompletionService, GeminiCompletion},
    config::Settings,
    handlers::{DocumentHandler, GeneralChatHandler, MarketDataHandler, NewsHandler},
    normalizer::Normalizer,
    orchestrator::Orchestrator,
    providers::{
        HttpMarketDataProvider, HttpNewsSearchProvider, InMemoryDocumentStore,
        MarketDataProvider, NewsSearchProvider, StaticMarketDataProvider,
        StaticNewsSearchProvider,
    },
    synthesizer::Synthesizer,
    voice::{SpeechClient, TranscriptionClient},
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("⚠️  Configuration error: {}", e);
            eprintln!("📌 Set GEMINI_API_KEY in .env (see .env.example)");
            return Err(Box::new(e) as Box<dyn std::error::Error>);
        }
    };

    info!("🚀 Finance Assistant Orchestrator - API Server");
    info!("📍 Port: {}", settings.port);

    // Create components
    let completion: Arc<dyn CompletionService> =
        Arc::new(GeminiCompletion::new(settings.gemini_api_key.clone()));

    let market_provider: Arc<dyn MarketDataProvider> = match settings.market_data_base_url.clone() {
        Some(base_url) => Arc::new(HttpMarketDataProvider::new(base_url)),
        None => {
            info!("MARKET_DATA_BASE_URL not set - serving fixture quotes");
            Arc::new(StaticMarketDataProvider)
        }
    };

    let news_provider: Arc<dyn NewsSearchProvider> = match settings.news_api_key.clone() {
        Some(api_key) => Arc::new(HttpNewsSearchProvider::new(
            settings.news_api_base_url.clone(),
            api_key,
        )),
        None => {
            info!("NEWS_API_KEY not set - serving fixture headlines");
            Arc::new(StaticNewsSearchProvider)
        }
    };

    // Create the engine
    let orchestrator = Arc::new(Orchestrator::new(
        Box::new(TieredClassifier::new(completion.clone())),
        Box::new(MarketDataHandler::new(market_provider, completion.clone())),
        Box::new(NewsHandler::new(news_provider, completion.clone())),
        Box::new(DocumentHandler::new(completion.clone())),
        Box::new(GeneralChatHandler::new(completion.clone())),
        Synthesizer::new(completion.clone()),
        Normalizer::new(completion),
        settings.handler_timeout,
    ));

    let state = ApiState {
        orchestrator,
        documents: Arc::new(InMemoryDocumentStore::new()),
        transcription: settings
            .groq_api_key
            .clone()
            .map(|key| Arc::new(TranscriptionClient::new(key))),
        speech: settings
            .murf_api_key
            .clone()
            .map(|key| Arc::new(SpeechClient::new(key))),
    };

    if state.transcription.is_none() {
        info!("GROQ_API_KEY not set - voice queries disabled");
    }
    if state.speech.is_none() {
        info!("MURF_API_KEY not set - audio replies disabled");
    }

    info!("✅ Engine initialized");
    info!("📡 Starting API server...");

    // Start API server
    start_server(state, settings.port).await?;

    Ok(())
}
