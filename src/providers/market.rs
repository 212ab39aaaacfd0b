//! Market data provider
//!
//! Resolves a natural-language query to quote targets first: portfolio
//! questions get a holdings basket, index/sector questions get the matching
//! basket, everything else goes through symbol extraction. Quotes come from
//! a quote service over HTTP; a fixture-backed provider serves demos and
//! offline tests.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::{FetchResult, MarketDataProvider};
use crate::models::FailureReason;

/// Company names that resolve to tickers when no explicit symbol appears.
const COMPANY_SYMBOLS: &[(&str, &str)] = &[
    ("apple", "AAPL"),
    ("microsoft", "MSFT"),
    ("google", "GOOGL"),
    ("alphabet", "GOOGL"),
    ("tesla", "TSLA"),
    ("nvidia", "NVDA"),
    ("amazon", "AMZN"),
    ("meta", "META"),
    ("facebook", "META"),
    ("netflix", "NFLX"),
    ("intel", "INTC"),
    ("amd", "AMD"),
    ("oracle", "ORCL"),
    ("salesforce", "CRM"),
    ("adobe", "ADBE"),
];

/// Short words that would otherwise pass for tickers.
const SYMBOL_STOPWORDS: &[&str] = &[
    "THE", "IS", "OF", "AND", "OR", "TO", "IN", "ON", "AT", "FOR", "WITH", "BY", "FROM", "UP",
    "ABOUT", "INTO", "THROUGH", "DURING", "BEFORE", "AFTER", "ABOVE", "BELOW", "BETWEEN", "STOCK",
    "STOCKS", "TODAY", "PRICE", "WHAT", "HOW", "WHERE", "WHEN", "WHY", "WHO", "A", "I", "ME", "MY",
    "DO", "DOES", "ARE", "TELL", "SHOW", "GIVE", "NOW", "NEWS",
];

/// Representative holdings used for portfolio-risk questions.
const PORTFOLIO_BASKET: &[&str] = &["AAPL", "MSFT", "GOOGL", "TSLA", "NVDA"];

/// Major index basket for market-overview questions.
const INDEX_BASKET: &[&str] = &["^GSPC", "^DJI", "^IXIC", "^RUT"];

/// Sector ETF proxies for sector-performance questions.
const SECTOR_BASKET: &[&str] = &["XLK", "XLV", "XLF", "XLE", "XLY"];

/// Shown when the query names no symbol but clearly asks about stocks.
const DEFAULT_STOCKS: &[&str] = &["AAPL", "MSFT", "GOOGL"];

const MAX_SYMBOLS: usize = 3;
const MAX_SYMBOL_LEN: usize = 5;

//
// ================= Query Resolution =================
//

#[derive(Debug, Clone, PartialEq, Eq)]
enum QuoteTarget {
    Portfolio,
    MarketOverview,
    SectorPerformance,
    Symbols(Vec<String>),
    DefaultStocks,
}

impl QuoteTarget {
    fn heading(&self) -> &'static str {
        match self {
            QuoteTarget::Portfolio => "Portfolio holdings",
            QuoteTarget::MarketOverview => "Market overview",
            QuoteTarget::SectorPerformance => "Sector performance (ETF proxies)",
            QuoteTarget::Symbols(_) => "Stock data",
            QuoteTarget::DefaultStocks => "Top tech stocks",
        }
    }

    fn symbols(&self) -> Vec<String> {
        let fixed: &[&str] = match self {
            QuoteTarget::Portfolio => PORTFOLIO_BASKET,
            QuoteTarget::MarketOverview => INDEX_BASKET,
            QuoteTarget::SectorPerformance => SECTOR_BASKET,
            QuoteTarget::DefaultStocks => DEFAULT_STOCKS,
            QuoteTarget::Symbols(symbols) => return symbols.clone(),
        };
        fixed.iter().map(|s| (*s).to_string()).collect()
    }
}

/// Branch order matches precedence: portfolio and risk questions outrank
/// overview questions, which outrank sector questions, which outrank
/// explicit symbols. The market overview is the final fallback, so this
/// resolution itself never comes up empty.
fn resolve_quote_target(query: &str) -> QuoteTarget {
    let query_lower = query.to_lowercase();

    if query_lower.contains("portfolio") || query_lower.contains("risk") {
        return QuoteTarget::Portfolio;
    }
    if query_lower.contains("market") || query_lower.contains("indices") {
        return QuoteTarget::MarketOverview;
    }
    if query_lower.contains("sector") {
        return QuoteTarget::SectorPerformance;
    }

    let symbols = extract_symbols(query);
    if !symbols.is_empty() {
        return QuoteTarget::Symbols(symbols);
    }

    if ["stock", "price", "shares"]
        .iter()
        .any(|word| query_lower.contains(word))
    {
        return QuoteTarget::DefaultStocks;
    }

    QuoteTarget::MarketOverview
}

/// Ticker candidates: short alphabetic tokens (uppercased, punctuation
/// trimmed) that survive the stopword filter, plus company-name lookups.
/// Capped at `MAX_SYMBOLS`, first mention wins.
fn extract_symbols(query: &str) -> Vec<String> {
    let query_lower = query.to_lowercase();
    let mut symbols: Vec<String> = Vec::new();

    for token in query.split_whitespace() {
        let token = token
            .trim_matches(|c: char| !c.is_ascii_alphabetic())
            .to_uppercase();
        if token.is_empty() || token.len() > MAX_SYMBOL_LEN {
            continue;
        }
        if !token.chars().all(|c| c.is_ascii_alphabetic()) {
            continue;
        }
        if SYMBOL_STOPWORDS.contains(&token.as_str()) {
            continue;
        }
        if !symbols.contains(&token) {
            symbols.push(token);
        }
    }

    for (company, symbol) in COMPANY_SYMBOLS {
        if query_lower.contains(company) && !symbols.iter().any(|s| s == symbol) {
            symbols.push((*symbol).to_string());
        }
    }

    symbols.truncate(MAX_SYMBOLS);
    symbols
}

//
// ================= Quote Formatting =================
//

#[derive(Debug, Clone, Deserialize)]
pub struct Quote {
    pub symbol: String,
    #[serde(default)]
    pub name: Option<String>,
    pub price: f64,
    #[serde(default)]
    pub change_percent: f64,
    #[serde(default)]
    pub volume: u64,
}

fn format_quote_line(quote: &Quote) -> String {
    let name = quote
        .name
        .clone()
        .unwrap_or_else(|| format!("{} Inc.", quote.symbol));
    let sign = if quote.change_percent >= 0.0 { "+" } else { "" };

    let mut line = format!(
        "{} ({}): ${:.2}, {}{:.2}% change",
        quote.symbol, name, quote.price, sign, quote.change_percent
    );
    if quote.volume > 0 {
        line.push_str(&format!(", volume {}", quote.volume));
    }
    line
}

fn render_payload(target: &QuoteTarget, lines: Vec<String>) -> FetchResult {
    if lines.is_empty() {
        return Err(FailureReason::NoDataFound);
    }
    Ok(format!("{}:\n{}", target.heading(), lines.join("\n")))
}

//
// ================= HTTP Provider =================
//

/// Quote-service client: GET {base}/quote?symbol=X per symbol. Symbols the
/// service does not know are skipped; an empty basket is NoDataFound.
pub struct HttpMarketDataProvider {
    client: Client,
    base_url: String,
}

impl HttpMarketDataProvider {
    pub fn new(base_url: String) -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(30))
            .user_agent("finance-assistant-orchestrator/0.1")
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Option<Quote>, FailureReason> {
        let url = format!("{}/quote", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("symbol", symbol)])
            .send()
            .await
            .map_err(|e| {
                warn!(symbol = %symbol, "Quote request failed: {}", e);
                if e.is_connect() || e.is_timeout() {
                    FailureReason::ProviderUnavailable
                } else {
                    FailureReason::UpstreamError(format!("quote request failed: {}", e))
                }
            })?;

        match response.status() {
            status if status.is_success() => {
                let quote: Quote = response.json().await.map_err(|e| {
                    FailureReason::UpstreamError(format!("quote parse error: {}", e))
                })?;
                Ok(Some(quote))
            }
            // Unknown or delisted symbols are skipped, not fatal.
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(FailureReason::UpstreamError(format!(
                "quote service returned {}",
                status
            ))),
        }
    }
}

#[async_trait]
impl MarketDataProvider for HttpMarketDataProvider {
    async fn fetch(&self, query: &str) -> FetchResult {
        let target = resolve_quote_target(query);
        debug!(target = ?target, "Resolved market data target");

        let mut lines = Vec::new();
        for symbol in target.symbols() {
            match self.fetch_quote(&symbol).await? {
                Some(quote) => lines.push(format_quote_line(&quote)),
                None => debug!(symbol = %symbol, "No quote for symbol, skipping"),
            }
        }

        render_payload(&target, lines)
    }
}

//
// ================= Static Provider =================
//

/// Fixture table keyed by the same targets the HTTP provider resolves.
const FIXTURE_QUOTES: &[(&str, &str, f64, f64, u64)] = &[
    ("AAPL", "Apple Inc.", 189.45, 1.2, 4_512_300),
    ("MSFT", "Microsoft Corporation", 415.30, 0.6, 2_201_800),
    ("GOOGL", "Alphabet Inc.", 162.10, -0.4, 3_104_500),
    ("TSLA", "Tesla, Inc.", 245.10, 1.2, 9_887_000),
    ("NVDA", "NVIDIA Corporation", 118.70, 2.1, 12_450_000),
    ("AMZN", "Amazon.com, Inc.", 178.25, 0.9, 5_310_200),
    ("^GSPC", "S&P 500", 5302.40, 0.3, 0),
    ("^DJI", "Dow Jones Industrial Average", 39870.10, 0.1, 0),
    ("^IXIC", "NASDAQ Composite", 16720.55, 0.7, 0),
    ("^RUT", "Russell 2000", 2091.30, -0.2, 0),
    ("XLK", "Technology Select Sector SPDR", 212.44, 0.8, 0),
    ("XLV", "Health Care Select Sector SPDR", 146.02, -0.1, 0),
    ("XLF", "Financial Select Sector SPDR", 41.88, 0.2, 0),
    ("XLE", "Energy Select Sector SPDR", 92.60, -0.5, 0),
    ("XLY", "Consumer Discretionary SPDR", 178.90, 0.4, 0),
];

/// Deterministic provider for demos and offline tests. Unknown symbols are
/// skipped exactly like the HTTP provider skips them.
pub struct StaticMarketDataProvider;

impl StaticMarketDataProvider {
    fn lookup(symbol: &str) -> Option<Quote> {
        FIXTURE_QUOTES
            .iter()
            .find(|(s, _, _, _, _)| *s == symbol)
            .map(|(s, name, price, change, volume)| Quote {
                symbol: (*s).to_string(),
                name: Some((*name).to_string()),
                price: *price,
                change_percent: *change,
                volume: *volume,
            })
    }
}

#[async_trait]
impl MarketDataProvider for StaticMarketDataProvider {
    async fn fetch(&self, query: &str) -> FetchResult {
        let target = resolve_quote_target(query);

        let lines: Vec<String> = target
            .symbols()
            .iter()
            .filter_map(|symbol| Self::lookup(symbol))
            .map(|quote| format_quote_line(&quote))
            .collect();

        render_payload(&target, lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_explicit_symbols() {
        assert_eq!(extract_symbols("What is AAPL trading at?"), vec!["AAPL"]);
        assert_eq!(
            extract_symbols("Compare NVDA and AMD for me"),
            vec!["NVDA", "AMD"]
        );
    }

    #[test]
    fn test_extract_company_names() {
        let symbols = extract_symbols("apple stock price today?");
        assert!(symbols.contains(&"AAPL".to_string()));

        let symbols = extract_symbols("how is microsoft doing");
        assert!(symbols.contains(&"MSFT".to_string()));
    }

    #[test]
    fn test_extract_caps_at_three() {
        let symbols = extract_symbols("AAPL MSFT GOOGL TSLA NVDA");
        assert_eq!(symbols.len(), MAX_SYMBOLS);
    }

    #[test]
    fn test_stopwords_are_not_symbols() {
        assert!(extract_symbols("What is the price of stocks today?").is_empty());
    }

    #[test]
    fn test_resolve_portfolio_and_risk() {
        assert_eq!(
            resolve_quote_target("How risky is my portfolio?"),
            QuoteTarget::Portfolio
        );
        assert_eq!(
            resolve_quote_target("assess the risk here"),
            QuoteTarget::Portfolio
        );
    }

    #[test]
    fn test_resolve_overview_and_sector() {
        assert_eq!(
            resolve_quote_target("How did the market open?"),
            QuoteTarget::MarketOverview
        );
        assert_eq!(
            resolve_quote_target("Which sector performed best?"),
            QuoteTarget::SectorPerformance
        );
    }

    #[test]
    fn test_resolve_generic_stock_words_use_defaults() {
        assert_eq!(
            resolve_quote_target("What is the price of stocks today?"),
            QuoteTarget::DefaultStocks
        );
    }

    #[test]
    fn test_quote_line_carries_currency_and_percent() {
        let quote = Quote {
            symbol: "TSLA".to_string(),
            name: Some("Tesla, Inc.".to_string()),
            price: 245.10,
            change_percent: 1.2,
            volume: 9_887_000,
        };
        let line = format_quote_line(&quote);
        assert!(line.contains("$245.10"));
        assert!(line.contains("+1.20%"));
        assert!(line.contains("TSLA"));
    }

    #[tokio::test]
    async fn test_static_provider_answers_symbol_queries() {
        let payload = StaticMarketDataProvider
            .fetch("Apple stock price today?")
            .await
            .expect("fixture quote");
        assert!(payload.contains("AAPL"));
        assert!(payload.contains('$'));
    }

    #[tokio::test]
    async fn test_static_provider_reports_no_data_for_unknown_symbols() {
        let err = StaticMarketDataProvider
            .fetch("What is ZZZZZ trading at?")
            .await
            .expect_err("unknown symbol");
        assert_eq!(err, FailureReason::NoDataFound);
    }
}
