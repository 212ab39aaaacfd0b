//! News search provider
//!
//! NewsAPI-style client: one URL-encoded GET, top articles mapped to
//! numbered "title - description (source)" lines. A static provider with
//! fixture headlines covers demos and offline tests.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::{FetchResult, NewsSearchProvider};
use crate::models::FailureReason;

const MAX_ARTICLES: usize = 5;

#[derive(Debug, Deserialize)]
struct NewsResponse {
    #[serde(default)]
    articles: Vec<Article>,
}

#[derive(Debug, Deserialize)]
struct Article {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    source: Option<ArticleSource>,
}

#[derive(Debug, Deserialize)]
struct ArticleSource {
    #[serde(default)]
    name: String,
}

/// Numbered headline lines; None when no article had a usable title.
fn format_articles(articles: &[Article]) -> Option<String> {
    let lines: Vec<String> = articles
        .iter()
        .filter(|article| !article.title.trim().is_empty())
        .take(MAX_ARTICLES)
        .enumerate()
        .map(|(i, article)| {
            let mut line = format!("{}. {}", i + 1, article.title.trim());
            if let Some(description) = article.description.as_deref() {
                if !description.trim().is_empty() {
                    line.push_str(" - ");
                    line.push_str(description.trim());
                }
            }
            if let Some(source) = &article.source {
                if !source.name.trim().is_empty() {
                    line.push_str(&format!(" ({})", source.name.trim()));
                }
            }
            line
        })
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

//
// ================= HTTP Provider =================
//

pub struct HttpNewsSearchProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpNewsSearchProvider {
    pub fn new(base_url: String, api_key: String) -> Self {
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
            api_key,
        }
    }
}

#[async_trait]
impl NewsSearchProvider for HttpNewsSearchProvider {
    async fn fetch(&self, query: &str) -> FetchResult {
        let url = format!(
            "{}/everything?q={}&sortBy=publishedAt&pageSize={}&apiKey={}",
            self.base_url,
            urlencoding::encode(query),
            MAX_ARTICLES,
            self.api_key
        );

        debug!(query = %query, "Searching news coverage");

        let response = self.client.get(&url).send().await.map_err(|e| {
            warn!("News request failed: {}", e);
            if e.is_connect() || e.is_timeout() {
                FailureReason::ProviderUnavailable
            } else {
                FailureReason::UpstreamError(format!("news request failed: {}", e))
            }
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FailureReason::UpstreamError(
                "news service rate limited".to_string(),
            ));
        }
        if !status.is_success() {
            return Err(FailureReason::UpstreamError(format!(
                "news service returned {}",
                status
            )));
        }

        let body: NewsResponse = response
            .json()
            .await
            .map_err(|e| FailureReason::UpstreamError(format!("news parse error: {}", e)))?;

        format_articles(&body.articles).ok_or(FailureReason::NoDataFound)
    }
}

//
// ================= Static Provider =================
//

/// Deterministic fixture headlines around the query topic.
pub struct StaticNewsSearchProvider;

#[async_trait]
impl NewsSearchProvider for StaticNewsSearchProvider {
    async fn fetch(&self, query: &str) -> FetchResult {
        let topic = query.trim().trim_end_matches(['?', '.', '!']).trim();
        let topic = if topic.is_empty() { "the market" } else { topic };

        Ok(format!(
            "1. {topic}: traders weigh the latest session - Desks flag steady volumes and a cautious tone into the close. (Newswire)\n\
             2. Analysts split on the near-term outlook - Strategists cite earnings momentum against rate uncertainty. (Market Daily)\n\
             3. What to watch this week - A quick rundown of the data and events most likely to move prices. (Morning Brief)",
            topic = topic
        ))
    }
}
