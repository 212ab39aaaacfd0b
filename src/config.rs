//! Environment-backed runtime settings.
//!
//! Only the completion-service credential is mandatory; every provider
//! endpoint is optional and its absence selects the static fallback
//! implementation (or disables the feature, for voice).

use std::env;
use std::time::Duration;

use crate::error::{OrchestrationError, Result};

pub const DEFAULT_HANDLER_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_NEWS_API_BASE_URL: &str = "https://newsapi.org/v2";
pub const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone)]
pub struct Settings {
    /// Credential for the text completion service. Required.
    pub gemini_api_key: String,
    /// Base URL of the quote service. None selects the static provider.
    pub market_data_base_url: Option<String>,
    pub news_api_base_url: String,
    /// News API credential. None selects the static provider.
    pub news_api_key: Option<String>,
    /// Speech-to-text credential. None disables voice queries.
    pub groq_api_key: Option<String>,
    /// Text-to-speech credential. None disables audio replies.
    pub murf_api_key: Option<String>,
    /// Bounded timeout applied to every handler invocation.
    pub handler_timeout: Duration,
    pub port: u16,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let gemini_api_key = require("GEMINI_API_KEY")?;

        let handler_timeout_secs = match optional("HANDLER_TIMEOUT_SECS") {
            Some(raw) => raw.parse::<u64>().map_err(|_| {
                OrchestrationError::Configuration(format!(
                    "HANDLER_TIMEOUT_SECS must be a whole number of seconds, got '{}'",
                    raw
                ))
            })?,
            None => DEFAULT_HANDLER_TIMEOUT_SECS,
        };

        let port = match optional("PORT").or_else(|| optional("API_PORT")) {
            Some(raw) => raw.parse::<u16>().map_err(|_| {
                OrchestrationError::Configuration(format!("PORT must be a port number, got '{}'", raw))
            })?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            gemini_api_key,
            market_data_base_url: optional("MARKET_DATA_BASE_URL"),
            news_api_base_url: optional("NEWS_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_NEWS_API_BASE_URL.to_string()),
            news_api_key: optional("NEWS_API_KEY"),
            groq_api_key: optional("GROQ_API_KEY"),
            murf_api_key: optional("MURF_API_KEY"),
            handler_timeout: Duration::from_secs(handler_timeout_secs),
            port,
        })
    }
}

fn require(name: &str) -> Result<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(OrchestrationError::Configuration(format!(
            "{} is not set; the assistant cannot answer without it",
            name
        ))),
    }
}

fn optional(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
