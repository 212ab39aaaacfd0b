//! Text completion service
//!
//! One seam between the pipeline and the language model: classifier,
//! handlers, synthesizer, and normalizer all speak through the
//! `CompletionService` trait, so tests can substitute scripted doubles.
//! The production implementation is a long-lived, connection-pooled
//! Gemini client.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::error::{OrchestrationError, Result};

#[async_trait]
pub trait CompletionService: Send + Sync {
    /// `instructions` describes the task, `input` carries the material to
    /// work on. Returns the model's text, trimmed.
    async fn complete(&self, instructions: &str, input: &str) -> Result<String>;
}

const GEMINI_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";

/// Prose steps ask for 2-3 sentences with exact figures, so sampling stays
/// close to deterministic and output length stays bounded.
const TEMPERATURE: f32 = 0.1;
const MAX_OUTPUT_TOKENS: i32 = 800;

/// Reusable Gemini client (connection-pooled)
pub struct GeminiCompletion {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiCompletion {
    pub fn new(api_key: String) -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key,
            base_url: GEMINI_ENDPOINT.to_string(),
        }
    }
}

#[async_trait]
impl CompletionService for GeminiCompletion {
    async fn complete(&self, instructions: &str, input: &str) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(OrchestrationError::Configuration(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let url = format!("{}?key={}", self.base_url, self.api_key);

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: input.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: instructions.to_string(),
                }],
            },
        };

        debug!(input_chars = input.len(), "Calling completion service");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!("Completion request failed: {}", e);
                OrchestrationError::ServiceUnavailable(format!("completion request failed: {}", e))
            })?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            warn!("Completion service rate limited: {}", body);
            return Err(OrchestrationError::RateLimited(
                "completion service quota exhausted".to_string(),
            ));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, "Completion service error response: {}", body);
            return Err(OrchestrationError::ServiceUnavailable(format!(
                "completion service returned {}",
                status
            )));
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| {
            error!("Failed to parse completion response: {}", e);
            OrchestrationError::ServiceUnavailable(format!("completion parse error: {}", e))
        })?;

        let text = parsed
            .candidates
            .first()
            .and_then(|candidate| candidate.content.parts.first())
            .map(|part| part.text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| {
                OrchestrationError::EmptyCompletion(
                    "completion response carried no text".to_string(),
                )
            })?;

        debug!(output_chars = text.len(), "Completion received");

        Ok(text)
    }
}

/// Offline stand-in used by the demo binary and tests. Hands the input
/// straight back, which makes label parsing fail (so classification takes
/// the keyword path) and leaves handler payloads visible in answers.
pub struct MockCompletion;

#[async_trait]
impl CompletionService for MockCompletion {
    async fn complete(&self, _instructions: &str, input: &str) -> Result<String> {
        Ok(input.to_string())
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    system_instruction: SystemInstruction,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}
