//! Output normalization
//!
//! Terminal formatting pass over the synthesized answer. The completion
//! service occasionally produces run-together words or bare numbers where
//! a currency or percent symbol belongs; this pass repairs the surface
//! without touching the facts. Cosmetic by contract, so any failure short
//! of rate limiting keeps the original text.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::completion::CompletionService;
use crate::error::{OrchestrationError, Result};

/// Inputs shorter than this (after trimming) are passed through untouched.
pub const MIN_NORMALIZABLE_CHARS: usize = 5;

const FORMATTING_INSTRUCTIONS: &str = "You are a text formatting specialist. Fix formatting \
issues in the supplied financial text: ensure proper spacing between words and numbers, add \
currency symbols ($) where prices need them, format percentages correctly (\"3.4%\" not \"3.4\"), \
separate concatenated words (\"stockis\" becomes \"stock is\"), and fix punctuation spacing. Keep \
the same meaning, facts, and figures. Examples of fixes: \
\"202.82,reflectingaslightdecrease\" becomes \"$202.82, reflecting a slight decrease\"; \
\"Applestockistrading\" becomes \"Apple stock is trading\"; \
\"down3.78\" becomes \"down 3.78%\". \
Return ONLY the corrected text without any commentary.";

pub struct Normalizer {
    completion: Arc<dyn CompletionService>,
}

impl Normalizer {
    pub fn new(completion: Arc<dyn CompletionService>) -> Self {
        Self { completion }
    }

    /// Return `text` with surface formatting repaired. Idempotent in
    /// effect: well-formatted input comes back materially unchanged.
    pub async fn normalize(&self, text: &str) -> Result<String> {
        let trimmed = text.trim();
        if trimmed.chars().count() < MIN_NORMALIZABLE_CHARS {
            return Ok(text.to_string());
        }

        match self.completion.complete(FORMATTING_INSTRUCTIONS, trimmed).await {
            Ok(cleaned) if !cleaned.trim().is_empty() => {
                debug!(before = trimmed.len(), after = cleaned.len(), "formatting pass applied");
                Ok(cleaned)
            }
            Ok(_) => Ok(text.to_string()),
            Err(OrchestrationError::RateLimited(msg)) => Err(OrchestrationError::RateLimited(msg)),
            Err(e) => {
                warn!(error = %e, "formatting pass failed, keeping original text");
                Ok(text.to_string())
            }
        }
    }
}
