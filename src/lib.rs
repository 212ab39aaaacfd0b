//! Finance Assistant Orchestrator
//!
//! A query-answering pipeline for financial questions that:
//! - Classifies each query into one of five intents (LLM-first, keyword fallback)
//! - Routes to market-data, news, document, or general-chat handlers
//! - Escalates a failed market-data lookup to news search, once
//! - Synthesizes handler output into one short answer
//! - Normalizes the answer's surface formatting as the terminal step
//!
//! PIPELINE:
//! CLASSIFY → ROUTE → EXECUTE → ESCALATE? → SYNTHESIZE → NORMALIZE

pub mod api;
pub mod classifier;
pub mod completion;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod normalizer;
pub mod orchestrator;
pub mod providers;
pub mod relevance;
pub mod synthesizer;
pub mod voice;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use orchestrator::Orchestrator;
