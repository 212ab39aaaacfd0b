//! Capability providers
//!
//! Narrow seams over the external data systems the handlers consume. Every
//! fetch resolves to either a payload string or a typed `FailureReason`;
//! transport details never cross this boundary. Each trait ships with an
//! HTTP-backed implementation and a deterministic static one for demos and
//! offline tests.

pub mod documents;
pub mod market;
pub mod news;

pub use documents::{InMemoryDocumentStore, StoredDocument};
pub use market::{HttpMarketDataProvider, StaticMarketDataProvider};
pub use news::{HttpNewsSearchProvider, StaticNewsSearchProvider};

use async_trait::async_trait;

use crate::models::FailureReason;

/// What one provider fetch produced.
pub type FetchResult = std::result::Result<String, FailureReason>;

/// Live quote data, resolved from a natural-language query.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn fetch(&self, query: &str) -> FetchResult;
}

/// Recent news coverage for a query, formatted as numbered headlines.
#[async_trait]
pub trait NewsSearchProvider: Send + Sync {
    async fn fetch(&self, query: &str) -> FetchResult;
}

/// Uploaded-document context lookup. Empty string means no context; this
/// call cannot fail.
pub trait DocumentContextProvider: Send + Sync {
    fn context_for(&self, query: &str) -> String;
}
