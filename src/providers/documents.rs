//! Uploaded-document context store
//!
//! In-memory only: the orchestration core persists nothing, and document
//! indexing internals (chunking, ranking) are someone else's subsystem.
//! This store is the narrow interface the pipeline consumes: uploads go
//! in, a bounded context string comes out.

use chrono::{DateTime, Utc};
use std::sync::RwLock;
use tracing::info;

use super::DocumentContextProvider;

/// Newest documents included in context.
const MAX_CONTEXT_DOCUMENTS: usize = 3;
/// Per-document character cap inside the context string.
const MAX_CHARS_PER_DOCUMENT: usize = 4000;

#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub name: String,
    pub content: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<Vec<StoredDocument>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_document(&self, name: impl Into<String>, content: impl Into<String>) {
        let document = StoredDocument {
            name: name.into(),
            content: content.into(),
            uploaded_at: Utc::now(),
        };
        info!(name = %document.name, chars = document.content.len(), "Document stored");

        let mut documents = self
            .documents
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        documents.push(document);
    }

    pub fn clear(&self) {
        let mut documents = self
            .documents
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        documents.clear();
        info!("Document store cleared");
    }

    pub fn document_count(&self) -> usize {
        self.documents
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl DocumentContextProvider for InMemoryDocumentStore {
    /// Concatenates the newest documents under numbered headings. No
    /// ranking: the query is accepted for interface parity only.
    fn context_for(&self, _query: &str) -> String {
        let documents = self
            .documents
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if documents.is_empty() {
            return String::new();
        }

        let newest: Vec<&StoredDocument> = documents
            .iter()
            .rev()
            .take(MAX_CONTEXT_DOCUMENTS)
            .collect();

        newest
            .into_iter()
            .rev()
            .enumerate()
            .map(|(i, document)| {
                let body: String = document.content.chars().take(MAX_CHARS_PER_DOCUMENT).collect();
                format!("Document {} ({}):\n{}", i + 1, document.name, body)
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
