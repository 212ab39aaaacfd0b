//! REST API server for the finance assistant
//!
//! Exposes the orchestration engine, the shared document store, and the
//! optional voice clients via HTTP endpoints.

use axum::body::Bytes;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{extract::State, http::StatusCode, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::models::QueryRequest;
use crate::orchestrator::Orchestrator;
use crate::providers::{DocumentContextProvider, InMemoryDocumentStore};
use crate::voice::{SpeechClient, TranscriptionClient};

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QueryApiRequest {
    pub query: String,
    pub document_context: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DocumentUploadRequest {
    pub name: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct SpeakRequest {
    pub text: String,
    pub voice_id: Option<String>,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    pub documents: Arc<InMemoryDocumentStore>,
    pub transcription: Option<Arc<TranscriptionClient>>,
    pub speech: Option<Arc<SpeechClient>>,
}

/// =============================
/// Session Correlation Helpers
/// =============================

fn stable_uuid_from_string(input: &str) -> uuid::Uuid {
    use sha2::{Digest, Sha256};

    let hash = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set UUID version (4) and variant (RFC4122) bits.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    uuid::Uuid::from_bytes(bytes)
}

fn parse_or_stable_uuid(value: Option<&str>, fallback_seed: &str) -> uuid::Uuid {
    match value {
        Some(v) if !v.trim().is_empty() => {
            uuid::Uuid::parse_str(v).unwrap_or_else(|_| stable_uuid_from_string(v))
        }
        _ => stable_uuid_from_string(fallback_seed),
    }
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Main Query Endpoint
/// =============================

async fn run_query(
    State(state): State<ApiState>,
    Json(req): Json<QueryApiRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    if req.query.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Query text is required".to_string())),
        );
    }

    let session_id = parse_or_stable_uuid(req.session_id.as_deref(), "anonymous-session");

    // An explicit context field wins; otherwise the shared store decides.
    let context = match req.document_context {
        Some(c) if !c.trim().is_empty() => c,
        _ => state.documents.context_for(&req.query),
    };

    let request = QueryRequest::new(req.query, context);
    let query_id = request.query_id;
    info!(%session_id, %query_id, "Received query request");

    match state.orchestrator.run(request).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "answer": outcome.answer,
                "intent": outcome.intent,
                "escalated": outcome.outcomes.escalated(),
                "query_id": outcome.query_id,
                "session_id": session_id,
                "elapsed_ms": outcome.elapsed_ms,
                "stage_trace": outcome.stage_trace,
            }))),
        ),
        Err(e) => match Orchestrator::recovery_message(&e) {
            Some(message) => (
                StatusCode::OK,
                Json(ApiResponse::success(serde_json::json!({
                    "answer": message,
                    "query_id": query_id,
                    "session_id": session_id,
                    "degraded": true,
                }))),
            ),
            None => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(format!("Orchestration failed: {}", e))),
            ),
        },
    }
}

/// =============================
/// Document Endpoints
/// =============================

async fn upload_document(
    State(state): State<ApiState>,
    Json(req): Json<DocumentUploadRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    if req.content.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Document content is required".to_string())),
        );
    }

    let name = if req.name.trim().is_empty() {
        "untitled".to_string()
    } else {
        req.name
    };
    state.documents.add_document(name.clone(), req.content);
    info!(document = %name, total = state.documents.document_count(), "Document upload accepted");

    (
        StatusCode::OK,
        Json(ApiResponse::success(serde_json::json!({
            "stored": name,
            "documents": state.documents.document_count(),
        }))),
    )
}

async fn clear_documents(State(state): State<ApiState>) -> (StatusCode, Json<ApiResponse>) {
    state.documents.clear();
    info!("Uploaded documents discarded");

    (
        StatusCode::OK,
        Json(ApiResponse::success(serde_json::json!({
            "documents": 0,
        }))),
    )
}

/// =============================
/// Voice Endpoints
/// =============================

async fn voice_query(
    State(state): State<ApiState>,
    body: Bytes,
) -> (StatusCode, Json<ApiResponse>) {
    let Some(transcription) = state.transcription.as_ref() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::error(
                "Transcription is not configured".to_string(),
            )),
        );
    };
    if body.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Audio body is empty".to_string())),
        );
    }

    let transcript = match transcription.transcribe(body.to_vec()).await {
        Ok(t) if t.trim().is_empty() => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::error(
                    "Could not hear a question in the audio".to_string(),
                )),
            );
        }
        Ok(t) => t,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(format!("Transcription failed: {}", e))),
            );
        }
    };

    let context = state.documents.context_for(&transcript);
    let request = QueryRequest::new(transcript.clone(), context);
    let query_id = request.query_id;
    info!(%query_id, transcript = %transcript, "Transcribed voice query");

    match state.orchestrator.run(request).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "transcript": transcript,
                "answer": outcome.answer,
                "intent": outcome.intent,
                "escalated": outcome.outcomes.escalated(),
                "query_id": outcome.query_id,
            }))),
        ),
        Err(e) => match Orchestrator::recovery_message(&e) {
            Some(message) => (
                StatusCode::OK,
                Json(ApiResponse::success(serde_json::json!({
                    "transcript": transcript,
                    "answer": message,
                    "query_id": query_id,
                    "degraded": true,
                }))),
            ),
            None => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(format!("Orchestration failed: {}", e))),
            ),
        },
    }
}

async fn speak(State(state): State<ApiState>, Json(req): Json<SpeakRequest>) -> Response {
    let Some(speech) = state.speech.as_ref() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::error(
                "Speech synthesis is not configured".to_string(),
            )),
        )
            .into_response();
    };
    if req.text.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Text is required".to_string())),
        )
            .into_response();
    }

    match speech.speak(&req.text, req.voice_id.as_deref()).await {
        Ok(audio) => ([(header::CONTENT_TYPE, "audio/wav")], audio).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(format!("Speech synthesis failed: {}", e))),
        )
            .into_response(),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/query", post(run_query))
        .route(
            "/api/documents",
            post(upload_document).delete(clear_documents),
        )
        .route("/api/voice/query", post(voice_query))
        .route("/api/speak", post(speak))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    state: ApiState,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
