//! API routes for the document chat server

pub mod chat;
pub mod documents;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::server::state::AppState;

/// Build all API routes
pub fn api_routes(max_upload_size: usize) -> Router<AppState> {
    Router::new()
        // Document management - upload carries the multipart body limit
        .route(
            "/documents",
            get(documents::list_documents)
                .post(documents::upload_document)
                .layer(DefaultBodyLimit::max(max_upload_size)),
        )
        .route("/documents/:id", get(documents::get_document))
        // Conversation
        .route("/documents/:id/messages", get(chat::list_messages))
        .route("/documents/:id/chat", post(chat::chat))
        .route("/documents/:id/explain", post(chat::explain))
        // Info
        .route("/info", get(info))
}

/// API info endpoint
async fn info() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "name": "docchat-rag",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Chat with your PDFs over a retrieval-augmented pipeline",
        "endpoints": {
            "POST /api/documents": "Upload a PDF for background ingestion",
            "GET /api/documents": "List your documents",
            "GET /api/documents/:id": "Get document details and status",
            "GET /api/documents/:id/messages": "Get recent conversation history",
            "POST /api/documents/:id/chat": "Ask a question (streams plain text)",
            "POST /api/documents/:id/explain": "Explain a selected passage (streams plain text)"
        },
        "features": {
            "deduplication": "Content-hash based upload deduplication",
            "namespaced_search": "Each document is searched in isolation",
            "grounded_answers": "Answers use only the document content",
            "streaming": "Chat and explain responses stream token by token"
        }
    }))
}
