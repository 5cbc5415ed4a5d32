//! Conversation endpoints: history, chat, and explain

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::providers::TokenStream;
use crate::server::state::AppState;
use crate::storage::{ConversationStore, DocumentRegistry};
use crate::types::{Message, MessageRole};

/// Request body for the chat endpoint
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// Question about the document
    pub message: String,
}

/// Request body for the explain endpoint
#[derive(Debug, Deserialize)]
pub struct ExplainRequest {
    /// Passage copied from the document
    pub selection: String,
    /// Optional extra instruction for the explanation
    #[serde(default)]
    pub instruction: Option<String>,
    /// Optional answer language
    #[serde(default)]
    pub language: Option<String>,
}

/// Query parameters for listing messages
#[derive(Debug, Deserialize)]
pub struct ListMessagesQuery {
    /// Most recent messages to return
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// A stored conversation message
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub role: MessageRole,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl From<Message> for MessageResponse {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            role: message.role,
            text: message.text,
            created_at: message.created_at,
        }
    }
}

/// GET /api/documents/:id/messages - Recent history, oldest first
pub async fn list_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Query(query): Query<ListMessagesQuery>,
) -> Result<Json<Vec<MessageResponse>>> {
    let user_id = state.auth().resolve(&headers).await?;
    state
        .db()
        .get_for_owner(id, &user_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Document {}", id)))?;

    let messages = state.db().recent(id, query.limit).await?;
    Ok(Json(messages.into_iter().map(Into::into).collect()))
}

/// POST /api/documents/:id/chat - Answer a question, streaming plain text
pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(request): Json<ChatRequest>,
) -> Result<Response> {
    let user_id = state.auth().resolve(&headers).await?;
    if request.message.trim().is_empty() {
        return Err(Error::InvalidRequest(
            "Message must not be empty".to_string(),
        ));
    }

    // The message reaches the prompt and the conversation log exactly as
    // submitted.
    let stream = state.engine().answer(id, &user_id, &request.message).await?;
    Ok(token_response(stream))
}

/// POST /api/documents/:id/explain - Explain a passage, streaming plain text
pub async fn explain(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(request): Json<ExplainRequest>,
) -> Result<Response> {
    let user_id = state.auth().resolve(&headers).await?;
    if request.selection.trim().is_empty() {
        return Err(Error::InvalidRequest(
            "Selection must not be empty".to_string(),
        ));
    }

    let stream = state
        .engine()
        .explain(
            id,
            &user_id,
            &request.selection,
            request.instruction.as_deref(),
            request.language.as_deref(),
        )
        .await?;
    Ok(token_response(stream))
}

/// Wrap a token stream as a chunked plain-text response.
///
/// An error mid-stream aborts the body, which the client observes as a
/// broken transfer rather than a trailing error payload.
fn token_response(stream: TokenStream) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(stream),
    )
        .into_response()
}
