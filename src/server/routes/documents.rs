//! Document upload and listing endpoints

use axum::{
    extract::{Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::ingestion::{IngestJob, IngestQueue};
use crate::loader::PdfLoader;
use crate::server::state::AppState;
use crate::storage::DocumentRegistry;
use crate::types::{Document, DocumentStatus};

/// Response for a queued or deduplicated upload
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    /// Document to poll for status
    pub document_id: Uuid,
    /// Original filename
    pub filename: String,
    /// Status at response time
    pub status: DocumentStatus,
}

/// Document details returned by the API
#[derive(Debug, Serialize)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub filename: String,
    pub page_count: Option<u32>,
    pub file_size: u64,
    pub status: DocumentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Document> for DocumentResponse {
    fn from(doc: Document) -> Self {
        Self {
            id: doc.id,
            filename: doc.filename,
            page_count: doc.page_count,
            file_size: doc.file_size,
            status: doc.status,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
        }
    }
}

/// POST /api/documents - Upload a PDF and queue it for ingestion
pub async fn upload_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>)> {
    let user_id = state.auth().resolve(&headers).await?;

    let mut filename = String::from("document.pdf");
    let mut data: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::InvalidRequest(format!("Failed to read multipart field: {}", e)))?
    {
        match field.file_name() {
            Some(name) => filename = name.to_string(),
            None => continue,
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| Error::InvalidRequest(format!("Failed to read upload: {}", e)))?;
        data = Some(bytes.to_vec());
        break;
    }

    let data = data.ok_or_else(|| {
        Error::InvalidRequest("Multipart upload carries no file field".to_string())
    })?;
    if data.is_empty() {
        return Err(Error::InvalidRequest("Uploaded file is empty".to_string()));
    }
    if !looks_like_pdf(&filename, &data) {
        return Err(Error::InvalidRequest(format!(
            "'{}' is not a PDF; only PDF uploads are supported",
            filename
        )));
    }

    let content_hash = hex::encode(Sha256::digest(&data));

    if let Some(existing) = state.db().find_by_hash(&user_id, &content_hash).await? {
        if reuse_existing(&existing) {
            tracing::info!(
                "Upload of '{}' matches existing document {} ({})",
                filename,
                existing.id,
                existing.status.as_str()
            );
            return Ok((
                StatusCode::OK,
                Json(UploadResponse {
                    document_id: existing.id,
                    filename: existing.filename,
                    status: existing.status,
                }),
            ));
        }
    }

    // Page count here is informational only; the quota check recounts from
    // the extracted pages. A corrupt file still queues and fails in the
    // pipeline where the failure is recorded on the document.
    let (count, data) = tokio::task::spawn_blocking(move || {
        let count = PdfLoader::page_count(&data);
        (count, data)
    })
    .await
    .map_err(|e| Error::Internal(format!("Page count task failed: {}", e)))?;

    let mut document = Document::new(&user_id, &filename, &content_hash, data.len() as u64);
    document.page_count = count.ok();

    let storage_path = state
        .config()
        .storage
        .originals_dir()
        .join(format!("{}.pdf", document.id));
    tokio::fs::write(&storage_path, &data).await?;
    document.storage_path = Some(storage_path.to_string_lossy().into_owned());

    state.db().create(&document).await?;
    mark_and_queue(
        state.db().as_ref(),
        state.queue(),
        document.id,
        user_id,
        data,
    )
    .await?;

    tracing::info!(
        "Queued document {} ('{}', {} bytes) for ingestion",
        document.id,
        document.filename,
        document.file_size
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(UploadResponse {
            document_id: document.id,
            filename: document.filename,
            status: DocumentStatus::Processing,
        }),
    ))
}

/// GET /api/documents - List the requesting user's documents
pub async fn list_documents(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<DocumentResponse>>> {
    let user_id = state.auth().resolve(&headers).await?;
    let documents = state.db().list_for_owner(&user_id).await?;
    Ok(Json(documents.into_iter().map(Into::into).collect()))
}

/// GET /api/documents/:id - Get one document with its processing status
pub async fn get_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<DocumentResponse>> {
    let user_id = state.auth().resolve(&headers).await?;
    let document = state
        .db()
        .get_for_owner(id, &user_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Document {}", id)))?;
    Ok(Json(document.into()))
}

/// A PDF either announces itself in the magic bytes or at least claims
/// the extension
fn looks_like_pdf(filename: &str, data: &[u8]) -> bool {
    data.starts_with(b"%PDF")
        || mime_guess::from_path(filename).first_or_octet_stream() == "application/pdf"
}

/// Whether a previous upload of the same bytes should be reused.
///
/// A pending, running, or successful attempt is the same work already
/// underway or done; a failed attempt gets a fresh document and a fresh
/// ingestion run.
fn reuse_existing(existing: &Document) -> bool {
    existing.status != DocumentStatus::Failed
}

/// Mark the document PROCESSING, then hand its bytes to the queue.
///
/// The status write comes before the submit so a fast worker's terminal
/// write can never be overwritten by a later write from this handler.
/// A refused submission puts the document back to PENDING and surfaces
/// the queue error to the uploader.
async fn mark_and_queue(
    registry: &dyn DocumentRegistry,
    queue: &IngestQueue,
    document_id: Uuid,
    owner_id: String,
    data: Vec<u8>,
) -> Result<()> {
    registry
        .set_status(document_id, DocumentStatus::Processing)
        .await?;

    let job = IngestJob {
        document_id,
        owner_id,
        data,
    };
    if let Err(e) = queue.submit(job) {
        if let Err(revert) = registry
            .set_status(document_id, DocumentStatus::Pending)
            .await
        {
            tracing::error!(
                "Failed to revert document {} to pending: {}",
                document_id,
                revert
            );
        }
        return Err(e);
    }
    Ok(())
}
