//! Document upload and pipeline re-entry handlers.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use covenant_document_processing::{SubmissionReceipt, Upload};
use covenant_models::{DocumentStatus, DocumentType};

use crate::app::AppState;
use crate::error::{ApiError, ApiResult};

/// POST /api/v1/documents
///
/// Multipart fields: `file` (required), `document_type` (`contract` or
/// `invoice`, required), `uploaded_by` (optional uuid).
pub async fn upload_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<SubmissionReceipt>)> {
    let mut file: Option<(String, String, Vec<u8>)> = None;
    let mut document_type: Option<DocumentType> = None;
    let mut uploaded_by: Option<Uuid> = None;

    while let Some(field) = multipart.next_field().await? {
        match field.name().unwrap_or_default() {
            "file" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field.bytes().await?;
                file = Some((file_name, content_type, data.to_vec()));
            }
            "document_type" => {
                let text = field.text().await?;
                document_type = Some(DocumentType::parse(&text).ok_or_else(|| {
                    ApiError::BadRequest(format!("document_type must be contract or invoice, got '{}'", text.trim()))
                })?);
            }
            "uploaded_by" => {
                let text = field.text().await?;
                uploaded_by = Some(
                    Uuid::parse_str(text.trim())
                        .map_err(|_| ApiError::BadRequest("uploaded_by must be a uuid".to_string()))?,
                );
            }
            other => tracing::debug!(field = other, "Ignoring unknown upload field"),
        }
    }

    let (file_name, content_type, data) =
        file.ok_or_else(|| ApiError::BadRequest("no file provided".to_string()))?;
    let document_type = document_type.ok_or_else(|| ApiError::BadRequest("document_type is required".to_string()))?;

    let receipt = state
        .coordinator
        .submit(Upload {
            file_name,
            content_type,
            document_type,
            data,
            uploaded_by,
        })
        .await?;

    Ok((StatusCode::ACCEPTED, Json(receipt)))
}

/// GET /api/v1/documents/:id/status
pub async fn document_status(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<DocumentStatus>> {
    Ok(Json(state.coordinator.status(id).await?))
}

/// POST /api/v1/documents/:id/resubmit
pub async fn resubmit_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<DocumentStatus>)> {
    Ok((StatusCode::ACCEPTED, Json(state.coordinator.resubmit(id).await?)))
}

/// POST /api/v1/documents/:id/reextract
pub async fn reextract_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<DocumentStatus>)> {
    Ok((StatusCode::ACCEPTED, Json(state.coordinator.reextract(id).await?)))
}
