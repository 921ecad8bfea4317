use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiResult;

#[derive(Debug, Default, Deserialize)]
pub struct RevalidateRequest {
    pub actor_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct RevalidateResponse {
    pub invoice_id: Uuid,
    pub validation_id: Uuid,
}

/// POST /api/v1/invoices/:id/validate
pub async fn revalidate_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
    body: Option<Json<RevalidateRequest>>,
) -> ApiResult<Json<RevalidateResponse>> {
    let actor_id = body.and_then(|Json(request)| request.actor_id);
    let validation_id = state.coordinator.revalidate(invoice_id, actor_id).await?;
    Ok(Json(RevalidateResponse {
        invoice_id,
        validation_id,
    }))
}
