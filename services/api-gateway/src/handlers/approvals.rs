use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use covenant_approval_workflow::{ApprovalView, DecisionRequest, SweepReport};
use covenant_models::{ApprovalStatus, InvoiceApprovalRequest};

use crate::app::AppState;
use crate::error::ApiResult;

#[derive(Debug, Deserialize)]
pub struct ApprovalQuery {
    pub status: Option<ApprovalStatus>,
}

/// GET /api/v1/approvals
pub async fn list_approvals(
    State(state): State<AppState>,
    Query(query): Query<ApprovalQuery>,
) -> ApiResult<Json<Vec<InvoiceApprovalRequest>>> {
    Ok(Json(state.approvals.list(query.status).await?))
}

/// GET /api/v1/approvals/:id
pub async fn get_approval(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<ApprovalView>> {
    Ok(Json(state.approvals.get(id).await?))
}

/// POST /api/v1/approvals/:id/decision
pub async fn decide_approval(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(decision): Json<DecisionRequest>,
) -> ApiResult<Json<ApprovalView>> {
    Ok(Json(state.approvals.decide(id, decision).await?))
}

/// POST /api/v1/approvals/sweep
pub async fn run_sweep(State(state): State<AppState>) -> ApiResult<Json<SweepReport>> {
    Ok(Json(state.approvals.sweep(Utc::now()).await?))
}
