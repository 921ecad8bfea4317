use axum::{
    routing::{get, post},
    Router,
};

use crate::{app::AppState, handlers::*};

pub fn create_api_routes() -> Router<AppState> {
    Router::new()
        .nest("/documents", document_routes())
        .nest("/invoices", invoice_routes())
        .nest("/approvals", approval_routes())
}

fn document_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(upload_document))
        .route("/:id/status", get(document_status))
        .route("/:id/resubmit", post(resubmit_document))
        .route("/:id/reextract", post(reextract_document))
}

fn invoice_routes() -> Router<AppState> {
    Router::new().route("/:id/validate", post(revalidate_invoice))
}

fn approval_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_approvals))
        .route("/sweep", post(run_sweep))
        .route("/:id", get(get_approval))
        .route("/:id/decision", post(decide_approval))
}
