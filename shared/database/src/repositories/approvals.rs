//! Approval Repository
//!
//! Levels, requests and the append-only history log.

use sqlx::PgPool;
use uuid::Uuid;

use covenant_models::{ApprovalHistory, ApprovalLevel, ApprovalStatus, InvoiceApprovalRequest};
use covenant_utils::{CovenantError, CovenantResult};

use super::{decode_all, ensure_updated, label, PayloadRow};

#[derive(Clone)]
pub struct ApprovalRepository {
    pool: PgPool,
}

impl ApprovalRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list_levels(&self) -> CovenantResult<Vec<ApprovalLevel>> {
        let rows: Vec<PayloadRow> = sqlx::query_as("SELECT payload FROM approval_levels ORDER BY sequence")
            .fetch_all(&self.pool)
            .await?;
        decode_all(rows)
    }

    pub async fn insert_level(&self, level: &ApprovalLevel) -> CovenantResult<()> {
        sqlx::query("INSERT INTO approval_levels (id, sequence, payload) VALUES ($1, $2, $3)")
            .bind(level.id)
            .bind(level.sequence as i32)
            .bind(serde_json::to_value(level)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn find_by_id(&self, id: Uuid) -> CovenantResult<Option<InvoiceApprovalRequest>> {
        let row: Option<PayloadRow> =
            sqlx::query_as("SELECT payload FROM invoice_approval_requests WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(PayloadRow::decode).transpose()
    }

    pub async fn find_for_validation(
        &self,
        invoice_id: Uuid,
        validation_id: Uuid,
    ) -> CovenantResult<Option<InvoiceApprovalRequest>> {
        let row: Option<PayloadRow> = sqlx::query_as(
            "SELECT payload FROM invoice_approval_requests WHERE invoice_id = $1 AND validation_id = $2",
        )
        .bind(invoice_id)
        .bind(validation_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PayloadRow::decode).transpose()
    }

    pub async fn list(&self, status: Option<ApprovalStatus>) -> CovenantResult<Vec<InvoiceApprovalRequest>> {
        let status = status.map(|s| label(&s)).transpose()?;
        let rows: Vec<PayloadRow> = sqlx::query_as(
            r#"
            SELECT payload FROM invoice_approval_requests
            WHERE $1::TEXT IS NULL OR status = $1
            ORDER BY created_at
            "#,
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await?;
        decode_all(rows)
    }

    pub async fn insert(&self, request: &InvoiceApprovalRequest) -> CovenantResult<()> {
        sqlx::query(
            r#"
            INSERT INTO invoice_approval_requests
                (id, invoice_id, validation_id, status, required_by, payload, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(request.id)
        .bind(request.invoice_id)
        .bind(request.validation_id)
        .bind(label(&request.status)?)
        .bind(request.required_by)
        .bind(serde_json::to_value(request)?)
        .bind(request.created_at)
        .bind(request.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => CovenantError::conflict(format!(
                "approval request for invoice {} / validation {} already exists",
                request.invoice_id, request.validation_id
            )),
            _ => CovenantError::from(e),
        })?;
        Ok(())
    }

    pub async fn update(&self, request: &InvoiceApprovalRequest) -> CovenantResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE invoice_approval_requests
            SET status = $2, required_by = $3, payload = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(request.id)
        .bind(label(&request.status)?)
        .bind(request.required_by)
        .bind(serde_json::to_value(request)?)
        .bind(request.updated_at)
        .execute(&self.pool)
        .await?;
        ensure_updated(result.rows_affected(), "approval request", request.id)
    }

    pub async fn append_history(&self, entry: &ApprovalHistory) -> CovenantResult<()> {
        sqlx::query(
            "INSERT INTO approval_history (id, request_id, payload, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(entry.id)
        .bind(entry.request_id)
        .bind(serde_json::to_value(entry)?)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_history(&self, request_id: Uuid) -> CovenantResult<Vec<ApprovalHistory>> {
        let rows: Vec<PayloadRow> = sqlx::query_as(
            "SELECT payload FROM approval_history WHERE request_id = $1 ORDER BY seq",
        )
        .bind(request_id)
        .fetch_all(&self.pool)
        .await?;
        decode_all(rows)
    }
}
