//! Validation Repository
//!
//! A validation and its exceptions are written in one transaction; the
//! validation row itself is never updated afterwards.

use sqlx::PgPool;
use uuid::Uuid;

use covenant_models::{InvoiceValidation, ValidationException};
use covenant_utils::{CovenantError, CovenantResult};

use super::{decode_all, ensure_updated, label, PayloadRow};

#[derive(Clone)]
pub struct ValidationRepository {
    pool: PgPool,
}

impl ValidationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(
        &self,
        validation: &InvoiceValidation,
        exceptions: &[ValidationException],
    ) -> CovenantResult<()> {
        if let Some(stray) = exceptions.iter().find(|e| e.validation_id != validation.id) {
            return Err(CovenantError::validation(
                "validation_id",
                format!("exception {} belongs to another validation", stray.id),
            ));
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO invoice_validations (id, invoice_id, status, payload, validated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(validation.id)
        .bind(validation.invoice_id)
        .bind(label(&validation.status)?)
        .bind(serde_json::to_value(validation)?)
        .bind(validation.validated_at)
        .execute(&mut *tx)
        .await?;

        for exception in exceptions {
            sqlx::query(
                r#"
                INSERT INTO validation_exceptions (id, validation_id, invoice_id, severity, resolved, payload, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(exception.id)
            .bind(exception.validation_id)
            .bind(exception.invoice_id)
            .bind(label(&exception.severity)?)
            .bind(exception.resolved)
            .bind(serde_json::to_value(exception)?)
            .bind(exception.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn find_by_id(&self, id: Uuid) -> CovenantResult<Option<InvoiceValidation>> {
        let row: Option<PayloadRow> = sqlx::query_as("SELECT payload FROM invoice_validations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(PayloadRow::decode).transpose()
    }

    pub async fn list_for_invoice(&self, invoice_id: Uuid) -> CovenantResult<Vec<InvoiceValidation>> {
        let rows: Vec<PayloadRow> = sqlx::query_as(
            "SELECT payload FROM invoice_validations WHERE invoice_id = $1 ORDER BY validated_at",
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await?;
        decode_all(rows)
    }

    pub async fn list_exceptions(&self, validation_id: Uuid) -> CovenantResult<Vec<ValidationException>> {
        let rows: Vec<PayloadRow> = sqlx::query_as(
            "SELECT payload FROM validation_exceptions WHERE validation_id = $1 ORDER BY created_at",
        )
        .bind(validation_id)
        .fetch_all(&self.pool)
        .await?;
        decode_all(rows)
    }

    /// Only the resolution state of an exception ever changes.
    pub async fn update_exception(&self, exception: &ValidationException) -> CovenantResult<()> {
        let result = sqlx::query(
            "UPDATE validation_exceptions SET resolved = $2, payload = $3 WHERE id = $1",
        )
        .bind(exception.id)
        .bind(exception.resolved)
        .bind(serde_json::to_value(exception)?)
        .execute(&self.pool)
        .await?;
        ensure_updated(result.rows_affected(), "exception", exception.id)
    }
}
