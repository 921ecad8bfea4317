//! Invoice Repository

use sqlx::PgPool;
use uuid::Uuid;

use covenant_models::{Invoice, InvoiceLineItem};
use covenant_utils::{CovenantError, CovenantResult};

use super::{decode_all, ensure_updated, label, PayloadRow};

#[derive(Clone)]
pub struct InvoiceRepository {
    pool: PgPool,
}

impl InvoiceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> CovenantResult<Option<Invoice>> {
        let row: Option<PayloadRow> = sqlx::query_as("SELECT payload FROM invoices WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(PayloadRow::decode).transpose()
    }

    pub async fn find_by_number(&self, invoice_number: &str) -> CovenantResult<Option<Invoice>> {
        let row: Option<PayloadRow> = sqlx::query_as(
            "SELECT payload FROM invoices WHERE lower(invoice_number) = lower(trim($1)) ORDER BY created_at LIMIT 1",
        )
        .bind(invoice_number)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PayloadRow::decode).transpose()
    }

    pub async fn insert(&self, invoice: &Invoice) -> CovenantResult<()> {
        sqlx::query(
            r#"
            INSERT INTO invoices (id, invoice_number, vendor_party_id, current_status, payload, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(invoice.id)
        .bind(&invoice.invoice_number)
        .bind(invoice.vendor_party_id)
        .bind(label(&invoice.current_status)?)
        .bind(serde_json::to_value(invoice)?)
        .bind(invoice.created_at)
        .bind(invoice.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update(&self, invoice: &Invoice) -> CovenantResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET invoice_number = $2, vendor_party_id = $3, current_status = $4, payload = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(invoice.id)
        .bind(&invoice.invoice_number)
        .bind(invoice.vendor_party_id)
        .bind(label(&invoice.current_status)?)
        .bind(serde_json::to_value(invoice)?)
        .bind(invoice.updated_at)
        .execute(&self.pool)
        .await?;
        ensure_updated(result.rows_affected(), "invoice", invoice.id)
    }

    pub async fn list_line_items(&self, invoice_id: Uuid) -> CovenantResult<Vec<InvoiceLineItem>> {
        let rows: Vec<PayloadRow> = sqlx::query_as(
            "SELECT payload FROM invoice_line_items WHERE invoice_id = $1 ORDER BY line_number",
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await?;
        decode_all(rows)
    }

    /// Delete and re-insert inside one transaction.
    pub async fn replace_line_items(&self, invoice_id: Uuid, items: &[InvoiceLineItem]) -> CovenantResult<()> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM invoices WHERE id = $1 FOR UPDATE")
            .bind(invoice_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(CovenantError::not_found(format!("invoice {}", invoice_id)));
        }

        sqlx::query("DELETE FROM invoice_line_items WHERE invoice_id = $1")
            .bind(invoice_id)
            .execute(&mut *tx)
            .await?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO invoice_line_items (id, invoice_id, line_number, billable_item_id, payload, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(item.id)
            .bind(invoice_id)
            .bind(item.line_number as i32)
            .bind(item.billable_item_id)
            .bind(serde_json::to_value(item)?)
            .bind(item.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
