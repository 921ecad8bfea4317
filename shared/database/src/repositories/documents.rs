//! Document Repository

use sqlx::PgPool;
use uuid::Uuid;

use covenant_models::{Document, DocumentStage};
use covenant_utils::CovenantResult;

use super::{decode_all, ensure_updated, label, PayloadRow};

#[derive(Clone)]
pub struct DocumentRepository {
    pool: PgPool,
}

impl DocumentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, document: &Document) -> CovenantResult<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, stage, content_hash, payload, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(document.id)
        .bind(label(&document.stage)?)
        .bind(&document.content_hash)
        .bind(serde_json::to_value(document)?)
        .bind(document.created_at)
        .bind(document.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update(&self, document: &Document) -> CovenantResult<()> {
        let result = sqlx::query(
            "UPDATE documents SET stage = $2, payload = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(document.id)
        .bind(label(&document.stage)?)
        .bind(serde_json::to_value(document)?)
        .bind(document.updated_at)
        .execute(&self.pool)
        .await?;
        ensure_updated(result.rows_affected(), "document", document.id)
    }

    pub async fn find_by_id(&self, id: Uuid) -> CovenantResult<Option<Document>> {
        let row: Option<PayloadRow> = sqlx::query_as("SELECT payload FROM documents WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(PayloadRow::decode).transpose()
    }

    pub async fn find_by_hash(&self, content_hash: &str) -> CovenantResult<Vec<Document>> {
        let rows: Vec<PayloadRow> = sqlx::query_as(
            "SELECT payload FROM documents WHERE content_hash = $1 ORDER BY created_at",
        )
        .bind(content_hash)
        .fetch_all(&self.pool)
        .await?;
        decode_all(rows)
    }

    pub async fn find_unfinished(&self) -> CovenantResult<Vec<Document>> {
        let terminal = vec![
            label(&DocumentStage::Completed)?,
            label(&DocumentStage::Error)?,
            label(&DocumentStage::ValidationError)?,
        ];
        let rows: Vec<PayloadRow> = sqlx::query_as(
            "SELECT payload FROM documents WHERE stage <> ALL($1) ORDER BY created_at",
        )
        .bind(terminal)
        .fetch_all(&self.pool)
        .await?;
        decode_all(rows)
    }
}
