//! Contract Repository
//!
//! Contracts plus everything hanging off them: party and location edges,
//! billable items and pricing models.

use sqlx::PgPool;
use uuid::Uuid;

use covenant_models::{BillableItem, Contract, ContractLocation, ContractParty, PricingModel};
use covenant_utils::{CovenantError, CovenantResult};

use super::{decode_all, ensure_updated, label, PayloadRow};

#[derive(Clone)]
pub struct ContractRepository {
    pool: PgPool,
}

fn conflict_on_unique(error: sqlx::Error, what: &str) -> CovenantError {
    match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            CovenantError::conflict(format!("{} already exists", what))
        }
        _ => CovenantError::from(error),
    }
}

impl ContractRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> CovenantResult<Option<Contract>> {
        let row: Option<PayloadRow> = sqlx::query_as("SELECT payload FROM contracts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(PayloadRow::decode).transpose()
    }

    pub async fn find_by_number(&self, contract_number: &str) -> CovenantResult<Option<Contract>> {
        let row: Option<PayloadRow> = sqlx::query_as(
            "SELECT payload FROM contracts WHERE lower(contract_number) = lower(trim($1)) ORDER BY created_at LIMIT 1",
        )
        .bind(contract_number)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PayloadRow::decode).transpose()
    }

    pub async fn find_for_party(&self, party_id: Uuid) -> CovenantResult<Vec<Contract>> {
        let rows: Vec<PayloadRow> = sqlx::query_as(
            r#"
            SELECT DISTINCT c.payload, c.effective_date
            FROM contracts c
            JOIN contract_parties cp ON cp.contract_id = c.id
            WHERE cp.party_id = $1
            ORDER BY c.effective_date
            "#,
        )
        .bind(party_id)
        .fetch_all(&self.pool)
        .await?;
        decode_all(rows)
    }

    pub async fn insert(&self, contract: &Contract) -> CovenantResult<()> {
        sqlx::query(
            r#"
            INSERT INTO contracts (id, contract_number, effective_date, expiration_date, payload, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(contract.id)
        .bind(&contract.contract_number)
        .bind(contract.effective_date)
        .bind(contract.expiration_date)
        .bind(serde_json::to_value(contract)?)
        .bind(contract.created_at)
        .bind(contract.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update(&self, contract: &Contract) -> CovenantResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE contracts
            SET contract_number = $2, effective_date = $3, expiration_date = $4, payload = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(contract.id)
        .bind(&contract.contract_number)
        .bind(contract.effective_date)
        .bind(contract.expiration_date)
        .bind(serde_json::to_value(contract)?)
        .bind(contract.updated_at)
        .execute(&self.pool)
        .await?;
        ensure_updated(result.rows_affected(), "contract", contract.id)
    }

    pub async fn list_parties(&self, contract_id: Uuid) -> CovenantResult<Vec<ContractParty>> {
        let rows: Vec<PayloadRow> = sqlx::query_as(
            "SELECT payload FROM contract_parties WHERE contract_id = $1 ORDER BY created_at",
        )
        .bind(contract_id)
        .fetch_all(&self.pool)
        .await?;
        decode_all(rows)
    }

    pub async fn insert_party(&self, edge: &ContractParty) -> CovenantResult<()> {
        sqlx::query(
            r#"
            INSERT INTO contract_parties (id, contract_id, party_id, role, payload, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(edge.id)
        .bind(edge.contract_id)
        .bind(edge.party_id)
        .bind(label(&edge.role)?)
        .bind(serde_json::to_value(edge)?)
        .bind(edge.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "contract party edge"))?;
        Ok(())
    }

    pub async fn list_locations(&self, contract_id: Uuid) -> CovenantResult<Vec<ContractLocation>> {
        let rows: Vec<PayloadRow> = sqlx::query_as(
            "SELECT payload FROM contract_locations WHERE contract_id = $1 ORDER BY created_at",
        )
        .bind(contract_id)
        .fetch_all(&self.pool)
        .await?;
        decode_all(rows)
    }

    pub async fn insert_location(&self, edge: &ContractLocation) -> CovenantResult<()> {
        sqlx::query(
            r#"
            INSERT INTO contract_locations (id, contract_id, location_id, payload, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(edge.id)
        .bind(edge.contract_id)
        .bind(edge.location_id)
        .bind(serde_json::to_value(edge)?)
        .bind(edge.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "contract location edge"))?;
        Ok(())
    }

    pub async fn list_billable_items(&self, contract_id: Uuid) -> CovenantResult<Vec<BillableItem>> {
        let rows: Vec<PayloadRow> = sqlx::query_as(
            "SELECT payload FROM billable_items WHERE contract_id = $1 ORDER BY created_at",
        )
        .bind(contract_id)
        .fetch_all(&self.pool)
        .await?;
        decode_all(rows)
    }

    pub async fn insert_billable_item(&self, item: &BillableItem) -> CovenantResult<()> {
        sqlx::query(
            r#"
            INSERT INTO billable_items (id, contract_id, item_code, payload, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(item.id)
        .bind(item.contract_id)
        .bind(&item.item_code)
        .bind(serde_json::to_value(item)?)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_billable_item(&self, item: &BillableItem) -> CovenantResult<()> {
        let result = sqlx::query(
            "UPDATE billable_items SET item_code = $2, payload = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(item.id)
        .bind(&item.item_code)
        .bind(serde_json::to_value(item)?)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await?;
        ensure_updated(result.rows_affected(), "billable item", item.id)
    }

    pub async fn list_pricing_models(&self, contract_id: Uuid) -> CovenantResult<Vec<PricingModel>> {
        let rows: Vec<PayloadRow> = sqlx::query_as(
            "SELECT payload FROM pricing_models WHERE contract_id = $1 ORDER BY created_at",
        )
        .bind(contract_id)
        .fetch_all(&self.pool)
        .await?;
        decode_all(rows)
    }

    pub async fn insert_pricing_model(&self, model: &PricingModel) -> CovenantResult<()> {
        sqlx::query(
            r#"
            INSERT INTO pricing_models (id, contract_id, billable_item_id, payload, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(model.id)
        .bind(model.contract_id)
        .bind(model.billable_item_id)
        .bind(serde_json::to_value(model)?)
        .bind(model.created_at)
        .bind(model.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_pricing_model(&self, model: &PricingModel) -> CovenantResult<()> {
        let result = sqlx::query(
            "UPDATE pricing_models SET billable_item_id = $2, payload = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(model.id)
        .bind(model.billable_item_id)
        .bind(serde_json::to_value(model)?)
        .bind(model.updated_at)
        .execute(&self.pool)
        .await?;
        ensure_updated(result.rows_affected(), "pricing model", model.id)
    }
}
