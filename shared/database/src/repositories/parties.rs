//! Party and Location Repository

use sqlx::PgPool;
use uuid::Uuid;

use covenant_models::{Location, Party};
use covenant_utils::CovenantResult;

use super::{decode_all, ensure_updated, PayloadRow};
use crate::store::PartyFilter;

#[derive(Clone)]
pub struct PartyRepository {
    pool: PgPool,
}

impl PartyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> CovenantResult<Option<Party>> {
        let row: Option<PayloadRow> = sqlx::query_as("SELECT payload FROM parties WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(PayloadRow::decode).transpose()
    }

    pub async fn find(&self, filter: &PartyFilter) -> CovenantResult<Vec<Party>> {
        let (sql, value) = match filter {
            PartyFilter::Name(name) => (
                r#"
                SELECT payload FROM parties
                WHERE position(lower($1) in lower(legal_name)) > 0
                   OR position(lower(legal_name) in lower($1)) > 0
                   OR (trading_name IS NOT NULL AND (
                        position(lower($1) in lower(trading_name)) > 0
                     OR position(lower(trading_name) in lower($1)) > 0))
                ORDER BY created_at
                "#,
                name.trim(),
            ),
            PartyFilter::TaxId(tax_id) => (
                "SELECT payload FROM parties WHERE lower(tax_id) = lower($1) ORDER BY created_at",
                tax_id.trim(),
            ),
            PartyFilter::Duns(duns) => (
                "SELECT payload FROM parties WHERE lower(duns_number) = lower($1) ORDER BY created_at",
                duns.trim(),
            ),
            PartyFilter::Npi(npi) => (
                "SELECT payload FROM parties WHERE lower(npi) = lower($1) ORDER BY created_at",
                npi.trim(),
            ),
        };

        if value.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<PayloadRow> = sqlx::query_as(sql)
            .bind(value)
            .fetch_all(&self.pool)
            .await?;
        decode_all(rows)
    }

    pub async fn insert(&self, party: &Party) -> CovenantResult<()> {
        sqlx::query(
            r#"
            INSERT INTO parties
                (id, legal_name, trading_name, tax_id, duns_number, npi, payload, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(party.id)
        .bind(&party.legal_name)
        .bind(&party.trading_name)
        .bind(&party.tax_id)
        .bind(&party.duns_number)
        .bind(&party.npi)
        .bind(serde_json::to_value(party)?)
        .bind(party.created_at)
        .bind(party.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update(&self, party: &Party) -> CovenantResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE parties
            SET legal_name = $2, trading_name = $3, tax_id = $4, duns_number = $5, npi = $6,
                payload = $7, updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(party.id)
        .bind(&party.legal_name)
        .bind(&party.trading_name)
        .bind(&party.tax_id)
        .bind(&party.duns_number)
        .bind(&party.npi)
        .bind(serde_json::to_value(party)?)
        .bind(party.updated_at)
        .execute(&self.pool)
        .await?;
        ensure_updated(result.rows_affected(), "party", party.id)
    }

    pub async fn find_location_by_id(&self, id: Uuid) -> CovenantResult<Option<Location>> {
        let row: Option<PayloadRow> = sqlx::query_as("SELECT payload FROM locations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(PayloadRow::decode).transpose()
    }

    pub async fn find_locations(&self, name: &str, postal_code: Option<&str>) -> CovenantResult<Vec<Location>> {
        let rows: Vec<PayloadRow> = sqlx::query_as(
            r#"
            SELECT payload FROM locations
            WHERE lower(trim(name)) = lower(trim($1))
               OR ($2::TEXT IS NOT NULL AND postal_code = trim($2))
            ORDER BY created_at
            "#,
        )
        .bind(name)
        .bind(postal_code)
        .fetch_all(&self.pool)
        .await?;
        decode_all(rows)
    }

    pub async fn insert_location(&self, location: &Location) -> CovenantResult<()> {
        sqlx::query(
            "INSERT INTO locations (id, name, postal_code, payload, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(location.id)
        .bind(&location.name)
        .bind(&location.postal_code)
        .bind(serde_json::to_value(location)?)
        .bind(location.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
