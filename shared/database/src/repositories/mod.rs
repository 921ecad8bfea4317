//! Repository module for PostgreSQL CRUD operations
//!
//! Every table keeps the full record as a JSONB `payload` next to the columns
//! used for lookups. Repositories decode the payload back into the domain model.

pub mod approvals;
pub mod contracts;
pub mod documents;
pub mod invoices;
pub mod parties;
pub mod validations;

pub use approvals::ApprovalRepository;
pub use contracts::ContractRepository;
pub use documents::DocumentRepository;
pub use invoices::InvoiceRepository;
pub use parties::PartyRepository;
pub use validations::ValidationRepository;

use serde::{de::DeserializeOwned, Serialize};
use sqlx::FromRow;

use covenant_utils::{CovenantError, CovenantResult};

#[derive(Debug, FromRow)]
pub(crate) struct PayloadRow {
    pub payload: serde_json::Value,
}

impl PayloadRow {
    pub fn decode<T: DeserializeOwned>(self) -> CovenantResult<T> {
        serde_json::from_value(self.payload)
            .map_err(|e| CovenantError::database(format!("corrupt payload: {}", e)))
    }
}

pub(crate) fn decode_all<T: DeserializeOwned>(rows: Vec<PayloadRow>) -> CovenantResult<Vec<T>> {
    rows.into_iter().map(PayloadRow::decode).collect()
}

/// Serialized form of a unit enum, e.g. `Pending`.
pub(crate) fn label<T: Serialize>(value: &T) -> CovenantResult<String> {
    Ok(serde_json::to_string(value)?.trim_matches('"').to_string())
}

pub(crate) fn ensure_updated(rows_affected: u64, kind: &str, id: uuid::Uuid) -> CovenantResult<()> {
    if rows_affected == 0 {
        return Err(CovenantError::not_found(format!("{} {}", kind, id)));
    }
    Ok(())
}
