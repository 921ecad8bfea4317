//! Entity Normalizer
//!
//! Turns an extraction into durable records. Every entity is matched before
//! it is created, and every write is an upsert keyed by the entity's
//! extracted identifier, so normalizing the same payload twice converges on
//! the same records. A re-extracted document also carries the entity its
//! earlier run produced, which is updated when the new key finds nothing.

mod contracts;
mod invoices;
pub mod parties;

pub use parties::{resolve_location, PartyResolver};

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use covenant_database::{Cache, RecordStore};
use covenant_models::{ExtractedDocument, ExtractionResult};
use covenant_utils::CovenantResult;

/// The record a document normalized into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "entity", content = "id", rename_all = "snake_case")]
pub enum NormalizedEntity {
    Contract(Uuid),
    Invoice(Uuid),
}

#[derive(Clone)]
pub struct EntityNormalizer {
    store: Arc<dyn RecordStore>,
    parties: PartyResolver,
}

impl EntityNormalizer {
    pub fn new(store: Arc<dyn RecordStore>, cache: Arc<dyn Cache>) -> Self {
        Self {
            parties: PartyResolver::new(store.clone(), cache),
            store,
        }
    }

    pub async fn normalize(
        &self,
        extraction: &ExtractionResult,
        document_id: Uuid,
        prior_entity_id: Option<Uuid>,
    ) -> CovenantResult<NormalizedEntity> {
        match &extraction.data {
            ExtractedDocument::Contract(data) => self
                .normalize_contract(data, Some(document_id), prior_entity_id)
                .await
                .map(NormalizedEntity::Contract),
            ExtractedDocument::Invoice(data) => self
                .normalize_invoice(data, Some(document_id), prior_entity_id)
                .await
                .map(NormalizedEntity::Invoice),
        }
    }
}
