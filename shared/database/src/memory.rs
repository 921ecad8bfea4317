//! In-process record store backed by hash maps behind one `RwLock`.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use covenant_models::{
    ApprovalHistory, ApprovalLevel, ApprovalStatus, BillableItem, Contract, ContractLocation,
    ContractParty, Document, Invoice, InvoiceApprovalRequest, InvoiceLineItem, InvoiceValidation,
    Location, Party, PricingModel, ValidationException,
};
use covenant_utils::{CovenantError, CovenantResult};

use crate::store::{PartyFilter, RecordStore};

#[derive(Default)]
struct Tables {
    documents: HashMap<Uuid, Document>,
    parties: HashMap<Uuid, Party>,
    locations: HashMap<Uuid, Location>,
    contracts: HashMap<Uuid, Contract>,
    contract_parties: Vec<ContractParty>,
    contract_locations: Vec<ContractLocation>,
    billable_items: HashMap<Uuid, BillableItem>,
    pricing_models: HashMap<Uuid, PricingModel>,
    invoices: HashMap<Uuid, Invoice>,
    line_items: HashMap<Uuid, Vec<InvoiceLineItem>>,
    validations: HashMap<Uuid, InvoiceValidation>,
    exceptions: HashMap<Uuid, ValidationException>,
    approval_levels: HashMap<Uuid, ApprovalLevel>,
    approval_requests: HashMap<Uuid, InvoiceApprovalRequest>,
    approval_history: Vec<ApprovalHistory>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn insert_unique<T: Clone>(map: &mut HashMap<Uuid, T>, id: Uuid, value: &T, kind: &str) -> CovenantResult<()> {
    if map.contains_key(&id) {
        return Err(CovenantError::conflict(format!("{} {} already exists", kind, id)));
    }
    map.insert(id, value.clone());
    Ok(())
}

fn replace_existing<T: Clone>(map: &mut HashMap<Uuid, T>, id: Uuid, value: &T, kind: &str) -> CovenantResult<()> {
    match map.get_mut(&id) {
        Some(slot) => {
            *slot = value.clone();
            Ok(())
        }
        None => Err(CovenantError::not_found(format!("{} {}", kind, id))),
    }
}

fn same_identifier(value: &Option<String>, needle: &str) -> bool {
    value
        .as_deref()
        .map(|v| v.trim().eq_ignore_ascii_case(needle.trim()))
        .unwrap_or(false)
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert_document(&self, document: &Document) -> CovenantResult<()> {
        let mut tables = self.tables.write().await;
        insert_unique(&mut tables.documents, document.id, document, "document")
    }

    async fn update_document(&self, document: &Document) -> CovenantResult<()> {
        let mut tables = self.tables.write().await;
        replace_existing(&mut tables.documents, document.id, document, "document")
    }

    async fn get_document(&self, id: Uuid) -> CovenantResult<Option<Document>> {
        Ok(self.tables.read().await.documents.get(&id).cloned())
    }

    async fn find_documents_by_hash(&self, content_hash: &str) -> CovenantResult<Vec<Document>> {
        let tables = self.tables.read().await;
        Ok(tables
            .documents
            .values()
            .filter(|d| d.content_hash == content_hash)
            .cloned()
            .collect())
    }

    async fn list_unfinished_documents(&self) -> CovenantResult<Vec<Document>> {
        let tables = self.tables.read().await;
        let mut documents: Vec<Document> = tables
            .documents
            .values()
            .filter(|d| !d.stage.is_terminal())
            .cloned()
            .collect();
        documents.sort_by_key(|d| d.created_at);
        Ok(documents)
    }

    async fn get_party(&self, id: Uuid) -> CovenantResult<Option<Party>> {
        Ok(self.tables.read().await.parties.get(&id).cloned())
    }

    async fn find_parties(&self, filter: &PartyFilter) -> CovenantResult<Vec<Party>> {
        let tables = self.tables.read().await;
        let mut parties: Vec<Party> = tables
            .parties
            .values()
            .filter(|party| match filter {
                PartyFilter::Name(name) => party.name_matches(name),
                PartyFilter::TaxId(tax_id) => same_identifier(&party.tax_id, tax_id),
                PartyFilter::Duns(duns) => same_identifier(&party.duns_number, duns),
                PartyFilter::Npi(npi) => same_identifier(&party.npi, npi),
            })
            .cloned()
            .collect();
        parties.sort_by_key(|p| p.created_at);
        Ok(parties)
    }

    async fn insert_party(&self, party: &Party) -> CovenantResult<()> {
        let mut tables = self.tables.write().await;
        insert_unique(&mut tables.parties, party.id, party, "party")
    }

    async fn update_party(&self, party: &Party) -> CovenantResult<()> {
        let mut tables = self.tables.write().await;
        replace_existing(&mut tables.parties, party.id, party, "party")
    }

    async fn get_location(&self, id: Uuid) -> CovenantResult<Option<Location>> {
        Ok(self.tables.read().await.locations.get(&id).cloned())
    }

    async fn find_locations(&self, name: &str, postal_code: Option<&str>) -> CovenantResult<Vec<Location>> {
        let tables = self.tables.read().await;
        let name = name.trim();
        Ok(tables
            .locations
            .values()
            .filter(|location| {
                location.name.trim().eq_ignore_ascii_case(name)
                    || match (postal_code, location.postal_code.as_deref()) {
                        (Some(wanted), Some(actual)) => wanted.trim() == actual.trim(),
                        _ => false,
                    }
            })
            .cloned()
            .collect())
    }

    async fn insert_location(&self, location: &Location) -> CovenantResult<()> {
        let mut tables = self.tables.write().await;
        insert_unique(&mut tables.locations, location.id, location, "location")
    }

    async fn get_contract(&self, id: Uuid) -> CovenantResult<Option<Contract>> {
        Ok(self.tables.read().await.contracts.get(&id).cloned())
    }

    async fn find_contract_by_number(&self, contract_number: &str) -> CovenantResult<Option<Contract>> {
        let tables = self.tables.read().await;
        Ok(tables
            .contracts
            .values()
            .find(|c| c.contract_number.eq_ignore_ascii_case(contract_number.trim()))
            .cloned())
    }

    async fn find_contracts_for_party(&self, party_id: Uuid) -> CovenantResult<Vec<Contract>> {
        let tables = self.tables.read().await;
        let mut contracts: Vec<Contract> = tables
            .contract_parties
            .iter()
            .filter(|edge| edge.party_id == party_id)
            .filter_map(|edge| tables.contracts.get(&edge.contract_id))
            .cloned()
            .collect();
        contracts.sort_by_key(|c| c.id);
        contracts.dedup_by_key(|c| c.id);
        Ok(contracts)
    }

    async fn insert_contract(&self, contract: &Contract) -> CovenantResult<()> {
        let mut tables = self.tables.write().await;
        insert_unique(&mut tables.contracts, contract.id, contract, "contract")
    }

    async fn update_contract(&self, contract: &Contract) -> CovenantResult<()> {
        let mut tables = self.tables.write().await;
        replace_existing(&mut tables.contracts, contract.id, contract, "contract")
    }

    async fn list_contract_parties(&self, contract_id: Uuid) -> CovenantResult<Vec<ContractParty>> {
        let tables = self.tables.read().await;
        Ok(tables
            .contract_parties
            .iter()
            .filter(|edge| edge.contract_id == contract_id)
            .cloned()
            .collect())
    }

    async fn insert_contract_party(&self, edge: &ContractParty) -> CovenantResult<()> {
        let mut tables = self.tables.write().await;
        let duplicate = tables.contract_parties.iter().any(|e| {
            e.contract_id == edge.contract_id && e.party_id == edge.party_id && e.role == edge.role
        });
        if duplicate {
            return Err(CovenantError::conflict("contract party edge already exists"));
        }
        tables.contract_parties.push(edge.clone());
        Ok(())
    }

    async fn list_contract_locations(&self, contract_id: Uuid) -> CovenantResult<Vec<ContractLocation>> {
        let tables = self.tables.read().await;
        Ok(tables
            .contract_locations
            .iter()
            .filter(|edge| edge.contract_id == contract_id)
            .cloned()
            .collect())
    }

    async fn insert_contract_location(&self, edge: &ContractLocation) -> CovenantResult<()> {
        let mut tables = self.tables.write().await;
        let duplicate = tables
            .contract_locations
            .iter()
            .any(|e| e.contract_id == edge.contract_id && e.location_id == edge.location_id);
        if duplicate {
            return Err(CovenantError::conflict("contract location edge already exists"));
        }
        tables.contract_locations.push(edge.clone());
        Ok(())
    }

    async fn list_billable_items(&self, contract_id: Uuid) -> CovenantResult<Vec<BillableItem>> {
        let tables = self.tables.read().await;
        let mut items: Vec<BillableItem> = tables
            .billable_items
            .values()
            .filter(|item| item.contract_id == contract_id)
            .cloned()
            .collect();
        items.sort_by_key(|item| item.created_at);
        Ok(items)
    }

    async fn insert_billable_item(&self, item: &BillableItem) -> CovenantResult<()> {
        let mut tables = self.tables.write().await;
        insert_unique(&mut tables.billable_items, item.id, item, "billable item")
    }

    async fn update_billable_item(&self, item: &BillableItem) -> CovenantResult<()> {
        let mut tables = self.tables.write().await;
        replace_existing(&mut tables.billable_items, item.id, item, "billable item")
    }

    async fn list_pricing_models(&self, contract_id: Uuid) -> CovenantResult<Vec<PricingModel>> {
        let tables = self.tables.read().await;
        Ok(tables
            .pricing_models
            .values()
            .filter(|model| model.contract_id == contract_id)
            .cloned()
            .collect())
    }

    async fn insert_pricing_model(&self, model: &PricingModel) -> CovenantResult<()> {
        let mut tables = self.tables.write().await;
        insert_unique(&mut tables.pricing_models, model.id, model, "pricing model")
    }

    async fn update_pricing_model(&self, model: &PricingModel) -> CovenantResult<()> {
        let mut tables = self.tables.write().await;
        replace_existing(&mut tables.pricing_models, model.id, model, "pricing model")
    }

    async fn get_invoice(&self, id: Uuid) -> CovenantResult<Option<Invoice>> {
        Ok(self.tables.read().await.invoices.get(&id).cloned())
    }

    async fn find_invoice_by_number(&self, invoice_number: &str) -> CovenantResult<Option<Invoice>> {
        let tables = self.tables.read().await;
        Ok(tables
            .invoices
            .values()
            .find(|i| i.invoice_number.eq_ignore_ascii_case(invoice_number.trim()))
            .cloned())
    }

    async fn insert_invoice(&self, invoice: &Invoice) -> CovenantResult<()> {
        let mut tables = self.tables.write().await;
        insert_unique(&mut tables.invoices, invoice.id, invoice, "invoice")
    }

    async fn update_invoice(&self, invoice: &Invoice) -> CovenantResult<()> {
        let mut tables = self.tables.write().await;
        replace_existing(&mut tables.invoices, invoice.id, invoice, "invoice")
    }

    async fn list_line_items(&self, invoice_id: Uuid) -> CovenantResult<Vec<InvoiceLineItem>> {
        let tables = self.tables.read().await;
        let mut items = tables.line_items.get(&invoice_id).cloned().unwrap_or_default();
        items.sort_by_key(|item| item.line_number);
        Ok(items)
    }

    async fn replace_line_items(&self, invoice_id: Uuid, items: &[InvoiceLineItem]) -> CovenantResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.invoices.contains_key(&invoice_id) {
            return Err(CovenantError::not_found(format!("invoice {}", invoice_id)));
        }
        tables.line_items.insert(invoice_id, items.to_vec());
        Ok(())
    }

    async fn insert_validation(
        &self,
        validation: &InvoiceValidation,
        exceptions: &[ValidationException],
    ) -> CovenantResult<()> {
        let mut tables = self.tables.write().await;
        if tables.validations.contains_key(&validation.id) {
            return Err(CovenantError::conflict(format!("validation {} already exists", validation.id)));
        }
        if let Some(stray) = exceptions.iter().find(|e| e.validation_id != validation.id) {
            return Err(CovenantError::validation(
                "validation_id",
                format!("exception {} belongs to another validation", stray.id),
            ));
        }

        tables.validations.insert(validation.id, validation.clone());
        for exception in exceptions {
            tables.exceptions.insert(exception.id, exception.clone());
        }
        Ok(())
    }

    async fn get_validation(&self, id: Uuid) -> CovenantResult<Option<InvoiceValidation>> {
        Ok(self.tables.read().await.validations.get(&id).cloned())
    }

    async fn list_validations(&self, invoice_id: Uuid) -> CovenantResult<Vec<InvoiceValidation>> {
        let tables = self.tables.read().await;
        let mut validations: Vec<InvoiceValidation> = tables
            .validations
            .values()
            .filter(|v| v.invoice_id == invoice_id)
            .cloned()
            .collect();
        validations.sort_by_key(|v| v.validated_at);
        Ok(validations)
    }

    async fn list_exceptions(&self, validation_id: Uuid) -> CovenantResult<Vec<ValidationException>> {
        let tables = self.tables.read().await;
        let mut exceptions: Vec<ValidationException> = tables
            .exceptions
            .values()
            .filter(|e| e.validation_id == validation_id)
            .cloned()
            .collect();
        exceptions.sort_by_key(|e| e.created_at);
        Ok(exceptions)
    }

    async fn update_exception(&self, exception: &ValidationException) -> CovenantResult<()> {
        let mut tables = self.tables.write().await;
        replace_existing(&mut tables.exceptions, exception.id, exception, "exception")
    }

    async fn list_approval_levels(&self) -> CovenantResult<Vec<ApprovalLevel>> {
        let tables = self.tables.read().await;
        let mut levels: Vec<ApprovalLevel> = tables.approval_levels.values().cloned().collect();
        levels.sort_by_key(|level| level.sequence);
        Ok(levels)
    }

    async fn insert_approval_level(&self, level: &ApprovalLevel) -> CovenantResult<()> {
        let mut tables = self.tables.write().await;
        insert_unique(&mut tables.approval_levels, level.id, level, "approval level")
    }

    async fn get_approval_request(&self, id: Uuid) -> CovenantResult<Option<InvoiceApprovalRequest>> {
        Ok(self.tables.read().await.approval_requests.get(&id).cloned())
    }

    async fn find_approval_request(
        &self,
        invoice_id: Uuid,
        validation_id: Uuid,
    ) -> CovenantResult<Option<InvoiceApprovalRequest>> {
        let tables = self.tables.read().await;
        Ok(tables
            .approval_requests
            .values()
            .find(|r| r.invoice_id == invoice_id && r.validation_id == validation_id)
            .cloned())
    }

    async fn list_approval_requests(
        &self,
        status: Option<ApprovalStatus>,
    ) -> CovenantResult<Vec<InvoiceApprovalRequest>> {
        let tables = self.tables.read().await;
        let mut requests: Vec<InvoiceApprovalRequest> = tables
            .approval_requests
            .values()
            .filter(|r| status.map(|s| r.status == s).unwrap_or(true))
            .cloned()
            .collect();
        requests.sort_by_key(|r| r.created_at);
        Ok(requests)
    }

    async fn insert_approval_request(&self, request: &InvoiceApprovalRequest) -> CovenantResult<()> {
        let mut tables = self.tables.write().await;
        let duplicate = tables
            .approval_requests
            .values()
            .any(|r| r.invoice_id == request.invoice_id && r.validation_id == request.validation_id);
        if duplicate {
            return Err(CovenantError::conflict(format!(
                "approval request for invoice {} / validation {} already exists",
                request.invoice_id, request.validation_id
            )));
        }
        insert_unique(&mut tables.approval_requests, request.id, request, "approval request")
    }

    async fn update_approval_request(&self, request: &InvoiceApprovalRequest) -> CovenantResult<()> {
        let mut tables = self.tables.write().await;
        replace_existing(&mut tables.approval_requests, request.id, request, "approval request")
    }

    async fn append_approval_history(&self, entry: &ApprovalHistory) -> CovenantResult<()> {
        self.tables.write().await.approval_history.push(entry.clone());
        Ok(())
    }

    async fn list_approval_history(&self, request_id: Uuid) -> CovenantResult<Vec<ApprovalHistory>> {
        let tables = self.tables.read().await;
        Ok(tables
            .approval_history
            .iter()
            .filter(|h| h.request_id == request_id)
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> CovenantResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covenant_models::{ExceptionType, PartyType, Severity, ValidationStatus};
    use chrono::Utc;

    fn validation(invoice_id: Uuid) -> InvoiceValidation {
        InvoiceValidation {
            id: Uuid::new_v4(),
            invoice_id,
            contract_id: None,
            status: ValidationStatus::Failed,
            contract_matched: false,
            vendor_matched: false,
            all_lines_matched: false,
            expected_net_amount: 0.0,
            actual_net_amount: 0.0,
            variance_amount: 0.0,
            potential_savings: 0.0,
            rules_evaluated: 0,
            exception_count: 1,
            validated_by: None,
            validated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_find_parties_by_name_and_identifier() {
        let store = MemoryStore::new();
        let mut party = Party::new("Acme Medical Supply".to_string(), PartyType::Vendor);
        party.tax_id = Some("12-3456789".to_string());
        store.insert_party(&party).await.unwrap();

        let by_name = store.find_parties(&PartyFilter::Name("ACME medical".to_string())).await.unwrap();
        assert_eq!(by_name.len(), 1);

        let by_tax = store.find_parties(&PartyFilter::TaxId(" 12-3456789 ".to_string())).await.unwrap();
        assert_eq!(by_tax[0].id, party.id);

        let none = store.find_parties(&PartyFilter::Duns("000".to_string())).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_update_missing_record_is_not_found() {
        let store = MemoryStore::new();
        let party = Party::new("Ghost".to_string(), PartyType::Other);
        let err = store.update_party(&party).await.unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_validation_rejects_foreign_exceptions() {
        let store = MemoryStore::new();
        let invoice_id = Uuid::new_v4();
        let record = validation(invoice_id);
        let foreign = ValidationException::new(
            Uuid::new_v4(),
            invoice_id,
            ExceptionType::CurrencyMismatch,
            Severity::High,
            "currency",
        );

        assert!(store.insert_validation(&record, &[foreign]).await.is_err());
        assert!(store.get_validation(record.id).await.unwrap().is_none());

        let owned = ValidationException::new(
            record.id,
            invoice_id,
            ExceptionType::CurrencyMismatch,
            Severity::High,
            "currency",
        );
        store.insert_validation(&record, &[owned]).await.unwrap();
        assert_eq!(store.list_exceptions(record.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_contract_edges_rejected() {
        let store = MemoryStore::new();
        let edge = ContractParty::new(Uuid::new_v4(), Uuid::new_v4(), covenant_models::PartyRole::Vendor);
        store.insert_contract_party(&edge).await.unwrap();
        let again = ContractParty::new(edge.contract_id, edge.party_id, edge.role);
        assert!(store.insert_contract_party(&again).await.is_err());
        assert_eq!(store.list_contract_parties(edge.contract_id).await.unwrap().len(), 1);
    }
}
