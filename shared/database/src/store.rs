//! Abstract transactional record store.
//!
//! Every service talks to persistence through `Arc<dyn RecordStore>`. Each
//! method is atomic on its own; `insert_validation` additionally writes the
//! validation and all of its exceptions as one unit.

use async_trait::async_trait;
use uuid::Uuid;

use covenant_models::{
    ApprovalHistory, ApprovalLevel, ApprovalStatus, BillableItem, Contract, ContractLocation,
    ContractParty, Document, Invoice, InvoiceApprovalRequest, InvoiceLineItem, InvoiceValidation,
    Location, Party, PricingModel, ValidationException,
};
use covenant_utils::CovenantResult;

/// Predicates supported by `find_parties`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartyFilter {
    /// Case-insensitive substring match on legal or trading name, either direction.
    Name(String),
    TaxId(String),
    Duns(String),
    Npi(String),
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    // Documents
    async fn insert_document(&self, document: &Document) -> CovenantResult<()>;
    async fn update_document(&self, document: &Document) -> CovenantResult<()>;
    async fn get_document(&self, id: Uuid) -> CovenantResult<Option<Document>>;
    async fn find_documents_by_hash(&self, content_hash: &str) -> CovenantResult<Vec<Document>>;
    /// Documents not yet in a terminal stage, oldest first.
    async fn list_unfinished_documents(&self) -> CovenantResult<Vec<Document>>;

    // Parties and locations
    async fn get_party(&self, id: Uuid) -> CovenantResult<Option<Party>>;
    async fn find_parties(&self, filter: &PartyFilter) -> CovenantResult<Vec<Party>>;
    async fn insert_party(&self, party: &Party) -> CovenantResult<()>;
    async fn update_party(&self, party: &Party) -> CovenantResult<()>;

    async fn get_location(&self, id: Uuid) -> CovenantResult<Option<Location>>;
    /// Locations whose name matches case-insensitively or whose postal code is equal.
    async fn find_locations(&self, name: &str, postal_code: Option<&str>) -> CovenantResult<Vec<Location>>;
    async fn insert_location(&self, location: &Location) -> CovenantResult<()>;

    // Contracts
    async fn get_contract(&self, id: Uuid) -> CovenantResult<Option<Contract>>;
    async fn find_contract_by_number(&self, contract_number: &str) -> CovenantResult<Option<Contract>>;
    /// Contracts on which `party_id` appears in any role.
    async fn find_contracts_for_party(&self, party_id: Uuid) -> CovenantResult<Vec<Contract>>;
    async fn insert_contract(&self, contract: &Contract) -> CovenantResult<()>;
    async fn update_contract(&self, contract: &Contract) -> CovenantResult<()>;

    async fn list_contract_parties(&self, contract_id: Uuid) -> CovenantResult<Vec<ContractParty>>;
    async fn insert_contract_party(&self, edge: &ContractParty) -> CovenantResult<()>;
    async fn list_contract_locations(&self, contract_id: Uuid) -> CovenantResult<Vec<ContractLocation>>;
    async fn insert_contract_location(&self, edge: &ContractLocation) -> CovenantResult<()>;

    async fn list_billable_items(&self, contract_id: Uuid) -> CovenantResult<Vec<BillableItem>>;
    async fn insert_billable_item(&self, item: &BillableItem) -> CovenantResult<()>;
    async fn update_billable_item(&self, item: &BillableItem) -> CovenantResult<()>;

    async fn list_pricing_models(&self, contract_id: Uuid) -> CovenantResult<Vec<PricingModel>>;
    async fn insert_pricing_model(&self, model: &PricingModel) -> CovenantResult<()>;
    async fn update_pricing_model(&self, model: &PricingModel) -> CovenantResult<()>;

    // Invoices
    async fn get_invoice(&self, id: Uuid) -> CovenantResult<Option<Invoice>>;
    async fn find_invoice_by_number(&self, invoice_number: &str) -> CovenantResult<Option<Invoice>>;
    async fn insert_invoice(&self, invoice: &Invoice) -> CovenantResult<()>;
    async fn update_invoice(&self, invoice: &Invoice) -> CovenantResult<()>;

    async fn list_line_items(&self, invoice_id: Uuid) -> CovenantResult<Vec<InvoiceLineItem>>;
    /// Replace every line of `invoice_id` with `items`.
    async fn replace_line_items(&self, invoice_id: Uuid, items: &[InvoiceLineItem]) -> CovenantResult<()>;

    // Validations
    async fn insert_validation(
        &self,
        validation: &InvoiceValidation,
        exceptions: &[ValidationException],
    ) -> CovenantResult<()>;
    async fn get_validation(&self, id: Uuid) -> CovenantResult<Option<InvoiceValidation>>;
    async fn list_validations(&self, invoice_id: Uuid) -> CovenantResult<Vec<InvoiceValidation>>;
    async fn list_exceptions(&self, validation_id: Uuid) -> CovenantResult<Vec<ValidationException>>;
    async fn update_exception(&self, exception: &ValidationException) -> CovenantResult<()>;

    // Approvals
    async fn list_approval_levels(&self) -> CovenantResult<Vec<ApprovalLevel>>;
    async fn insert_approval_level(&self, level: &ApprovalLevel) -> CovenantResult<()>;

    async fn get_approval_request(&self, id: Uuid) -> CovenantResult<Option<InvoiceApprovalRequest>>;
    async fn find_approval_request(
        &self,
        invoice_id: Uuid,
        validation_id: Uuid,
    ) -> CovenantResult<Option<InvoiceApprovalRequest>>;
    async fn list_approval_requests(
        &self,
        status: Option<ApprovalStatus>,
    ) -> CovenantResult<Vec<InvoiceApprovalRequest>>;
    async fn insert_approval_request(&self, request: &InvoiceApprovalRequest) -> CovenantResult<()>;
    async fn update_approval_request(&self, request: &InvoiceApprovalRequest) -> CovenantResult<()>;

    /// History is append-only; there is no update or delete.
    async fn append_approval_history(&self, entry: &ApprovalHistory) -> CovenantResult<()>;
    async fn list_approval_history(&self, request_id: Uuid) -> CovenantResult<Vec<ApprovalHistory>>;

    async fn health_check(&self) -> CovenantResult<()>;
}
