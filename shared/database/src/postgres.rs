use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use covenant_models::{
    ApprovalHistory, ApprovalLevel, ApprovalStatus, BillableItem, Contract, ContractLocation,
    ContractParty, Document, Invoice, InvoiceApprovalRequest, InvoiceLineItem, InvoiceValidation,
    Location, Party, PricingModel, ValidationException,
};
use covenant_utils::CovenantResult;

use crate::repositories::{
    ApprovalRepository, ContractRepository, DocumentRepository, InvoiceRepository, PartyRepository,
    ValidationRepository,
};
use crate::store::{PartyFilter, RecordStore};

pub type PostgresPool = Pool<Postgres>;

pub async fn create_postgres_pool(
    database_url: &str,
    max_connections: u32,
    acquire_timeout: Duration,
) -> Result<PostgresPool> {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(acquire_timeout)
        .connect(database_url)
        .await?;

    tracing::info!("Connected to PostgreSQL database");
    Ok(pool)
}

/// `RecordStore` over PostgreSQL, one repository per aggregate.
#[derive(Clone)]
pub struct PgStore {
    pool: PostgresPool,
    documents: DocumentRepository,
    parties: PartyRepository,
    contracts: ContractRepository,
    invoices: InvoiceRepository,
    validations: ValidationRepository,
    approvals: ApprovalRepository,
}

impl PgStore {
    pub fn new(pool: PostgresPool) -> Self {
        Self {
            documents: DocumentRepository::new(pool.clone()),
            parties: PartyRepository::new(pool.clone()),
            contracts: ContractRepository::new(pool.clone()),
            invoices: InvoiceRepository::new(pool.clone()),
            validations: ValidationRepository::new(pool.clone()),
            approvals: ApprovalRepository::new(pool.clone()),
            pool,
        }
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn insert_document(&self, document: &Document) -> CovenantResult<()> {
        self.documents.insert(document).await
    }

    async fn update_document(&self, document: &Document) -> CovenantResult<()> {
        self.documents.update(document).await
    }

    async fn get_document(&self, id: Uuid) -> CovenantResult<Option<Document>> {
        self.documents.find_by_id(id).await
    }

    async fn find_documents_by_hash(&self, content_hash: &str) -> CovenantResult<Vec<Document>> {
        self.documents.find_by_hash(content_hash).await
    }

    async fn list_unfinished_documents(&self) -> CovenantResult<Vec<Document>> {
        self.documents.find_unfinished().await
    }

    async fn get_party(&self, id: Uuid) -> CovenantResult<Option<Party>> {
        self.parties.find_by_id(id).await
    }

    async fn find_parties(&self, filter: &PartyFilter) -> CovenantResult<Vec<Party>> {
        self.parties.find(filter).await
    }

    async fn insert_party(&self, party: &Party) -> CovenantResult<()> {
        self.parties.insert(party).await
    }

    async fn update_party(&self, party: &Party) -> CovenantResult<()> {
        self.parties.update(party).await
    }

    async fn get_location(&self, id: Uuid) -> CovenantResult<Option<Location>> {
        self.parties.find_location_by_id(id).await
    }

    async fn find_locations(&self, name: &str, postal_code: Option<&str>) -> CovenantResult<Vec<Location>> {
        self.parties.find_locations(name, postal_code).await
    }

    async fn insert_location(&self, location: &Location) -> CovenantResult<()> {
        self.parties.insert_location(location).await
    }

    async fn get_contract(&self, id: Uuid) -> CovenantResult<Option<Contract>> {
        self.contracts.find_by_id(id).await
    }

    async fn find_contract_by_number(&self, contract_number: &str) -> CovenantResult<Option<Contract>> {
        self.contracts.find_by_number(contract_number).await
    }

    async fn find_contracts_for_party(&self, party_id: Uuid) -> CovenantResult<Vec<Contract>> {
        self.contracts.find_for_party(party_id).await
    }

    async fn insert_contract(&self, contract: &Contract) -> CovenantResult<()> {
        self.contracts.insert(contract).await
    }

    async fn update_contract(&self, contract: &Contract) -> CovenantResult<()> {
        self.contracts.update(contract).await
    }

    async fn list_contract_parties(&self, contract_id: Uuid) -> CovenantResult<Vec<ContractParty>> {
        self.contracts.list_parties(contract_id).await
    }

    async fn insert_contract_party(&self, edge: &ContractParty) -> CovenantResult<()> {
        self.contracts.insert_party(edge).await
    }

    async fn list_contract_locations(&self, contract_id: Uuid) -> CovenantResult<Vec<ContractLocation>> {
        self.contracts.list_locations(contract_id).await
    }

    async fn insert_contract_location(&self, edge: &ContractLocation) -> CovenantResult<()> {
        self.contracts.insert_location(edge).await
    }

    async fn list_billable_items(&self, contract_id: Uuid) -> CovenantResult<Vec<BillableItem>> {
        self.contracts.list_billable_items(contract_id).await
    }

    async fn insert_billable_item(&self, item: &BillableItem) -> CovenantResult<()> {
        self.contracts.insert_billable_item(item).await
    }

    async fn update_billable_item(&self, item: &BillableItem) -> CovenantResult<()> {
        self.contracts.update_billable_item(item).await
    }

    async fn list_pricing_models(&self, contract_id: Uuid) -> CovenantResult<Vec<PricingModel>> {
        self.contracts.list_pricing_models(contract_id).await
    }

    async fn insert_pricing_model(&self, model: &PricingModel) -> CovenantResult<()> {
        self.contracts.insert_pricing_model(model).await
    }

    async fn update_pricing_model(&self, model: &PricingModel) -> CovenantResult<()> {
        self.contracts.update_pricing_model(model).await
    }

    async fn get_invoice(&self, id: Uuid) -> CovenantResult<Option<Invoice>> {
        self.invoices.find_by_id(id).await
    }

    async fn find_invoice_by_number(&self, invoice_number: &str) -> CovenantResult<Option<Invoice>> {
        self.invoices.find_by_number(invoice_number).await
    }

    async fn insert_invoice(&self, invoice: &Invoice) -> CovenantResult<()> {
        self.invoices.insert(invoice).await
    }

    async fn update_invoice(&self, invoice: &Invoice) -> CovenantResult<()> {
        self.invoices.update(invoice).await
    }

    async fn list_line_items(&self, invoice_id: Uuid) -> CovenantResult<Vec<InvoiceLineItem>> {
        self.invoices.list_line_items(invoice_id).await
    }

    async fn replace_line_items(&self, invoice_id: Uuid, items: &[InvoiceLineItem]) -> CovenantResult<()> {
        self.invoices.replace_line_items(invoice_id, items).await
    }

    async fn insert_validation(
        &self,
        validation: &InvoiceValidation,
        exceptions: &[ValidationException],
    ) -> CovenantResult<()> {
        self.validations.insert(validation, exceptions).await
    }

    async fn get_validation(&self, id: Uuid) -> CovenantResult<Option<InvoiceValidation>> {
        self.validations.find_by_id(id).await
    }

    async fn list_validations(&self, invoice_id: Uuid) -> CovenantResult<Vec<InvoiceValidation>> {
        self.validations.list_for_invoice(invoice_id).await
    }

    async fn list_exceptions(&self, validation_id: Uuid) -> CovenantResult<Vec<ValidationException>> {
        self.validations.list_exceptions(validation_id).await
    }

    async fn update_exception(&self, exception: &ValidationException) -> CovenantResult<()> {
        self.validations.update_exception(exception).await
    }

    async fn list_approval_levels(&self) -> CovenantResult<Vec<ApprovalLevel>> {
        self.approvals.list_levels().await
    }

    async fn insert_approval_level(&self, level: &ApprovalLevel) -> CovenantResult<()> {
        self.approvals.insert_level(level).await
    }

    async fn get_approval_request(&self, id: Uuid) -> CovenantResult<Option<InvoiceApprovalRequest>> {
        self.approvals.find_by_id(id).await
    }

    async fn find_approval_request(
        &self,
        invoice_id: Uuid,
        validation_id: Uuid,
    ) -> CovenantResult<Option<InvoiceApprovalRequest>> {
        self.approvals.find_for_validation(invoice_id, validation_id).await
    }

    async fn list_approval_requests(
        &self,
        status: Option<ApprovalStatus>,
    ) -> CovenantResult<Vec<InvoiceApprovalRequest>> {
        self.approvals.list(status).await
    }

    async fn insert_approval_request(&self, request: &InvoiceApprovalRequest) -> CovenantResult<()> {
        self.approvals.insert(request).await
    }

    async fn update_approval_request(&self, request: &InvoiceApprovalRequest) -> CovenantResult<()> {
        self.approvals.update(request).await
    }

    async fn append_approval_history(&self, entry: &ApprovalHistory) -> CovenantResult<()> {
        self.approvals.append_history(entry).await
    }

    async fn list_approval_history(&self, request_id: Uuid) -> CovenantResult<Vec<ApprovalHistory>> {
        self.approvals.list_history(request_id).await
    }

    async fn health_check(&self) -> CovenantResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
