//! Validation Orchestrator
//!
//! Runs every applicable rule for one invoice, turns failures into
//! exceptions, persists the validation record and hands approvable
//! exceptions to the approval workflow.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use covenant_approval_workflow::ApprovalService;
use covenant_database::RecordStore;
use covenant_models::{
    BillableItem, ExceptionType, Invoice, InvoiceLineItem, InvoiceStatus, InvoiceValidation, Location, Severity,
    ValidationException, ValidationStatus,
};
use covenant_utils::{log_error, CovenantError, CovenantResult};

use crate::metrics::ReconciliationMetrics;
use crate::rules::{invoice_rules, line_rules, InvoiceScope, RuleKind, RuleOutcome};

/// Price variances whose extended impact exceeds this are High severity.
pub const HIGH_PRICE_IMPACT: f64 = 1_000.0;

#[derive(Clone)]
pub struct ValidationOrchestrator {
    store: Arc<dyn RecordStore>,
    approvals: ApprovalService,
    metrics: Option<ReconciliationMetrics>,
}

/// Everything a validation run produced before it is written.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub validation: InvoiceValidation,
    pub exceptions: Vec<ValidationException>,
}

impl ValidationOrchestrator {
    pub fn new(store: Arc<dyn RecordStore>, approvals: ApprovalService) -> Self {
        Self {
            store,
            approvals,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: ReconciliationMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn approvals(&self) -> &ApprovalService {
        &self.approvals
    }

    /// Validate `invoice_id` and return the new validation id. Every run
    /// writes a fresh validation record; earlier runs are left untouched.
    pub async fn run_validation(&self, invoice_id: Uuid, actor_id: Option<Uuid>) -> CovenantResult<Uuid> {
        match self.validate_invoice(invoice_id, actor_id).await {
            Ok(validation_id) => Ok(validation_id),
            Err(e) => {
                log_error!(e, "Invoice validation failed", %invoice_id, error_code = e.error_code());
                Err(match e {
                    CovenantError::NotFound { .. } | CovenantError::Reconciliation { .. } => e,
                    other => CovenantError::reconciliation(format!(
                        "validation of invoice {} failed: {}",
                        invoice_id, other
                    )),
                })
            }
        }
    }

    async fn validate_invoice(&self, invoice_id: Uuid, actor_id: Option<Uuid>) -> CovenantResult<Uuid> {
        let mut invoice = self
            .store
            .get_invoice(invoice_id)
            .await?
            .ok_or_else(|| CovenantError::not_found(format!("invoice {}", invoice_id)))?;
        check_required_fields(&invoice)?;

        let outcome = self.evaluate(&invoice, actor_id).await?;
        let validation_id = outcome.validation.id;

        self.store
            .insert_validation(&outcome.validation, &outcome.exceptions)
            .await?;

        invoice.validation_status = Some(outcome.validation.status);
        if outcome.validation.status == ValidationStatus::Passed && invoice.current_status == InvoiceStatus::Received {
            invoice.current_status = InvoiceStatus::Validated;
        }
        invoice.updated_at = Utc::now();
        self.store.update_invoice(&invoice).await?;

        if let Some(metrics) = &self.metrics {
            metrics
                .validations
                .with_label_values(&[&outcome.validation.status.to_string()])
                .inc();
            for exception in &outcome.exceptions {
                metrics
                    .exceptions
                    .with_label_values(&[exception.exception_type.label()])
                    .inc();
            }
        }
        tracing::info!(
            %invoice_id,
            %validation_id,
            status = %outcome.validation.status,
            exceptions = outcome.exceptions.len(),
            variance = outcome.validation.variance_amount,
            "Invoice validated"
        );

        if outcome.exceptions.iter().any(ValidationException::needs_approval) {
            self.approvals.create_for_validation(validation_id, actor_id).await?;
        }

        Ok(validation_id)
    }

    /// Apply all rules without writing anything.
    pub async fn evaluate(&self, invoice: &Invoice, actor_id: Option<Uuid>) -> CovenantResult<ValidationOutcome> {
        let validation_id = Uuid::new_v4();
        let stated = invoice.stated_amount();
        let lines = self.store.list_line_items(invoice.id).await?;

        let contract = match invoice.contract_id {
            Some(contract_id) => self.store.get_contract(contract_id).await?,
            None => None,
        };

        let Some(contract) = contract else {
            let mut exception = ValidationException::new(
                validation_id,
                invoice.id,
                ExceptionType::ContractNotMatched,
                Severity::High,
                format!("No contract could be matched to invoice {}", invoice.invoice_number),
            );
            exception.actual_value = Some(invoice.invoice_number.clone());
            exception.financial_impact = stated;

            return Ok(ValidationOutcome {
                validation: InvoiceValidation {
                    id: validation_id,
                    invoice_id: invoice.id,
                    contract_id: None,
                    status: ValidationStatus::Failed,
                    contract_matched: false,
                    vendor_matched: false,
                    all_lines_matched: false,
                    expected_net_amount: stated,
                    actual_net_amount: stated,
                    variance_amount: 0.0,
                    potential_savings: 0.0,
                    rules_evaluated: 0,
                    exception_count: 1,
                    validated_by: actor_id,
                    validated_at: Utc::now(),
                },
                exceptions: vec![exception],
            });
        };

        let parties = self.store.list_contract_parties(contract.id).await?;
        let authorized = self.authorized_locations(contract.id).await?;
        let invoice_location = match invoice.location_id {
            Some(location_id) => self.store.get_location(location_id).await?,
            None => None,
        };
        let items: HashMap<Uuid, BillableItem> = self
            .store
            .list_billable_items(contract.id)
            .await?
            .into_iter()
            .map(|item| (item.id, item))
            .collect();

        let mut exceptions = Vec::new();
        let mut rules_evaluated = 0u32;

        let scope = InvoiceScope {
            invoice,
            contract: &contract,
            parties: &parties,
            invoice_location: invoice_location.as_ref(),
            authorized_locations: &authorized,
        };
        let invoice_outcomes = invoice_rules(&scope);
        let vendor_matched = invoice_outcomes
            .iter()
            .any(|o| o.rule == RuleKind::Vendor && o.passed);
        rules_evaluated += invoice_outcomes.len() as u32;
        for outcome in invoice_outcomes.iter().filter(|o| !o.passed) {
            exceptions.push(exception_from(validation_id, invoice, None, outcome));
        }

        let mut expected_net = 0.0;
        let mut priced_lines = 0usize;
        let mut price_variance_total = 0.0;
        let mut all_lines_matched = true;

        for line in &lines {
            let item = line.billable_item_id.and_then(|id| items.get(&id));
            if item.is_none() {
                all_lines_matched = false;
                let mut exception = ValidationException::new(
                    validation_id,
                    invoice.id,
                    ExceptionType::UnmatchedLineItem,
                    Severity::Medium,
                    format!(
                        "Line {} ({}) matches no billable item on contract {}",
                        line.line_number,
                        line_label(line),
                        contract.contract_number
                    ),
                );
                exception.line_item_id = Some(line.id);
                exception.actual_value = Some(line_label(line));
                exception.financial_impact = line.extended_amount;
                exceptions.push(exception);
            }

            if let Some(price) = item.and_then(BillableItem::effective_price) {
                expected_net += price * line.quantity;
                priced_lines += 1;
            }

            let outcomes = line_rules(line, item);
            rules_evaluated += outcomes.len() as u32;
            for outcome in outcomes.iter().filter(|o| !o.passed) {
                let exception = exception_from(validation_id, invoice, Some(line), outcome);
                if outcome.rule == RuleKind::Price {
                    price_variance_total += exception.financial_impact.abs();
                }
                exceptions.push(exception);
            }
        }

        // Nothing priced against the contract: compare the invoice to itself.
        if priced_lines == 0 {
            expected_net = stated;
        }
        let variance_amount = stated - expected_net;
        let potential_savings = variance_amount.max(0.0) + price_variance_total;

        let status = if exceptions.is_empty() {
            ValidationStatus::Passed
        } else {
            ValidationStatus::Failed
        };

        Ok(ValidationOutcome {
            validation: InvoiceValidation {
                id: validation_id,
                invoice_id: invoice.id,
                contract_id: Some(contract.id),
                status,
                contract_matched: true,
                vendor_matched,
                all_lines_matched,
                expected_net_amount: expected_net,
                actual_net_amount: stated,
                variance_amount,
                potential_savings,
                rules_evaluated,
                exception_count: exceptions.len() as u32,
                validated_by: actor_id,
                validated_at: Utc::now(),
            },
            exceptions,
        })
    }

    async fn authorized_locations(&self, contract_id: Uuid) -> CovenantResult<Vec<Location>> {
        let mut locations = Vec::new();
        for edge in self.store.list_contract_locations(contract_id).await? {
            match self.store.get_location(edge.location_id).await? {
                Some(location) => locations.push(location),
                None => tracing::warn!(%contract_id, location_id = %edge.location_id, "Contract location edge points at a missing location"),
            }
        }
        Ok(locations)
    }
}

fn check_required_fields(invoice: &Invoice) -> CovenantResult<()> {
    if invoice.invoice_number.trim().is_empty() {
        return Err(CovenantError::reconciliation(format!(
            "invoice {} has no invoice number",
            invoice.id
        )));
    }
    if !invoice.gross_amount.is_finite() {
        return Err(CovenantError::reconciliation(format!(
            "invoice {} has no usable amount",
            invoice.invoice_number
        )));
    }
    Ok(())
}

fn exception_from(
    validation_id: Uuid,
    invoice: &Invoice,
    line: Option<&InvoiceLineItem>,
    outcome: &RuleOutcome,
) -> ValidationException {
    let (severity, impact) = match outcome.rule {
        RuleKind::Price => {
            let quantity = line.map(|l| l.quantity).unwrap_or(1.0);
            let impact = outcome.variance.unwrap_or(0.0) * quantity;
            let severity = if impact.abs() > HIGH_PRICE_IMPACT {
                Severity::High
            } else {
                Severity::Medium
            };
            (severity, impact)
        }
        RuleKind::Quantity => (Severity::Medium, line.map(|l| l.extended_amount.abs()).unwrap_or(0.0)),
        RuleKind::Uom => (Severity::Medium, 0.0),
        RuleKind::Currency | RuleKind::Vendor => (Severity::High, 0.0),
        RuleKind::DateRange | RuleKind::Location => (Severity::Medium, 0.0),
    };

    let mut exception = ValidationException::new(
        validation_id,
        invoice.id,
        outcome.rule.exception_type(),
        severity,
        outcome.message.clone(),
    );
    exception.line_item_id = line.map(|l| l.id);
    exception.expected_value = outcome.expected.clone();
    exception.actual_value = outcome.actual.clone();
    exception.financial_impact = impact;
    exception
}

fn line_label(line: &InvoiceLineItem) -> String {
    line.item_code
        .clone()
        .or_else(|| line.description.clone())
        .unwrap_or_else(|| format!("line {}", line.line_number))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use covenant_approval_workflow::default_ladder;
    use covenant_database::{Cache, MemoryCache, MemoryStore};
    use covenant_models::{ApprovalStatus, Contract, ContractParty, PartyRole, VarianceType};
    use covenant_utils::ApprovalConfig;

    struct Fixture {
        store: Arc<dyn RecordStore>,
        orchestrator: ValidationOrchestrator,
        contract: Contract,
        item: BillableItem,
        vendor_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new(std::time::Duration::from_secs(60)));
        let approvals = ApprovalService::new(store.clone(), cache, ApprovalConfig::default());
        approvals.seed_levels(default_ladder()).await.unwrap();

        let contract = Contract::new(
            "MSA-100".into(),
            "Supply Agreement".into(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            "USD".into(),
        );
        store.insert_contract(&contract).await.unwrap();

        let vendor_id = Uuid::new_v4();
        store
            .insert_contract_party(&ContractParty::new(contract.id, vendor_id, PartyRole::Vendor))
            .await
            .unwrap();

        let mut item = BillableItem::new(contract.id, "GLV-100".into(), "USD".into());
        item.contract_price = Some(100.0);
        item.allowed_variance = 10.0;
        item.allowed_variance_type = VarianceType::Absolute;
        store.insert_billable_item(&item).await.unwrap();

        Fixture {
            orchestrator: ValidationOrchestrator::new(store.clone(), approvals),
            store,
            contract,
            item,
            vendor_id,
        }
    }

    async fn invoice_with_lines(fixture: &Fixture, lines: &[(f64, f64, bool)]) -> Invoice {
        let gross: f64 = lines.iter().map(|(q, p, _)| q * p).sum();
        let mut invoice = Invoice::new(format!("INV-{}", Uuid::new_v4().simple()), fixture.vendor_id, gross);
        invoice.contract_id = Some(fixture.contract.id);
        invoice.currency = Some("USD".into());
        invoice.invoice_date = NaiveDate::from_ymd_opt(2024, 3, 15);
        fixture.store.insert_invoice(&invoice).await.unwrap();

        let items: Vec<InvoiceLineItem> = lines
            .iter()
            .enumerate()
            .map(|(i, (quantity, price, matched))| {
                let mut line = InvoiceLineItem::new(invoice.id, i as u32 + 1, *quantity, *price);
                line.item_code = Some(if *matched { "GLV-100".into() } else { "MISC".into() });
                if *matched {
                    line.billable_item_id = Some(fixture.item.id);
                }
                line
            })
            .collect();
        fixture.store.replace_line_items(invoice.id, &items).await.unwrap();
        invoice
    }

    #[tokio::test]
    async fn test_clean_invoice_passes() {
        let fixture = fixture().await;
        let invoice = invoice_with_lines(&fixture, &[(3.0, 105.0, true)]).await;

        let validation_id = fixture.orchestrator.run_validation(invoice.id, None).await.unwrap();
        let validation = fixture.store.get_validation(validation_id).await.unwrap().unwrap();

        assert_eq!(validation.status, ValidationStatus::Passed);
        assert_eq!(validation.exception_count, 0);
        assert!(validation.contract_matched && validation.vendor_matched && validation.all_lines_matched);
        assert_eq!(validation.expected_net_amount, 300.0);
        assert_eq!(validation.variance_amount, 15.0);
        assert_eq!(validation.rules_evaluated, 7);

        let stored = fixture.store.get_invoice(invoice.id).await.unwrap().unwrap();
        assert_eq!(stored.validation_status, Some(ValidationStatus::Passed));
        assert_eq!(stored.current_status, InvoiceStatus::Validated);
        assert!(fixture.orchestrator.approvals().list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_price_variance_opens_approval() {
        let fixture = fixture().await;
        let invoice = invoice_with_lines(&fixture, &[(2.0, 115.0, true)]).await;

        let validation_id = fixture.orchestrator.run_validation(invoice.id, None).await.unwrap();
        let validation = fixture.store.get_validation(validation_id).await.unwrap().unwrap();
        let exceptions = fixture.store.list_exceptions(validation_id).await.unwrap();

        assert_eq!(validation.status, ValidationStatus::Failed);
        assert_eq!(exceptions.len(), 1);
        assert_eq!(exceptions[0].exception_type, ExceptionType::PriceVariance);
        assert_eq!(exceptions[0].severity, Severity::Medium);
        assert_eq!(exceptions[0].financial_impact, 30.0);
        // 30 over expected plus 30 of per-line variance.
        assert_eq!(validation.potential_savings, 60.0);

        let requests = fixture.orchestrator.approvals().list(Some(ApprovalStatus::Pending)).await.unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].validation_id, validation_id);
        assert_eq!(requests[0].current_sequence, 1);
    }

    #[tokio::test]
    async fn test_large_price_variance_is_high_severity() {
        let fixture = fixture().await;
        let invoice = invoice_with_lines(&fixture, &[(100.0, 120.0, true)]).await;

        let validation_id = fixture.orchestrator.run_validation(invoice.id, None).await.unwrap();
        let exceptions = fixture.store.list_exceptions(validation_id).await.unwrap();
        assert_eq!(exceptions[0].severity, Severity::High);
        assert_eq!(exceptions[0].financial_impact, 2_000.0);

        let requests = fixture.orchestrator.approvals().list(None).await.unwrap();
        assert_eq!(requests[0].current_sequence, 2);
    }

    #[tokio::test]
    async fn test_unmatched_line_is_an_exception() {
        let fixture = fixture().await;
        let invoice = invoice_with_lines(&fixture, &[(1.0, 100.0, true), (2.0, 40.0, false)]).await;

        let validation_id = fixture.orchestrator.run_validation(invoice.id, None).await.unwrap();
        let validation = fixture.store.get_validation(validation_id).await.unwrap().unwrap();
        let exceptions = fixture.store.list_exceptions(validation_id).await.unwrap();

        assert!(!validation.all_lines_matched);
        assert_eq!(exceptions.len(), 1);
        assert_eq!(exceptions[0].exception_type, ExceptionType::UnmatchedLineItem);
        assert_eq!(exceptions[0].financial_impact, 80.0);
    }

    #[tokio::test]
    async fn test_missing_contract_is_distinguished() {
        let fixture = fixture().await;
        let mut invoice = Invoice::new("INV-NC".into(), Uuid::new_v4(), 2_500.0);
        invoice.net_amount = Some(2_400.0);
        fixture.store.insert_invoice(&invoice).await.unwrap();

        let validation_id = fixture.orchestrator.run_validation(invoice.id, None).await.unwrap();
        let validation = fixture.store.get_validation(validation_id).await.unwrap().unwrap();
        let exceptions = fixture.store.list_exceptions(validation_id).await.unwrap();

        assert!(!validation.contract_matched);
        assert_eq!(validation.expected_net_amount, 2_400.0);
        assert_eq!(validation.variance_amount, 0.0);
        assert_eq!(exceptions[0].exception_type, ExceptionType::ContractNotMatched);
        assert_eq!(exceptions[0].severity, Severity::High);
        assert_eq!(exceptions[0].financial_impact, 2_400.0);

        let requests = fixture.orchestrator.approvals().list(None).await.unwrap();
        assert_eq!(requests[0].current_sequence, 2);
    }

    #[tokio::test]
    async fn test_revalidation_adds_a_new_record() {
        let fixture = fixture().await;
        let invoice = invoice_with_lines(&fixture, &[(1.0, 100.0, true)]).await;

        let first = fixture.orchestrator.run_validation(invoice.id, None).await.unwrap();
        let second = fixture.orchestrator.run_validation(invoice.id, None).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(fixture.store.list_validations(invoice.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_invoice_and_bad_fields() {
        let fixture = fixture().await;
        let err = fixture.orchestrator.run_validation(Uuid::new_v4(), None).await.unwrap_err();
        assert_eq!(err.http_status_code(), 404);

        let invoice = Invoice::new("  ".into(), fixture.vendor_id, 10.0);
        fixture.store.insert_invoice(&invoice).await.unwrap();
        let err = fixture.orchestrator.run_validation(invoice.id, None).await.unwrap_err();
        assert_eq!(err.error_code(), "RECONCILIATION_ERROR");
    }

    #[tokio::test]
    async fn test_wrong_vendor_and_currency() {
        let fixture = fixture().await;
        let mut invoice = Invoice::new("INV-X".into(), Uuid::new_v4(), 100.0);
        invoice.contract_id = Some(fixture.contract.id);
        invoice.currency = Some("EUR".into());
        fixture.store.insert_invoice(&invoice).await.unwrap();

        let validation_id = fixture.orchestrator.run_validation(invoice.id, None).await.unwrap();
        let validation = fixture.store.get_validation(validation_id).await.unwrap().unwrap();
        let mut types: Vec<_> = fixture
            .store
            .list_exceptions(validation_id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.exception_type)
            .collect();
        types.sort_by_key(|t| t.label());

        assert!(!validation.vendor_matched);
        assert_eq!(types, vec![ExceptionType::CurrencyMismatch, ExceptionType::VendorNotOnContract]);
    }
}
