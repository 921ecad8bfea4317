//! # Covenant Core Domain Models
//!
//! Domain models for the Covenant contract and invoice reconciliation system.
//! All models serialize with serde; the ones written by humans or by the
//! extraction gateway also carry validator rules.
//!
//! ## Key Models
//!
//! - **Document**: an uploaded file and its pipeline stage
//! - **ExtractedDocument**: tagged union of the contract and invoice extraction schemas
//! - **Party** / **Location**: entities resolved by match-or-create
//! - **Contract** / **BillableItem** / **PricingModel**: contractual terms
//! - **Invoice** / **InvoiceLineItem**: what the vendor billed
//! - **InvoiceValidation** / **ValidationException**: reconciliation results
//! - **ApprovalLevel** / **InvoiceApprovalRequest** / **ApprovalHistory**: approval routing
//!
//! ## State Machines
//!
//! `DocumentStage` and `ApprovalStatus` both expose `can_transition_to`;
//! callers check it before mutating so illegal jumps are rejected at the model
//! boundary.

pub mod approval;
pub mod contract;
pub mod document;
pub mod extraction;
pub mod invoice;
pub mod party;
pub mod validation;

#[cfg(test)]
pub mod property_tests;

pub use approval::*;
pub use contract::*;
pub use document::*;
pub use extraction::*;
pub use invoice::*;
pub use party::*;
pub use validation::*;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use uuid::Uuid;
    use validator::Validate;

    #[test]
    fn test_document_creation() {
        let document = Document::new(
            "invoice.pdf".to_string(),
            "application/pdf".to_string(),
            2048,
            DocumentType::Invoice,
            "deadbeef".to_string(),
            "blobs/deadbeef".to_string(),
        );
        assert_eq!(document.stage, DocumentStage::Uploaded);
        assert_eq!(document.status().progress_percent, 5);
        assert!(document.processing_error.is_none());
    }

    #[test]
    fn test_extracted_document_tagging() {
        let json = serde_json::json!({
            "document_type": "invoice",
            "invoice_id": "INV-1001",
            "total_amount": 250.0,
            "line_items": []
        });
        let parsed: ExtractedDocument = serde_json::from_value(json).unwrap();
        match parsed {
            ExtractedDocument::Invoice(invoice) => {
                assert_eq!(invoice.invoice_id.as_deref(), Some("INV-1001"));
                assert_eq!(invoice.total_amount, Some(250.0));
            }
            other => panic!("expected invoice, got {:?}", other),
        }
    }

    #[test]
    fn test_contract_validation_rules() {
        let mut contract = Contract::new(
            "C-7".to_string(),
            "Lab Services".to_string(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            "USD".to_string(),
        );
        assert!(contract.validate().is_ok());

        contract.currency = "DOLLARS".to_string();
        assert!(contract.validate().is_err());
    }

    #[test]
    fn test_exception_needs_approval() {
        let mut exception = ValidationException::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            ExceptionType::PriceVariance,
            Severity::Medium,
            "Unit price above contract",
        );
        assert_eq!(exception.category, ExceptionCategory::Pricing);
        assert!(exception.needs_approval());

        exception.resolve(None);
        assert!(!exception.needs_approval());

        let low = ValidationException::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            ExceptionType::UomMismatch,
            Severity::Low,
            "Units differ",
        );
        assert!(!low.needs_approval());
    }

    #[test]
    fn test_invoice_amount_fallbacks() {
        let mut invoice = Invoice::new("INV-1".to_string(), Uuid::new_v4(), 120.0);
        assert_eq!(invoice.stated_amount(), 120.0);
        invoice.net_amount = Some(100.0);
        assert_eq!(invoice.stated_amount(), 100.0);

        invoice.invoice_date = NaiveDate::from_ymd_opt(2024, 5, 1);
        assert_eq!(invoice.effective_date(), invoice.invoice_date);
        invoice.service_date = NaiveDate::from_ymd_opt(2024, 4, 15);
        assert_eq!(invoice.effective_date(), invoice.service_date);
    }

    #[test]
    fn test_line_item_extended_amount() {
        let line = InvoiceLineItem::new(Uuid::new_v4(), 1, 3.0, 12.5);
        assert_eq!(line.extended_amount, 37.5);
        assert!(line.price_variance.is_none());
    }
}
