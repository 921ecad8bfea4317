//! Reconciliation records: one validation run per invoice check, with one
//! exception per failed rule or line-item anomaly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationStatus {
    Passed,
    Failed,
    Partial,
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Passed => write!(f, "Passed"),
            Self::Failed => write!(f, "Failed"),
            Self::Partial => write!(f, "Partial"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// High and Medium exceptions need a human decision.
    pub fn requires_approval(&self) -> bool {
        matches!(self, Severity::High | Severity::Medium)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExceptionType {
    ContractNotMatched,
    PriceVariance,
    InvalidQuantity,
    UomMismatch,
    CurrencyMismatch,
    DateOutOfRange,
    VendorNotOnContract,
    LocationNotAuthorized,
    UnmatchedLineItem,
}

impl ExceptionType {
    pub fn label(&self) -> &'static str {
        match self {
            Self::ContractNotMatched => "Contract Not Matched",
            Self::PriceVariance => "Price Variance",
            Self::InvalidQuantity => "Invalid Quantity",
            Self::UomMismatch => "Unit of Measure Mismatch",
            Self::CurrencyMismatch => "Currency Mismatch",
            Self::DateOutOfRange => "Date Out of Range",
            Self::VendorNotOnContract => "Vendor Not on Contract",
            Self::LocationNotAuthorized => "Location Not Authorized",
            Self::UnmatchedLineItem => "Unmatched Line Item",
        }
    }

    pub fn category(&self) -> ExceptionCategory {
        match self {
            Self::ContractNotMatched => ExceptionCategory::Contract,
            Self::PriceVariance => ExceptionCategory::Pricing,
            Self::InvalidQuantity => ExceptionCategory::Quantity,
            Self::UomMismatch => ExceptionCategory::UnitOfMeasure,
            Self::CurrencyMismatch => ExceptionCategory::Currency,
            Self::DateOutOfRange => ExceptionCategory::Term,
            Self::VendorNotOnContract => ExceptionCategory::Party,
            Self::LocationNotAuthorized => ExceptionCategory::Location,
            Self::UnmatchedLineItem => ExceptionCategory::LineItem,
        }
    }
}

impl std::fmt::Display for ExceptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExceptionCategory {
    Contract,
    Pricing,
    Quantity,
    UnitOfMeasure,
    Currency,
    Term,
    Party,
    Location,
    LineItem,
}

/// Immutable record of one reconciliation run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvoiceValidation {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub contract_id: Option<Uuid>,
    pub status: ValidationStatus,
    pub contract_matched: bool,
    pub vendor_matched: bool,
    pub all_lines_matched: bool,
    pub expected_net_amount: f64,
    pub actual_net_amount: f64,
    pub variance_amount: f64,
    pub potential_savings: f64,
    pub rules_evaluated: u32,
    pub exception_count: u32,
    pub validated_by: Option<Uuid>,
    pub validated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationException {
    pub id: Uuid,
    pub validation_id: Uuid,
    pub invoice_id: Uuid,
    pub line_item_id: Option<Uuid>,
    pub exception_type: ExceptionType,
    pub category: ExceptionCategory,
    pub severity: Severity,
    pub expected_value: Option<String>,
    pub actual_value: Option<String>,
    pub financial_impact: f64,
    pub message: String,
    pub resolved: bool,
    pub resolved_by: Option<Uuid>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ValidationException {
    pub fn new(
        validation_id: Uuid,
        invoice_id: Uuid,
        exception_type: ExceptionType,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            validation_id,
            invoice_id,
            line_item_id: None,
            exception_type,
            category: exception_type.category(),
            severity,
            expected_value: None,
            actual_value: None,
            financial_impact: 0.0,
            message: message.into(),
            resolved: false,
            resolved_by: None,
            resolved_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn needs_approval(&self) -> bool {
        !self.resolved && self.severity.requires_approval()
    }

    pub fn resolve(&mut self, actor_id: Option<Uuid>) {
        self.resolved = true;
        self.resolved_by = actor_id;
        self.resolved_at = Some(Utc::now());
    }
}
