//! Covenant Reconciliation
//!
//! Compares invoices against their matched contracts. `rules` holds the
//! individual checks; `orchestrator` runs them, records the outcome and
//! opens approval requests for exceptions that need a decision.

pub mod metrics;
pub mod orchestrator;
pub mod rules;

pub use metrics::ReconciliationMetrics;
pub use orchestrator::{ValidationOrchestrator, ValidationOutcome, HIGH_PRICE_IMPACT};
pub use rules::{
    check_currency, check_date_range, check_location, check_price, check_quantity, check_uom, check_vendor,
    invoice_rules, line_rules, InvoiceScope, RuleKind, RuleOutcome,
};
