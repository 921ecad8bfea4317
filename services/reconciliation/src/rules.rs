//! Validation Rules
//!
//! Pure checks over an invoice and its matched contract. Each returns a
//! `RuleOutcome`; none of them touch storage. A check that has nothing to
//! compare (no contract price, no unit on either side, no invoice date)
//! passes.

use serde::Serialize;

use covenant_models::{
    BillableItem, Contract, ContractParty, ExceptionType, Invoice, InvoiceLineItem, Location,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RuleKind {
    Price,
    Quantity,
    Uom,
    Currency,
    DateRange,
    Vendor,
    Location,
}

impl RuleKind {
    pub fn exception_type(&self) -> ExceptionType {
        match self {
            Self::Price => ExceptionType::PriceVariance,
            Self::Quantity => ExceptionType::InvalidQuantity,
            Self::Uom => ExceptionType::UomMismatch,
            Self::Currency => ExceptionType::CurrencyMismatch,
            Self::DateRange => ExceptionType::DateOutOfRange,
            Self::Vendor => ExceptionType::VendorNotOnContract,
            Self::Location => ExceptionType::LocationNotAuthorized,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleOutcome {
    pub rule: RuleKind,
    pub passed: bool,
    pub expected: Option<String>,
    pub actual: Option<String>,
    /// Signed difference, for rules that measure one.
    pub variance: Option<f64>,
    pub message: String,
}

impl RuleOutcome {
    fn pass(rule: RuleKind, message: impl Into<String>) -> Self {
        Self {
            rule,
            passed: true,
            expected: None,
            actual: None,
            variance: None,
            message: message.into(),
        }
    }

    fn fail(
        rule: RuleKind,
        expected: impl Into<String>,
        actual: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            rule,
            passed: false,
            expected: Some(expected.into()),
            actual: Some(actual.into()),
            variance: None,
            message: message.into(),
        }
    }
}

/// Invoiced unit price against the contract price (list price as fallback),
/// within the item's absolute or percentage tolerance.
pub fn check_price(line: &InvoiceLineItem, item: &BillableItem) -> RuleOutcome {
    let Some(contract_price) = item.effective_price() else {
        return RuleOutcome::pass(RuleKind::Price, format!("No contract price for {}", item.item_code));
    };

    let variance = line.unit_price - contract_price;
    let tolerance = item.tolerance();
    // Rounding noise from f64 must not flip a boundary case.
    let passed = variance.abs() <= tolerance + 1e-9;

    RuleOutcome {
        rule: RuleKind::Price,
        passed,
        expected: Some(format!("{:.2}", contract_price)),
        actual: Some(format!("{:.2}", line.unit_price)),
        variance: Some(variance),
        message: if passed {
            format!("Unit price within {:.2} of contract price", tolerance)
        } else {
            format!(
                "Unit price {:.2} differs from contract price {:.2} by {:.2} (allowed {:.2})",
                line.unit_price, contract_price, variance, tolerance
            )
        },
    }
}

pub fn check_quantity(line: &InvoiceLineItem) -> RuleOutcome {
    if line.quantity > 0.0 {
        RuleOutcome::pass(RuleKind::Quantity, "Quantity is positive")
    } else {
        RuleOutcome::fail(
            RuleKind::Quantity,
            "> 0",
            line.quantity.to_string(),
            format!("Line {} has non-positive quantity {}", line.line_number, line.quantity),
        )
    }
}

/// Plain comparison of unit labels; no conversion between units.
pub fn check_uom(line: &InvoiceLineItem, item: &BillableItem) -> RuleOutcome {
    match (&line.uom, &item.uom) {
        (Some(invoiced), Some(contracted)) if !invoiced.trim().eq_ignore_ascii_case(contracted.trim()) => {
            RuleOutcome::fail(
                RuleKind::Uom,
                contracted.clone(),
                invoiced.clone(),
                format!("Line {} billed per '{}' but contract prices per '{}'", line.line_number, invoiced, contracted),
            )
        }
        _ => RuleOutcome::pass(RuleKind::Uom, "Unit of measure agrees"),
    }
}

pub fn check_currency(invoice: &Invoice, contract: &Contract) -> RuleOutcome {
    match &invoice.currency {
        Some(currency) if !currency.trim().eq_ignore_ascii_case(contract.currency.trim()) => RuleOutcome::fail(
            RuleKind::Currency,
            contract.currency.clone(),
            currency.clone(),
            format!("Invoice currency {} does not match contract currency {}", currency, contract.currency),
        ),
        _ => RuleOutcome::pass(RuleKind::Currency, "Currency agrees"),
    }
}

/// Service date (or invoice date) inside the inclusive contract term.
pub fn check_date_range(invoice: &Invoice, contract: &Contract) -> RuleOutcome {
    let Some(date) = invoice.effective_date() else {
        return RuleOutcome::pass(RuleKind::DateRange, "Invoice carries no date");
    };

    if contract.covers(date) {
        RuleOutcome::pass(RuleKind::DateRange, "Date within contract term")
    } else {
        RuleOutcome::fail(
            RuleKind::DateRange,
            format!("{} to {}", contract.effective_date, contract.expiration_date),
            date.to_string(),
            format!("Invoice date {} is outside contract {} term", date, contract.contract_number),
        )
    }
}

pub fn check_vendor(invoice: &Invoice, contract: &Contract, parties: &[ContractParty]) -> RuleOutcome {
    if parties.iter().any(|edge| edge.party_id == invoice.vendor_party_id) {
        RuleOutcome::pass(RuleKind::Vendor, "Vendor is a party to the contract")
    } else {
        RuleOutcome::fail(
            RuleKind::Vendor,
            format!("party of contract {}", contract.contract_number),
            invoice.vendor_party_id.to_string(),
            format!("Vendor is not a party to contract {}", contract.contract_number),
        )
    }
}

/// With no invoice location, or a contract that names no locations, there
/// is nothing to authorize against.
pub fn check_location(invoice_location: Option<&Location>, authorized: &[Location]) -> RuleOutcome {
    let Some(location) = invoice_location else {
        return RuleOutcome::pass(RuleKind::Location, "Invoice names no location");
    };
    if authorized.is_empty() {
        return RuleOutcome::pass(RuleKind::Location, "Contract does not restrict locations");
    }

    if authorized.iter().any(|allowed| allowed.id == location.id || allowed.same_place(location)) {
        RuleOutcome::pass(RuleKind::Location, "Location authorized")
    } else {
        let names: Vec<&str> = authorized.iter().map(|l| l.name.as_str()).collect();
        RuleOutcome::fail(
            RuleKind::Location,
            names.join(", "),
            location.name.clone(),
            format!("Location '{}' is not authorized under the contract", location.name),
        )
    }
}

/// Inputs for the invoice-level rules.
pub struct InvoiceScope<'a> {
    pub invoice: &'a Invoice,
    pub contract: &'a Contract,
    pub parties: &'a [ContractParty],
    pub invoice_location: Option<&'a Location>,
    pub authorized_locations: &'a [Location],
}

pub fn invoice_rules(scope: &InvoiceScope<'_>) -> Vec<RuleOutcome> {
    vec![
        check_currency(scope.invoice, scope.contract),
        check_date_range(scope.invoice, scope.contract),
        check_vendor(scope.invoice, scope.contract, scope.parties),
        check_location(scope.invoice_location, scope.authorized_locations),
    ]
}

/// Quantity always runs; price and unit checks need a matched billable item.
pub fn line_rules(line: &InvoiceLineItem, item: Option<&BillableItem>) -> Vec<RuleOutcome> {
    let mut outcomes = vec![check_quantity(line)];
    if let Some(item) = item {
        outcomes.push(check_price(line, item));
        outcomes.push(check_uom(line, item));
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use covenant_models::{PartyRole, VarianceType};
    use proptest::prelude::*;
    use uuid::Uuid;

    fn item(price: f64, variance: f64, variance_type: VarianceType) -> BillableItem {
        let mut item = BillableItem::new(Uuid::new_v4(), "SKU-1".into(), "USD".into());
        item.contract_price = Some(price);
        item.allowed_variance = variance;
        item.allowed_variance_type = variance_type;
        item.uom = Some("EA".into());
        item
    }

    fn line(quantity: f64, price: f64) -> InvoiceLineItem {
        InvoiceLineItem::new(Uuid::new_v4(), 1, quantity, price)
    }

    fn contract() -> Contract {
        Contract::new(
            "MSA-2024-01".into(),
            "Master Services".into(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            "USD".into(),
        )
    }

    #[test]
    fn test_price_absolute_tolerance() {
        let item = item(100.0, 10.0, VarianceType::Absolute);

        let over = check_price(&line(1.0, 115.0), &item);
        assert!(!over.passed);
        assert_eq!(over.variance, Some(15.0));

        let within = check_price(&line(1.0, 105.0), &item);
        assert!(within.passed);
        assert_eq!(within.variance, Some(5.0));

        assert!(check_price(&line(1.0, 110.0), &item).passed);
        assert!(!check_price(&line(1.0, 89.0), &item).passed);
    }

    #[test]
    fn test_price_percentage_tolerance() {
        let item = item(200.0, 5.0, VarianceType::Percentage);
        assert!(check_price(&line(1.0, 210.0), &item).passed);
        assert!(!check_price(&line(1.0, 210.5), &item).passed);
    }

    #[test]
    fn test_price_falls_back_to_list_price() {
        let mut item = item(0.0, 0.0, VarianceType::Absolute);
        item.contract_price = None;
        item.list_price = Some(50.0);
        let outcome = check_price(&line(2.0, 55.0), &item);
        assert!(!outcome.passed);
        assert_eq!(outcome.expected.as_deref(), Some("50.00"));

        item.list_price = None;
        assert!(check_price(&line(2.0, 55.0), &item).passed);
    }

    #[test]
    fn test_quantity_and_uom() {
        assert!(!check_quantity(&line(0.0, 10.0)).passed);
        assert!(!check_quantity(&line(-2.0, 10.0)).passed);
        assert!(check_quantity(&line(0.5, 10.0)).passed);

        let item = item(10.0, 0.0, VarianceType::Absolute);
        let mut billed = line(1.0, 10.0);
        billed.uom = Some("ea".into());
        assert!(check_uom(&billed, &item).passed);
        billed.uom = Some("BOX".into());
        assert!(!check_uom(&billed, &item).passed);
        billed.uom = None;
        assert!(check_uom(&billed, &item).passed);
    }

    #[test]
    fn test_invoice_level_rules() {
        let contract = contract();
        let vendor = Uuid::new_v4();
        let mut invoice = Invoice::new("INV-1".into(), vendor, 100.0);
        invoice.currency = Some("usd".into());
        invoice.invoice_date = NaiveDate::from_ymd_opt(2024, 6, 1);

        let parties = vec![ContractParty::new(contract.id, vendor, PartyRole::Vendor)];
        let scope = InvoiceScope {
            invoice: &invoice,
            contract: &contract,
            parties: &parties,
            invoice_location: None,
            authorized_locations: &[],
        };
        assert!(invoice_rules(&scope).iter().all(|o| o.passed));

        invoice.currency = Some("EUR".into());
        invoice.service_date = NaiveDate::from_ymd_opt(2025, 2, 1);
        assert!(!check_currency(&invoice, &contract).passed);
        assert!(!check_date_range(&invoice, &contract).passed);
        assert!(!check_vendor(&invoice, &contract, &[]).passed);
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let contract = contract();
        let mut invoice = Invoice::new("INV-2".into(), Uuid::new_v4(), 1.0);
        invoice.invoice_date = Some(contract.expiration_date);
        assert!(check_date_range(&invoice, &contract).passed);
        invoice.invoice_date = None;
        assert!(check_date_range(&invoice, &contract).passed);
    }

    #[test]
    fn test_location_rule() {
        let mut clinic = Location::new("North Clinic".into());
        clinic.postal_code = Some("10001".into());
        let other = Location::new("South Depot".into());
        let same_name = Location::new("north clinic".into());

        assert!(check_location(None, &[clinic.clone()]).passed);
        assert!(check_location(Some(&other), &[]).passed);
        assert!(check_location(Some(&same_name), &[clinic.clone()]).passed);
        assert!(!check_location(Some(&other), &[clinic]).passed);
    }

    #[test]
    fn test_line_rules_without_item() {
        let outcomes = line_rules(&line(1.0, 5.0), None);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].rule, RuleKind::Quantity);
    }

    proptest! {
        #[test]
        fn prop_price_passes_iff_within_absolute_tolerance(
            price in 1.0f64..10_000.0,
            tolerance in 0.0f64..100.0,
            delta in -200.0f64..200.0,
        ) {
            let item = item(price, tolerance, VarianceType::Absolute);
            let outcome = check_price(&line(1.0, price + delta), &item);
            let variance = outcome.variance.unwrap();
            prop_assert!((variance - delta).abs() < 1e-6);
            if delta.abs() < tolerance - 1e-6 {
                prop_assert!(outcome.passed);
            }
            if delta.abs() > tolerance + 1e-6 {
                prop_assert!(!outcome.passed);
            }
        }

        #[test]
        fn prop_percentage_tolerance_scales_with_price(
            price in 1.0f64..10_000.0,
            pct in 0.0f64..50.0,
        ) {
            let item = item(price, pct, VarianceType::Percentage);
            prop_assert!((item.tolerance() - price * pct / 100.0).abs() < 1e-6);
            prop_assert!(check_price(&line(1.0, price), &item).passed);
        }
    }
}
