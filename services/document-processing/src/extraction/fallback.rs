//! Required-field fallbacks.
//!
//! Every substitute is deterministic given the payload, the document text
//! and the source document id, costs `FALLBACK_PENALTY` confidence and
//! leaves a warning behind. Generated identifiers come from the source
//! document id, so extracting the same document again yields the same key. A payload
//! that already satisfies every rule passes through untouched, so running the
//! fallbacks twice yields no new warnings.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use uuid::Uuid;

use covenant_models::{default_expiration, ContractExtraction, ExtractionWarning, InvoiceExtraction};
use covenant_utils::{clean_identifier, is_party_name_shaped};

use super::payload::parse_amount;

pub const FALLBACK_PENALTY: f64 = 0.1;
pub const UNKNOWN_VENDOR: &str = "Unknown Vendor";
pub const CONTRACT_ID_PREFIX: &str = "CTR";
pub const INVOICE_ID_PREFIX: &str = "INV";

pub fn apply_contract_fallbacks(
    data: &mut ContractExtraction,
    today: NaiveDate,
    source_document_id: Uuid,
) -> Vec<ExtractionWarning> {
    let mut warnings = Vec::new();

    if data.contract_id.is_none() {
        let (id, message) = match data.contract_number.as_deref().and_then(clean_identifier) {
            Some(number) => (number, "contract_id missing; using the contract number"),
            None => (
                generated_id(CONTRACT_ID_PREFIX, source_document_id),
                "contract_id missing; generated an identifier",
            ),
        };
        data.contract_id = Some(id);
        warn(&mut warnings, "contract_id", message);
    }

    let effective = match data.effective_date {
        Some(date) => date,
        None => {
            data.effective_date = Some(today);
            warn(&mut warnings, "effective_date", "effective_date missing; using the current date");
            today
        }
    };

    match data.expiration_date {
        Some(expiration) if expiration > effective => {}
        Some(_) => {
            data.expiration_date = Some(default_expiration(effective));
            warn(
                &mut warnings,
                "expiration_date",
                "expiration_date not after effective_date; using effective_date + 1 year",
            );
        }
        None => {
            data.expiration_date = Some(default_expiration(effective));
            warn(&mut warnings, "expiration_date", "expiration_date missing; using effective_date + 1 year");
        }
    }

    if data.contract_title.is_none() {
        let reference = data
            .contract_number
            .as_deref()
            .or(data.contract_id.as_deref())
            .unwrap_or("(unnumbered)");
        data.contract_title = Some(format!("Contract {} ({})", reference, effective));
        warn(&mut warnings, "contract_title", "contract_title missing; synthesized from number and date");
    }

    warnings
}

pub fn apply_invoice_fallbacks(
    data: &mut InvoiceExtraction,
    raw_text: &str,
    source_document_id: Uuid,
) -> Vec<ExtractionWarning> {
    let mut warnings = Vec::new();

    if data.invoice_id.is_none() {
        data.invoice_id = Some(generated_id(INVOICE_ID_PREFIX, source_document_id));
        warn(&mut warnings, "invoice_id", "invoice_id missing; generated an identifier");
    }

    if !data.vendor_party_id.as_deref().map(is_party_name_shaped).unwrap_or(false) {
        let (vendor, message) = vendor_fallback(raw_text);
        data.vendor_party_id = Some(vendor);
        warn(&mut warnings, "vendor_party_id", message);
    }

    if !data.total_amount.map(valid_total).unwrap_or(false) {
        let (total, message) = total_fallback(data, raw_text);
        data.total_amount = Some(total);
        warn(&mut warnings, "total_amount", message);
    }

    warnings
}

fn valid_total(amount: f64) -> bool {
    amount.is_finite() && amount >= 0.0
}

fn vendor_fallback(raw_text: &str) -> (String, &'static str) {
    if let Some(name) = first_name_match(remit_to_pattern(), raw_text) {
        return (name, "vendor_party_id invalid; matched the remit-to clause");
    }

    if let Some(name) = first_name_match(vendor_label_pattern(), raw_text) {
        return (name, "vendor_party_id invalid; matched a vendor label");
    }

    (UNKNOWN_VENDOR.to_string(), "vendor_party_id invalid; no vendor found in the text")
}

fn first_name_match(pattern: &Regex, text: &str) -> Option<String> {
    pattern
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .filter_map(|m| clean_identifier(m.as_str()))
        .find(|name| is_party_name_shaped(name))
}

fn total_fallback(data: &InvoiceExtraction, raw_text: &str) -> (f64, &'static str) {
    if let Some(total) = amount_match(balance_due_pattern(), raw_text) {
        return (total, "total_amount invalid; matched 'Total (Account Balance) Due'");
    }

    let amounts: Vec<f64> = data.line_items.iter().filter_map(|line| line.amount()).collect();
    if !amounts.is_empty() {
        return (amounts.iter().sum(), "total_amount invalid; summed line items");
    }

    if let Some(total) = amount_match(generic_total_pattern(), raw_text) {
        return (total, "total_amount invalid; matched a generic total");
    }

    (0.0, "total_amount invalid; defaulted to 0")
}

fn amount_match(pattern: &Regex, text: &str) -> Option<f64> {
    pattern
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .filter_map(|m| parse_amount(m.as_str()))
        .find(|amount| valid_total(*amount))
}

fn warn(warnings: &mut Vec<ExtractionWarning>, field: &str, message: &str) {
    tracing::warn!(field, detail = message, "Applied extraction fallback");
    warnings.push(ExtractionWarning {
        field: field.to_string(),
        message: message.to_string(),
        penalty: FALLBACK_PENALTY,
    });
}

fn generated_id(prefix: &str, source_document_id: Uuid) -> String {
    let id = source_document_id.simple().to_string();
    format!("{}-{}", prefix, id[..12].to_uppercase())
}

/// Whether `value` is the identifier the fallbacks generate for
/// `source_document_id`.
pub fn is_generated_id(prefix: &str, value: &str, source_document_id: Uuid) -> bool {
    generated_id(prefix, source_document_id) == value
}

fn pattern(cell: &'static OnceLock<Regex>, source: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(source).expect("static pattern"))
}

fn remit_to_pattern() -> &'static Regex {
    static P: OnceLock<Regex> = OnceLock::new();
    pattern(&P, r"(?im)(?:remit(?:\s+payment)?\s+to|payment\s+agent)\s*[:\-]?[ \t]*\r?\n?[ \t]*([^\r\n]+)")
}

fn vendor_label_pattern() -> &'static Regex {
    static P: OnceLock<Regex> = OnceLock::new();
    pattern(&P, r"(?im)\b(?:vendor|supplier)(?:\s+name)?\s*[:\-][ \t]*([^\r\n]+)")
}

fn balance_due_pattern() -> &'static Regex {
    static P: OnceLock<Regex> = OnceLock::new();
    pattern(&P, r"(?i)total\s*\(\s*account\s+balance\s*\)\s*due\s*[:\-]?\s*(?:USD)?\s*(\$?\s*[\d,]+(?:\.\d{1,2})?)")
}

fn generic_total_pattern() -> &'static Regex {
    static P: OnceLock<Regex> = OnceLock::new();
    pattern(
        &P,
        r"(?i)\b(?:total\s+amount(?:\s+due)?|amount\s+due|balance\s+due|grand\s+total|invoice\s+total|total)\s*[:\-]?\s*(?:USD)?\s*(\$?\s*[\d,]+(?:\.\d{1,2})?)",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use covenant_models::{ExtractedLineItem, ExtractedParty};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn source() -> Uuid {
        Uuid::parse_str("3f2b0c4e-8c1d-4c55-9a55-5d1b4c7d9e10").unwrap()
    }

    #[test]
    fn test_contract_fallbacks_from_nothing() {
        let mut data = ContractExtraction::default();
        let warnings = apply_contract_fallbacks(&mut data, today(), source());

        assert_eq!(warnings.len(), 4);
        assert_eq!(data.contract_id.as_deref(), Some("CTR-3F2B0C4E8C1D"));
        assert_eq!(data.effective_date, Some(today()));
        assert_eq!(data.expiration_date, NaiveDate::from_ymd_opt(2025, 6, 1));
        assert!(data.contract_title.as_deref().unwrap().contains("2024-06-01"));
    }

    #[test]
    fn test_contract_id_prefers_number() {
        let mut data = ContractExtraction {
            contract_number: Some("MSA-2024-001".into()),
            contract_title: Some("Lab Services".into()),
            effective_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            expiration_date: NaiveDate::from_ymd_opt(2023, 1, 1),
            ..Default::default()
        };
        let warnings = apply_contract_fallbacks(&mut data, today(), source());

        assert_eq!(data.contract_id.as_deref(), Some("MSA-2024-001"));
        assert_eq!(data.expiration_date, NaiveDate::from_ymd_opt(2025, 1, 1));
        let fields: Vec<_> = warnings.iter().map(|w| w.field.as_str()).collect();
        assert_eq!(fields, vec!["contract_id", "expiration_date"]);
    }

    #[test]
    fn test_fallbacks_are_idempotent() {
        let text = "Remit To: Acme Medical Supply LLC\nTotal (Account Balance) Due: $1,200.00";
        let mut invoice = InvoiceExtraction::default();
        assert_eq!(apply_invoice_fallbacks(&mut invoice, text, source()).len(), 3);
        assert!(apply_invoice_fallbacks(&mut invoice, text, source()).is_empty());

        let mut contract = ContractExtraction::default();
        apply_contract_fallbacks(&mut contract, today(), source());
        assert!(apply_contract_fallbacks(&mut contract, today(), source()).is_empty());
    }

    #[test]
    fn test_vendor_prefers_remit_to_over_vendor_label() {
        let text = "Vendor: Northwind Traders\nPlease remit payment to:\nAcme Billing Services\n";
        let mut data = InvoiceExtraction {
            invoice_id: Some("INV-1".into()),
            vendor_party_id: Some("3f2b0c4e-8c1d-4c55-9a55-5d1b4c7d9e10".into()),
            total_amount: Some(10.0),
            ..Default::default()
        };
        apply_invoice_fallbacks(&mut data, text, source());
        assert_eq!(data.vendor_party_id.as_deref(), Some("Acme Billing Services"));

        let mut data = InvoiceExtraction {
            invoice_id: Some("INV-2".into()),
            total_amount: Some(10.0),
            ..Default::default()
        };
        apply_invoice_fallbacks(&mut data, "Vendor: Northwind Traders\n", source());
        assert_eq!(data.vendor_party_id.as_deref(), Some("Northwind Traders"));

        let mut data = InvoiceExtraction::default();
        apply_invoice_fallbacks(&mut data, "nothing useful", source());
        assert_eq!(data.vendor_party_id.as_deref(), Some(UNKNOWN_VENDOR));
    }

    #[test]
    fn test_vendor_block_does_not_outrank_the_text() {
        let vendor = Some(ExtractedParty {
            legal_name: Some("Contoso Health".into()),
            ..Default::default()
        });

        let mut data = InvoiceExtraction {
            invoice_id: Some("INV-3".into()),
            total_amount: Some(10.0),
            vendor: vendor.clone(),
            ..Default::default()
        };
        apply_invoice_fallbacks(&mut data, "Remit to: Acme Billing Services\n", source());
        assert_eq!(data.vendor_party_id.as_deref(), Some("Acme Billing Services"));

        let mut data = InvoiceExtraction {
            invoice_id: Some("INV-4".into()),
            total_amount: Some(10.0),
            vendor,
            ..Default::default()
        };
        apply_invoice_fallbacks(&mut data, "", source());
        assert_eq!(data.vendor_party_id.as_deref(), Some(UNKNOWN_VENDOR));
    }

    #[test]
    fn test_generated_ids_follow_the_source_document() {
        let mut first = InvoiceExtraction::default();
        let mut second = InvoiceExtraction::default();
        apply_invoice_fallbacks(&mut first, "", source());
        apply_invoice_fallbacks(&mut second, "", source());
        assert_eq!(first.invoice_id, second.invoice_id);
        assert_eq!(first.invoice_id.as_deref(), Some("INV-3F2B0C4E8C1D"));

        let mut other = InvoiceExtraction::default();
        apply_invoice_fallbacks(&mut other, "", Uuid::new_v4());
        assert_ne!(other.invoice_id, first.invoice_id);
    }

    #[test]
    fn test_total_fallback_order() {
        let line = |amount| ExtractedLineItem {
            extended_amount: Some(amount),
            ..Default::default()
        };

        let mut data = InvoiceExtraction {
            line_items: vec![line(40.0), line(60.0)],
            ..Default::default()
        };
        apply_invoice_fallbacks(&mut data, "Total Amount: 999.00\nTotal (Account Balance) Due: 150.25", source());
        assert_eq!(data.total_amount, Some(150.25));

        let mut data = InvoiceExtraction {
            line_items: vec![line(40.0), line(60.0)],
            ..Default::default()
        };
        apply_invoice_fallbacks(&mut data, "Total Amount: 999.00", source());
        assert_eq!(data.total_amount, Some(100.0));

        let mut data = InvoiceExtraction::default();
        apply_invoice_fallbacks(&mut data, "Invoice Total: $2,310.50", source());
        assert_eq!(data.total_amount, Some(2310.5));

        let mut data = InvoiceExtraction {
            total_amount: Some(-5.0),
            ..Default::default()
        };
        apply_invoice_fallbacks(&mut data, "", source());
        assert_eq!(data.total_amount, Some(0.0));
    }
}
