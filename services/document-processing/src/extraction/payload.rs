//! Field-by-field decoding of model payloads.
//!
//! The model's JSON is never deserialized wholesale. Each declared field is
//! read on its own; a field of the wrong shape is dropped and reported in
//! `field_errors` instead of failing the whole document.

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};

use covenant_models::{
    ContractExtraction, ExtractedBillableItem, ExtractedLineItem, ExtractedLocation, ExtractedParty,
    ExtractedPricingModel, ExtractedPricingTier, InvoiceExtraction,
};

const DATE_FORMATS: [&str; 8] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%d-%b-%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
];

const PLACEHOLDERS: [&str; 7] = ["", "null", "none", "n/a", "na", "...", "unknown"];

/// A decoded payload plus whatever the envelope said about it.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded<T> {
    pub data: T,
    pub field_errors: Vec<String>,
    /// Self-reported confidence from the metadata envelope.
    pub model_confidence: Option<f64>,
    pub source_pages: Vec<u32>,
}

pub fn decode_contract(value: &Value) -> Decoded<ContractExtraction> {
    let (body, meta) = envelope(value);
    let mut r = FieldReader::default();

    let data = ContractExtraction {
        contract_id: r.string(body, "", "contract_id"),
        contract_number: r.string(body, "", "contract_number"),
        contract_title: r.string(body, "", "contract_title"),
        effective_date: r.date(body, "", "effective_date"),
        expiration_date: r.date(body, "", "expiration_date"),
        currency: r.string(body, "", "currency").map(|c| c.to_uppercase()),
        status: r.string(body, "", "status"),
        payment_terms: r.string(body, "", "payment_terms"),
        parties: r
            .objects(body, "", "parties")
            .into_iter()
            .map(|(path, obj)| r.party(obj, &path))
            .collect(),
        locations: r
            .objects(body, "", "locations")
            .into_iter()
            .map(|(path, obj)| r.location(obj, &path))
            .filter(|location| !location.is_empty())
            .collect(),
        billable_items: r
            .objects(body, "", "billable_items")
            .into_iter()
            .map(|(path, obj)| r.billable_item(obj, &path))
            .collect(),
    };

    r.finish(data, meta)
}

pub fn decode_invoice(value: &Value) -> Decoded<InvoiceExtraction> {
    let (body, meta) = envelope(value);
    let mut r = FieldReader::default();

    let data = InvoiceExtraction {
        invoice_id: r.string(body, "", "invoice_id"),
        invoice_date: r.date(body, "", "invoice_date"),
        due_date: r.date(body, "", "due_date"),
        service_date: r.date(body, "", "service_date"),
        vendor_party_id: r.string(body, "", "vendor_party_id"),
        vendor: r.object(body, "", "vendor").map(|obj| r.party(obj, "vendor")),
        customer: r.object(body, "", "customer").map(|obj| r.party(obj, "customer")),
        contract_reference: r.string(body, "", "contract_reference"),
        purchase_order: r.string(body, "", "purchase_order"),
        currency: r.string(body, "", "currency").map(|c| c.to_uppercase()),
        total_amount: r.number(body, "", "total_amount"),
        net_amount: r.number(body, "", "net_amount"),
        tax_amount: r.number(body, "", "tax_amount"),
        location: r
            .object(body, "", "location")
            .map(|obj| r.location(obj, "location"))
            .filter(|location| !location.is_empty()),
        line_items: r
            .objects(body, "", "line_items")
            .into_iter()
            .map(|(path, obj)| r.line_item(obj, &path))
            .collect(),
    };

    r.finish(data, meta)
}

/// `{"data": {...}, "metadata": {...}}` or a bare object.
fn envelope(value: &Value) -> (&Map<String, Value>, Option<&Map<String, Value>>) {
    static EMPTY: std::sync::OnceLock<Map<String, Value>> = std::sync::OnceLock::new();
    let empty = EMPTY.get_or_init(Map::new);

    let Some(root) = value.as_object() else {
        return (empty, None);
    };
    let meta = root.get("metadata").and_then(Value::as_object);
    match root.get("data").and_then(Value::as_object) {
        Some(body) => (body, meta),
        None => (root, meta),
    }
}

/// Parse a money amount written the way documents write them:
/// `1520.75`, `$1,520.75`, `USD 1 520.75`, `(35.00)` for negatives.
pub fn parse_amount(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    let negative = trimmed.starts_with('(') && trimmed.ends_with(')') || trimmed.starts_with('-');
    let digits: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if digits.is_empty() || digits.matches('.').count() > 1 {
        return None;
    }

    let amount: f64 = digits.parse().ok()?;
    if !amount.is_finite() {
        return None;
    }
    Some(if negative { -amount } else { amount })
}

pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if let Some(date) = DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
    {
        return Some(date);
    }
    // Timestamps: keep the date part.
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S")
        .map(|dt| dt.date())
        .ok()
        .or_else(|| text.get(..10).and_then(|head| NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()))
}

#[derive(Default)]
struct FieldReader {
    errors: Vec<String>,
}

impl FieldReader {
    fn finish<T>(self, data: T, meta: Option<&Map<String, Value>>) -> Decoded<T> {
        let model_confidence = meta
            .and_then(|m| m.get("confidence"))
            .and_then(Value::as_f64)
            .filter(|c| c.is_finite());
        let source_pages = meta
            .and_then(|m| m.get("source_pages"))
            .and_then(Value::as_array)
            .map(|pages| {
                pages
                    .iter()
                    .filter_map(Value::as_u64)
                    .filter_map(|p| u32::try_from(p).ok())
                    .collect()
            })
            .unwrap_or_default();

        Decoded {
            data,
            field_errors: self.errors,
            model_confidence,
            source_pages,
        }
    }

    fn reject(&mut self, path: &str, key: &str, expected: &str) {
        let field = if path.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", path, key)
        };
        self.errors.push(format!("{}: expected {}", field, expected));
    }

    fn string(&mut self, obj: &Map<String, Value>, path: &str, key: &str) -> Option<String> {
        match obj.get(key)? {
            Value::Null => None,
            Value::String(s) => {
                let s = s.trim();
                (!PLACEHOLDERS.contains(&s.to_lowercase().as_str())).then(|| s.to_string())
            }
            Value::Number(n) => Some(n.to_string()),
            _ => {
                self.reject(path, key, "text");
                None
            }
        }
    }

    fn number(&mut self, obj: &Map<String, Value>, path: &str, key: &str) -> Option<f64> {
        let parsed = match obj.get(key)? {
            Value::Null => return None,
            Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
            Value::String(s) if PLACEHOLDERS.contains(&s.trim().to_lowercase().as_str()) => return None,
            Value::String(s) => parse_amount(s),
            _ => None,
        };
        if parsed.is_none() {
            self.reject(path, key, "a number");
        }
        parsed
    }

    fn count(&mut self, obj: &Map<String, Value>, path: &str, key: &str) -> Option<u32> {
        let number = self.number(obj, path, key)?;
        if number < 0.0 || number.fract() != 0.0 || number > u32::MAX as f64 {
            self.reject(path, key, "a whole number");
            return None;
        }
        Some(number as u32)
    }

    fn date(&mut self, obj: &Map<String, Value>, path: &str, key: &str) -> Option<NaiveDate> {
        let text = self.string(obj, path, key)?;
        let parsed = parse_date(&text);
        if parsed.is_none() {
            self.reject(path, key, "a date");
        }
        parsed
    }

    fn object<'v>(&mut self, obj: &'v Map<String, Value>, path: &str, key: &str) -> Option<&'v Map<String, Value>> {
        match obj.get(key)? {
            Value::Null => None,
            Value::Object(inner) => Some(inner),
            _ => {
                self.reject(path, key, "an object");
                None
            }
        }
    }

    /// Elements of an array of objects, each with its display path.
    fn objects<'v>(
        &mut self,
        obj: &'v Map<String, Value>,
        path: &str,
        key: &str,
    ) -> Vec<(String, &'v Map<String, Value>)> {
        let items = match obj.get(key) {
            None | Some(Value::Null) => return Vec::new(),
            Some(Value::Array(items)) => items,
            Some(_) => {
                self.reject(path, key, "a list");
                return Vec::new();
            }
        };

        let mut out = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let item_path = format!("{}[{}]", key, index);
            match item.as_object() {
                Some(inner) => out.push((item_path, inner)),
                None => self.errors.push(format!("{}: expected an object", item_path)),
            }
        }
        out
    }

    fn party(&mut self, obj: &Map<String, Value>, path: &str) -> ExtractedParty {
        ExtractedParty {
            party_id: self.string(obj, path, "party_id"),
            legal_name: self
                .string(obj, path, "legal_name")
                .or_else(|| self.string(obj, path, "name")),
            trading_name: self.string(obj, path, "trading_name"),
            role: self.string(obj, path, "role"),
            tax_id: self.string(obj, path, "tax_id"),
            duns: self.string(obj, path, "duns"),
            npi: self.string(obj, path, "npi"),
            email: self.string(obj, path, "email"),
            phone: self.string(obj, path, "phone"),
            address: self.string(obj, path, "address"),
        }
    }

    fn location(&mut self, obj: &Map<String, Value>, path: &str) -> ExtractedLocation {
        ExtractedLocation {
            name: self.string(obj, path, "name"),
            address: self.string(obj, path, "address"),
            city: self.string(obj, path, "city"),
            state: self.string(obj, path, "state"),
            postal_code: self.string(obj, path, "postal_code"),
            country: self.string(obj, path, "country"),
        }
    }

    fn billable_item(&mut self, obj: &Map<String, Value>, path: &str) -> ExtractedBillableItem {
        let pricing_model = self.object(obj, path, "pricing_model").map(|model| {
            let model_path = format!("{}.pricing_model", path);
            ExtractedPricingModel {
                name: self.string(model, &model_path, "name"),
                model_type: self.string(model, &model_path, "model_type"),
                base_rate: self.number(model, &model_path, "base_rate"),
                tiers: self
                    .objects(model, &model_path, "tiers")
                    .into_iter()
                    .map(|(tier_path, tier)| ExtractedPricingTier {
                        min_quantity: self.number(tier, &tier_path, "min_quantity"),
                        max_quantity: self.number(tier, &tier_path, "max_quantity"),
                        rate: self.number(tier, &tier_path, "rate"),
                    })
                    .collect(),
            }
        });

        ExtractedBillableItem {
            item_code: self.string(obj, path, "item_code"),
            description: self.string(obj, path, "description"),
            list_price: self.number(obj, path, "list_price"),
            contract_price: self.number(obj, path, "contract_price"),
            price_floor: self.number(obj, path, "price_floor"),
            price_ceiling: self.number(obj, path, "price_ceiling"),
            allowed_variance: self.number(obj, path, "allowed_variance"),
            allowed_variance_type: self.string(obj, path, "allowed_variance_type"),
            uom: self.string(obj, path, "uom"),
            currency: self.string(obj, path, "currency").map(|c| c.to_uppercase()),
            pricing_model,
        }
    }

    fn line_item(&mut self, obj: &Map<String, Value>, path: &str) -> ExtractedLineItem {
        ExtractedLineItem {
            line_number: self.count(obj, path, "line_number"),
            item_code: self.string(obj, path, "item_code"),
            description: self.string(obj, path, "description"),
            quantity: self.number(obj, path, "quantity"),
            unit_price: self.number(obj, path, "unit_price"),
            extended_amount: self.number(obj, path, "extended_amount"),
            uom: self.string(obj, path, "uom"),
            service_date: self.date(obj, path, "service_date"),
        }
    }
}
