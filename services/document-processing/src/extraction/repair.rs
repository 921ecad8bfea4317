//! Tolerant JSON parsing for model replies.
//!
//! Three tiers, tried in order: strict parse of the JSON object embedded in
//! the reply, structural repair (close an unterminated string, drop trailing
//! commas, balance brackets, trim a truncated tail), and finally regex
//! salvage of a few named fields.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use covenant_models::RepairTier;

/// Longest run of truncation the structural tier will try to cut back.
const MAX_TRUNCATION_STEPS: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct Repaired {
    /// `None` when nothing at all could be recovered.
    pub value: Option<Value>,
    pub tier: RepairTier,
}

pub fn parse_tolerant(raw: &str, salvage_keys: &[&str]) -> Repaired {
    let candidate = embedded_object(raw);

    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(candidate) {
        return Repaired {
            value: Some(value),
            tier: RepairTier::Strict,
        };
    }

    // A truncated reply keeps content after its last `}`, so try the open tail first.
    let repaired = structural_repair(open_tail(raw)).or_else(|| structural_repair(candidate));
    if let Some(value) = repaired {
        return Repaired {
            value: Some(value),
            tier: RepairTier::Structural,
        };
    }

    let salvaged = salvage_fields(raw, salvage_keys);
    Repaired {
        value: (!salvaged.is_empty()).then(|| Value::Object(salvaged)),
        tier: RepairTier::Salvaged,
    }
}

/// The reply from its first `{` to its last `}`, ignoring prose and code fences.
fn embedded_object(raw: &str) -> &str {
    let Some(start) = raw.find('{') else {
        return raw.trim();
    };
    match raw.rfind('}') {
        Some(end) if end > start => &raw[start..=end],
        _ => &raw[start..],
    }
}

/// Everything from the first `{`, minus a closing code fence.
fn open_tail(raw: &str) -> &str {
    let tail = raw.find('{').map(|start| &raw[start..]).unwrap_or(raw).trim_end();
    tail.strip_suffix("```").unwrap_or(tail).trim_end()
}

fn structural_repair(candidate: &str) -> Option<Value> {
    let mut text = candidate.to_string();

    for _ in 0..MAX_TRUNCATION_STEPS {
        if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(&balance(&text)) {
            return Some(value);
        }
        // Cut back to the last separator outside a string and try again.
        let cut = last_separator(&text)?;
        text.truncate(cut);
    }

    None
}

/// Close an open string, drop dangling separators and close open brackets.
fn balance(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut closers: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        out.push(c);
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => closers.push('}'),
            '[' => closers.push(']'),
            '}' | ']' => {
                if closers.last() == Some(&c) {
                    closers.pop();
                }
            }
            _ => {}
        }
    }

    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }

    let trimmed_len = out.trim_end().len();
    out.truncate(trimmed_len);
    if out.ends_with(',') {
        out.pop();
    } else if out.ends_with(':') {
        out.push_str("null");
    }

    while let Some(closer) = closers.pop() {
        out.push(closer);
    }

    trailing_comma_regex().replace_all(&out, "$1").into_owned()
}

/// Byte offset of the last `,` outside a string, if any.
fn last_separator(text: &str) -> Option<usize> {
    let mut in_string = false;
    let mut escaped = false;
    let mut last = None;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            ',' => last = Some(i),
            _ => {}
        }
    }

    last
}

fn trailing_comma_regex() -> &'static Regex {
    static TRAILING: OnceLock<Regex> = OnceLock::new();
    TRAILING.get_or_init(|| Regex::new(r",\s*([}\]])").expect("static pattern"))
}

/// Pull `"key": <scalar>` pairs straight out of text that will not parse.
pub fn salvage_fields(raw: &str, keys: &[&str]) -> Map<String, Value> {
    let mut fields = Map::new();

    for key in keys {
        let pattern = format!(
            r#""{}"\s*:\s*("(?:[^"\\]|\\.)*"|-?\d+(?:\.\d+)?)"#,
            regex::escape(key)
        );
        let Ok(re) = Regex::new(&pattern) else {
            continue;
        };
        let Some(captured) = re.captures(raw).and_then(|c| c.get(1)) else {
            continue;
        };
        if let Ok(value) = serde_json::from_str::<Value>(captured.as_str()) {
            if !value.is_null() && value.as_str().map(|s| !s.trim().is_empty()).unwrap_or(true) {
                fields.insert((*key).to_string(), value);
            }
        }
    }

    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_strict_with_prose_and_fences() {
        let raw = "Here you go:\n```json\n{\"invoice_id\": \"INV-1\", \"total_amount\": 10.5}\n```";
        let repaired = parse_tolerant(raw, &[]);
        assert_eq!(repaired.tier, RepairTier::Strict);
        assert_eq!(repaired.value.unwrap()["total_amount"], json!(10.5));
    }

    #[test]
    fn test_unterminated_string_is_closed() {
        let raw = r#"{"invoice_id": "INV-9", "vendor_party_id": "Acme Medi"#;
        let repaired = parse_tolerant(raw, &[]);
        assert_eq!(repaired.tier, RepairTier::Structural);
        let value = repaired.value.unwrap();
        assert_eq!(value["invoice_id"], json!("INV-9"));
        assert_eq!(value["vendor_party_id"], json!("Acme Medi"));
    }

    #[test]
    fn test_trailing_commas_and_open_brackets() {
        let raw = r#"{"line_items": [{"quantity": 2, "unit_price": 5,}, {"quantity": 1"#;
        let value = parse_tolerant(raw, &[]).value.unwrap();
        assert_eq!(value["line_items"].as_array().unwrap().len(), 2);
        assert_eq!(value["line_items"][0]["unit_price"], json!(5));
    }

    #[test]
    fn test_truncated_key_is_cut_back() {
        let raw = r#"{"contract_id": "C-1", "currency": "USD", "effective_da"#;
        let repaired = parse_tolerant(raw, &[]);
        assert_eq!(repaired.tier, RepairTier::Structural);
        let value = repaired.value.unwrap();
        assert_eq!(value["currency"], json!("USD"));
        assert!(value.get("effective_da").is_none());
    }

    #[test]
    fn test_salvage_when_structure_is_hopeless() {
        let raw = r#"invoice_id": "INV-77" ]]] total_amount": x "total_amount": 1520.75 }}"#;
        let repaired = parse_tolerant(raw, &["invoice_id", "total_amount", "vendor_party_id"]);
        assert_eq!(repaired.tier, RepairTier::Salvaged);
        let value = repaired.value.unwrap();
        assert_eq!(value["total_amount"], json!(1520.75));
        assert!(value.get("vendor_party_id").is_none());
    }

    #[test]
    fn test_nothing_recoverable() {
        let repaired = parse_tolerant("I could not read this document.", &["invoice_id"]);
        assert_eq!(repaired.tier, RepairTier::Salvaged);
        assert!(repaired.value.is_none());
    }

    #[test]
    fn test_escaped_quotes_do_not_confuse_balance() {
        let raw = r#"{"contract_title": "The \"Master\" Agreement", "currency": "US"#;
        let value = parse_tolerant(raw, &[]).value.unwrap();
        assert_eq!(value["contract_title"], json!("The \"Master\" Agreement"));
    }

    proptest! {
        #[test]
        fn truncated_replies_never_yield_non_objects(cut in 0usize..200) {
            let full = r#"{"invoice_id": "INV-77", "vendor_party_id": "Acme, Inc.", "line_items": [{"item_code": "A-1", "quantity": 2, "unit_price": 9.5}], "total_amount": 19.0}"#;
            let prefix: String = full.chars().take(cut).collect();
            let repaired = parse_tolerant(&prefix, &["invoice_id", "total_amount"]);
            if let Some(value) = repaired.value {
                prop_assert!(value.is_object());
            }
            if cut >= full.chars().count() {
                prop_assert_eq!(repaired.tier, RepairTier::Strict);
            }
        }
    }
}
