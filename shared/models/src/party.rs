//! Party and location models.
//!
//! Parties are resolved by match-or-create during normalization. Once a field
//! is populated it is never overwritten by a later extraction; later documents
//! can only fill gaps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartyType {
    Vendor,
    Customer,
    PaymentAgent,
    Other,
}

/// A legal entity referenced by contracts and invoices.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct Party {
    pub id: Uuid,
    #[validate(length(min = 1, max = 255, message = "Legal name must be between 1 and 255 characters"))]
    pub legal_name: String,
    #[validate(length(max = 255))]
    pub trading_name: Option<String>,
    pub party_type: PartyType,
    #[validate(length(max = 64))]
    pub tax_id: Option<String>,
    #[validate(length(max = 64))]
    pub duns_number: Option<String>,
    #[validate(length(max = 64))]
    pub npi: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Party {
    pub fn new(legal_name: String, party_type: PartyType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            legal_name,
            trading_name: None,
            party_type,
            tax_id: None,
            duns_number: None,
            npi: None,
            email: None,
            phone: None,
            address: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Case-insensitive substring match against legal or trading name,
    /// in either direction.
    pub fn name_matches(&self, candidate: &str) -> bool {
        let candidate = candidate.trim().to_lowercase();
        if candidate.is_empty() {
            return false;
        }

        std::iter::once(&self.legal_name)
            .chain(self.trading_name.iter())
            .map(|name| name.to_lowercase())
            .any(|name| name.contains(&candidate) || candidate.contains(&name))
    }

    /// Copy every field that is empty here but populated on `other`.
    /// Returns true if anything changed.
    pub fn enrich_from(&mut self, other: &Party) -> bool {
        let mut changed = false;
        changed |= fill(&mut self.trading_name, &other.trading_name);
        changed |= fill(&mut self.tax_id, &other.tax_id);
        changed |= fill(&mut self.duns_number, &other.duns_number);
        changed |= fill(&mut self.npi, &other.npi);
        changed |= fill(&mut self.email, &other.email);
        changed |= fill(&mut self.phone, &other.phone);
        changed |= fill(&mut self.address, &other.address);

        if changed {
            self.updated_at = Utc::now();
        }
        changed
    }
}

fn fill(target: &mut Option<String>, source: &Option<String>) -> bool {
    match (target.as_ref(), source.as_ref()) {
        (None, Some(value)) if !value.trim().is_empty() => {
            *target = Some(value.clone());
            true
        }
        _ => false,
    }
}

/// A service or delivery location named on contracts and invoices.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct Location {
    pub id: Uuid,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub address_line: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Location {
    pub fn new(name: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            address_line: None,
            city: None,
            state: None,
            postal_code: None,
            country: None,
            created_at: Utc::now(),
        }
    }

    /// Same place if the names agree, or the street address and postal code agree.
    pub fn same_place(&self, other: &Location) -> bool {
        if self.name.trim().eq_ignore_ascii_case(other.name.trim()) {
            return true;
        }

        match (
            (&self.address_line, &self.postal_code),
            (&other.address_line, &other.postal_code),
        ) {
            ((Some(a1), Some(p1)), (Some(a2), Some(p2))) => {
                a1.trim().eq_ignore_ascii_case(a2.trim()) && p1.trim() == p2.trim()
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_matches_substring_both_ways() {
        let mut party = Party::new("Acme Medical Supply, Inc.".to_string(), PartyType::Vendor);
        party.trading_name = Some("ACME".to_string());

        assert!(party.name_matches("acme medical supply"));
        assert!(party.name_matches("Acme"));
        assert!(party.name_matches("ACME Medical Supply, Inc. (Remit)"));
        assert!(!party.name_matches("Globex"));
        assert!(!party.name_matches("  "));
    }

    #[test]
    fn test_enrich_never_overwrites() {
        let mut existing = Party::new("Acme".to_string(), PartyType::Vendor);
        existing.tax_id = Some("12-3456789".to_string());

        let mut incoming = Party::new("Acme".to_string(), PartyType::Vendor);
        incoming.tax_id = Some("99-9999999".to_string());
        incoming.duns_number = Some("123456789".to_string());

        assert!(existing.enrich_from(&incoming));
        assert_eq!(existing.tax_id.as_deref(), Some("12-3456789"));
        assert_eq!(existing.duns_number.as_deref(), Some("123456789"));

        assert!(!existing.enrich_from(&incoming));
    }

    #[test]
    fn test_location_same_place() {
        let mut a = Location::new("North Clinic".to_string());
        let b = Location::new("north clinic ".to_string());
        assert!(a.same_place(&b));

        a.address_line = Some("1 Main St".to_string());
        a.postal_code = Some("10001".to_string());
        let mut c = Location::new("Clinic #1".to_string());
        c.address_line = Some("1 MAIN ST".to_string());
        c.postal_code = Some("10001".to_string());
        assert!(a.same_place(&c));
    }
}
