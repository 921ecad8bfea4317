//! Contract domain models: contracts, their party/location edges, billable
//! items and pricing models.

use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractStatus {
    Draft,
    Active,
    Expired,
    Terminated,
}

impl ContractStatus {
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "draft" | "pending" => Some(Self::Draft),
            "active" | "executed" | "in effect" => Some(Self::Active),
            "expired" => Some(Self::Expired),
            "terminated" | "cancelled" | "canceled" => Some(Self::Terminated),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[validate(schema(function = "validate_contract_term"))]
pub struct Contract {
    pub id: Uuid,
    #[validate(length(min = 1, max = 64, message = "Contract number must be between 1 and 64 characters"))]
    pub contract_number: String,
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    pub effective_date: NaiveDate,
    pub expiration_date: NaiveDate,
    #[validate(length(equal = 3, message = "Currency must be an ISO 4217 code"))]
    pub currency: String,
    pub status: ContractStatus,
    pub payment_terms: Option<String>,
    pub source_document_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn validate_contract_term(contract: &Contract) -> Result<(), ValidationError> {
    if contract.expiration_date <= contract.effective_date {
        return Err(ValidationError::new("expiration_before_effective"));
    }
    Ok(())
}

impl Contract {
    pub fn new(
        contract_number: String,
        title: String,
        effective_date: NaiveDate,
        expiration_date: NaiveDate,
        currency: String,
    ) -> Self {
        let now = Utc::now();
        let mut contract = Self {
            id: Uuid::new_v4(),
            contract_number,
            title,
            effective_date,
            expiration_date,
            currency,
            status: ContractStatus::Active,
            payment_terms: None,
            source_document_id: None,
            created_at: now,
            updated_at: now,
        };
        contract.ensure_valid_term();
        contract
    }

    /// Enforce `expiration_date > effective_date`, defaulting the expiration
    /// to one year after the effective date. Returns true if it had to.
    pub fn ensure_valid_term(&mut self) -> bool {
        if self.expiration_date > self.effective_date {
            return false;
        }
        self.expiration_date = default_expiration(self.effective_date);
        true
    }

    /// Inclusive date-range check.
    pub fn covers(&self, date: NaiveDate) -> bool {
        date >= self.effective_date && date <= self.expiration_date
    }
}

/// `effective + 1 year`, clamped to month end for Feb 29.
pub fn default_expiration(effective: NaiveDate) -> NaiveDate {
    effective
        .checked_add_months(Months::new(12))
        .unwrap_or(effective)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartyRole {
    Vendor,
    Customer,
    PaymentAgent,
    Other,
}

impl PartyRole {
    pub fn parse(label: &str) -> Self {
        let label = label.trim().to_lowercase();
        if label.contains("vendor") || label.contains("supplier") || label.contains("seller") {
            Self::Vendor
        } else if label.contains("customer") || label.contains("buyer") || label.contains("client") {
            Self::Customer
        } else if label.contains("remit") || label.contains("payment") || label.contains("agent") {
            Self::PaymentAgent
        } else {
            Self::Other
        }
    }
}

/// Edge between a contract and one of its parties.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContractParty {
    pub id: Uuid,
    pub contract_id: Uuid,
    pub party_id: Uuid,
    pub role: PartyRole,
    pub created_at: DateTime<Utc>,
}

impl ContractParty {
    pub fn new(contract_id: Uuid, party_id: Uuid, role: PartyRole) -> Self {
        Self {
            id: Uuid::new_v4(),
            contract_id,
            party_id,
            role,
            created_at: Utc::now(),
        }
    }
}

/// Edge between a contract and a location it authorizes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContractLocation {
    pub id: Uuid,
    pub contract_id: Uuid,
    pub location_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl ContractLocation {
    pub fn new(contract_id: Uuid, location_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            contract_id,
            location_id,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarianceType {
    Absolute,
    Percentage,
}

impl VarianceType {
    pub fn parse(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "percentage" | "percent" | "pct" | "%" => Self::Percentage,
            _ => Self::Absolute,
        }
    }
}

/// A priced item on a contract.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct BillableItem {
    pub id: Uuid,
    pub contract_id: Uuid,
    #[validate(length(min = 1, max = 64))]
    pub item_code: String,
    pub description: Option<String>,
    #[validate(range(min = 0.0))]
    pub list_price: Option<f64>,
    #[validate(range(min = 0.0))]
    pub contract_price: Option<f64>,
    pub price_floor: Option<f64>,
    pub price_ceiling: Option<f64>,
    #[validate(range(min = 0.0))]
    pub allowed_variance: f64,
    pub allowed_variance_type: VarianceType,
    pub uom: Option<String>,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BillableItem {
    pub fn new(contract_id: Uuid, item_code: String, currency: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            contract_id,
            item_code,
            description: None,
            list_price: None,
            contract_price: None,
            price_floor: None,
            price_ceiling: None,
            allowed_variance: 0.0,
            allowed_variance_type: VarianceType::Absolute,
            uom: None,
            currency,
            created_at: now,
            updated_at: now,
        }
    }

    /// Contract price, falling back to list price.
    pub fn effective_price(&self) -> Option<f64> {
        self.contract_price.or(self.list_price)
    }

    /// Absolute tolerance around `effective_price`.
    pub fn tolerance(&self) -> f64 {
        match self.allowed_variance_type {
            VarianceType::Absolute => self.allowed_variance.abs(),
            VarianceType::Percentage => self
                .effective_price()
                .map(|price| price.abs() * self.allowed_variance.abs() / 100.0)
                .unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PricingModelType {
    Fixed,
    PerUnit,
    Tiered,
    Volume,
}

impl PricingModelType {
    pub fn parse(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "tiered" | "tier" => Self::Tiered,
            "volume" => Self::Volume,
            "fixed" | "flat" => Self::Fixed,
            _ => Self::PerUnit,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PricingTier {
    pub min_quantity: f64,
    pub max_quantity: Option<f64>,
    pub rate: f64,
}

/// How a billable item is priced beyond its unit price.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PricingModel {
    pub id: Uuid,
    pub contract_id: Uuid,
    pub billable_item_id: Option<Uuid>,
    pub name: String,
    pub model_type: PricingModelType,
    pub base_rate: Option<f64>,
    pub tiers: Vec<PricingTier>,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PricingModel {
    pub fn new(contract_id: Uuid, name: String, model_type: PricingModelType, currency: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            contract_id,
            billable_item_id: None,
            name,
            model_type,
            base_rate: None,
            tiers: Vec::new(),
            currency,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rate applicable at `quantity`, if the model defines one.
    pub fn rate_for(&self, quantity: f64) -> Option<f64> {
        match self.model_type {
            PricingModelType::Tiered | PricingModelType::Volume => self
                .tiers
                .iter()
                .find(|tier| {
                    quantity >= tier.min_quantity
                        && tier.max_quantity.map(|max| quantity < max).unwrap_or(true)
                })
                .map(|tier| tier.rate)
                .or(self.base_rate),
            PricingModelType::Fixed | PricingModelType::PerUnit => self.base_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_invalid_term_defaults_to_one_year() {
        let contract = Contract::new(
            "C-100".to_string(),
            "Supply Agreement".to_string(),
            date(2024, 3, 1),
            date(2023, 1, 1),
            "USD".to_string(),
        );
        assert_eq!(contract.expiration_date, date(2025, 3, 1));
        assert!(contract.validate().is_ok());
    }

    #[test]
    fn test_leap_day_expiration() {
        assert_eq!(default_expiration(date(2024, 2, 29)), date(2025, 2, 28));
    }

    #[test]
    fn test_covers_is_inclusive() {
        let contract = Contract::new(
            "C-1".to_string(),
            "T".to_string(),
            date(2024, 1, 1),
            date(2024, 12, 31),
            "USD".to_string(),
        );
        assert!(contract.covers(date(2024, 1, 1)));
        assert!(contract.covers(date(2024, 12, 31)));
        assert!(!contract.covers(date(2025, 1, 1)));
    }

    #[test]
    fn test_percentage_tolerance() {
        let mut item = BillableItem::new(Uuid::new_v4(), "SKU-1".to_string(), "USD".to_string());
        item.list_price = Some(120.0);
        item.contract_price = Some(100.0);
        item.allowed_variance = 5.0;
        item.allowed_variance_type = VarianceType::Percentage;
        assert!((item.tolerance() - 5.0).abs() < f64::EPSILON);

        item.contract_price = None;
        assert!((item.tolerance() - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_tiered_rate() {
        let mut model = PricingModel::new(
            Uuid::new_v4(),
            "Volume".to_string(),
            PricingModelType::Tiered,
            "USD".to_string(),
        );
        model.base_rate = Some(10.0);
        model.tiers = vec![
            PricingTier { min_quantity: 0.0, max_quantity: Some(100.0), rate: 10.0 },
            PricingTier { min_quantity: 100.0, max_quantity: None, rate: 8.0 },
        ];
        assert_eq!(model.rate_for(50.0), Some(10.0));
        assert_eq!(model.rate_for(100.0), Some(8.0));
    }

    #[test]
    fn test_party_role_parse() {
        assert_eq!(PartyRole::parse("Supplier"), PartyRole::Vendor);
        assert_eq!(PartyRole::parse("Remit To"), PartyRole::PaymentAgent);
        assert_eq!(PartyRole::parse("Buyer"), PartyRole::Customer);
        assert_eq!(PartyRole::parse("witness"), PartyRole::Other);
    }
}
