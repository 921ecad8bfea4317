//! Extraction payload models.
//!
//! These are the typed shapes the extraction gateway produces from untrusted
//! model output. Every field is optional: the gateway fills required fields
//! through its fallback policy and the normalizer never assumes more than that.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::document::DocumentType;

/// What the classifier thinks a document is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectedDocumentType {
    Contract,
    Invoice,
    Other(String),
}

impl DetectedDocumentType {
    pub fn parse(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "contract" | "agreement" => Self::Contract,
            "invoice" | "bill" => Self::Invoice,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_document_type(&self) -> Option<DocumentType> {
        match self {
            Self::Contract => Some(DocumentType::Contract),
            Self::Invoice => Some(DocumentType::Invoice),
            Self::Other(_) => None,
        }
    }
}

impl std::fmt::Display for DetectedDocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Contract => write!(f, "contract"),
            Self::Invoice => write!(f, "invoice"),
            Self::Other(label) if label.is_empty() => write!(f, "unknown"),
            Self::Other(label) => write!(f, "{}", label),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    Model,
    Heuristic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDetection {
    pub detected: DetectedDocumentType,
    pub confidence: f64,
    pub method: DetectionMethod,
}

/// Which tier of the tolerant parser produced the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairTier {
    /// Parsed as-is (after stripping prose and code fences).
    Strict,
    /// Parsed after quote/bracket balancing.
    Structural,
    /// Nothing parsed; an empty skeleton plus regex-salvaged fields.
    Salvaged,
}

/// A substitute value the gateway had to apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionWarning {
    pub field: String,
    pub message: String,
    pub penalty: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionMetadata {
    pub model: String,
    pub page_count: Option<u32>,
    pub source_pages: Vec<u32>,
    pub repair_tier: RepairTier,
    pub warnings: Vec<ExtractionWarning>,
    pub field_errors: Vec<String>,
    pub requires_human_review: bool,
    pub extracted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub success: bool,
    pub data: ExtractedDocument,
    pub confidence: f64,
    pub errors: Vec<String>,
    pub metadata: ExtractionMetadata,
}

impl ExtractionResult {
    pub fn document_type(&self) -> DocumentType {
        match self.data {
            ExtractedDocument::Contract(_) => DocumentType::Contract,
            ExtractedDocument::Invoice(_) => DocumentType::Invoice,
        }
    }
}

/// Tagged union of the two extraction schemas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "document_type", rename_all = "snake_case")]
pub enum ExtractedDocument {
    Contract(ContractExtraction),
    Invoice(InvoiceExtraction),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedParty {
    pub party_id: Option<String>,
    pub legal_name: Option<String>,
    pub trading_name: Option<String>,
    pub role: Option<String>,
    pub tax_id: Option<String>,
    pub duns: Option<String>,
    pub npi: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedLocation {
    pub name: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

impl ExtractedLocation {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.address.is_none() && self.city.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedPricingTier {
    pub min_quantity: Option<f64>,
    pub max_quantity: Option<f64>,
    pub rate: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedPricingModel {
    pub name: Option<String>,
    pub model_type: Option<String>,
    pub base_rate: Option<f64>,
    pub tiers: Vec<ExtractedPricingTier>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedBillableItem {
    pub item_code: Option<String>,
    pub description: Option<String>,
    pub list_price: Option<f64>,
    pub contract_price: Option<f64>,
    pub price_floor: Option<f64>,
    pub price_ceiling: Option<f64>,
    pub allowed_variance: Option<f64>,
    pub allowed_variance_type: Option<String>,
    pub uom: Option<String>,
    pub currency: Option<String>,
    pub pricing_model: Option<ExtractedPricingModel>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractExtraction {
    pub contract_id: Option<String>,
    pub contract_number: Option<String>,
    pub contract_title: Option<String>,
    pub effective_date: Option<NaiveDate>,
    pub expiration_date: Option<NaiveDate>,
    pub currency: Option<String>,
    pub status: Option<String>,
    pub payment_terms: Option<String>,
    pub parties: Vec<ExtractedParty>,
    pub locations: Vec<ExtractedLocation>,
    pub billable_items: Vec<ExtractedBillableItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedLineItem {
    pub line_number: Option<u32>,
    pub item_code: Option<String>,
    pub description: Option<String>,
    pub quantity: Option<f64>,
    pub unit_price: Option<f64>,
    pub extended_amount: Option<f64>,
    pub uom: Option<String>,
    pub service_date: Option<NaiveDate>,
}

impl ExtractedLineItem {
    /// Extended amount as stated, or quantity × unit price.
    pub fn amount(&self) -> Option<f64> {
        self.extended_amount.or_else(|| match (self.quantity, self.unit_price) {
            (Some(q), Some(p)) => Some(q * p),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceExtraction {
    pub invoice_id: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub service_date: Option<NaiveDate>,
    pub vendor_party_id: Option<String>,
    pub vendor: Option<ExtractedParty>,
    pub customer: Option<ExtractedParty>,
    pub contract_reference: Option<String>,
    pub purchase_order: Option<String>,
    pub currency: Option<String>,
    pub total_amount: Option<f64>,
    pub net_amount: Option<f64>,
    pub tax_amount: Option<f64>,
    pub location: Option<ExtractedLocation>,
    pub line_items: Vec<ExtractedLineItem>,
}
