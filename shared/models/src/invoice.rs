//! Invoice and invoice line item models.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::validation::ValidationStatus;

/// Business status of an invoice as seen by accounts payable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceStatus {
    Received,
    Validated,
    PendingApproval,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Invoice {
    pub id: Uuid,
    pub invoice_number: String,
    pub vendor_party_id: Uuid,
    pub customer_party_id: Option<Uuid>,
    pub contract_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub invoice_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub service_date: Option<NaiveDate>,
    pub currency: Option<String>,
    pub gross_amount: f64,
    pub net_amount: Option<f64>,
    pub tax_amount: Option<f64>,
    pub purchase_order: Option<String>,
    pub current_status: InvoiceStatus,
    pub validation_status: Option<ValidationStatus>,
    pub source_document_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    pub fn new(invoice_number: String, vendor_party_id: Uuid, gross_amount: f64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            invoice_number,
            vendor_party_id,
            customer_party_id: None,
            contract_id: None,
            location_id: None,
            invoice_date: None,
            due_date: None,
            service_date: None,
            currency: None,
            gross_amount,
            net_amount: None,
            tax_amount: None,
            purchase_order: None,
            current_status: InvoiceStatus::Received,
            validation_status: None,
            source_document_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Net amount when stated, otherwise the gross amount.
    pub fn stated_amount(&self) -> f64 {
        self.net_amount.unwrap_or(self.gross_amount)
    }

    /// Date used for contract term checks: service date first.
    pub fn effective_date(&self) -> Option<NaiveDate> {
        self.service_date.or(self.invoice_date)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvoiceLineItem {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub line_number: u32,
    pub billable_item_id: Option<Uuid>,
    pub item_code: Option<String>,
    pub description: Option<String>,
    pub quantity: f64,
    pub unit_price: f64,
    pub extended_amount: f64,
    pub uom: Option<String>,
    pub service_date: Option<NaiveDate>,
    /// Invoiced unit price minus contract price, when matched.
    pub price_variance: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl InvoiceLineItem {
    pub fn new(invoice_id: Uuid, line_number: u32, quantity: f64, unit_price: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            invoice_id,
            line_number,
            billable_item_id: None,
            item_code: None,
            description: None,
            quantity,
            unit_price,
            extended_amount: quantity * unit_price,
            uom: None,
            service_date: None,
            price_variance: None,
            created_at: Utc::now(),
        }
    }
}
