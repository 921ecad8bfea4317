use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use covenant_models::{
    BillableItem, Contract, ExtractedLineItem, ExtractedParty, Invoice, InvoiceExtraction, InvoiceLineItem,
    PartyType,
};
use covenant_utils::{clean_identifier, is_identifier_shaped, CovenantError, CovenantResult};

use super::contracts::currency_or_default;
use super::{resolve_location, EntityNormalizer};
use crate::extraction::fallback::{is_generated_id, INVOICE_ID_PREFIX};

impl EntityNormalizer {
    pub async fn normalize_invoice(
        &self,
        data: &InvoiceExtraction,
        source_document_id: Option<Uuid>,
        prior_invoice_id: Option<Uuid>,
    ) -> CovenantResult<Uuid> {
        let number = data
            .invoice_id
            .as_deref()
            .and_then(clean_identifier)
            .ok_or_else(|| CovenantError::business_rule("invoice has no usable identifier"))?;

        let vendor_source = ExtractedParty {
            legal_name: data
                .vendor_party_id
                .clone()
                .or_else(|| data.vendor.as_ref().and_then(|v| v.legal_name.clone())),
            ..data.vendor.clone().unwrap_or_default()
        };
        let vendor = self
            .parties
            .resolve(&vendor_source, PartyType::Vendor)
            .await?
            .ok_or_else(|| CovenantError::business_rule("invoice vendor could not be resolved"))?;

        let customer = match &data.customer {
            Some(customer) => self.parties.resolve(customer, PartyType::Customer).await?,
            None => None,
        };
        let location = match &data.location {
            Some(location) => resolve_location(&self.store, location).await?,
            None => None,
        };

        let effective_date = data.service_date.or(data.invoice_date);
        let contract = self
            .match_contract(data.contract_reference.as_deref(), vendor.id, effective_date)
            .await?;

        let existing = match self.store.find_invoice_by_number(&number).await? {
            Some(found) => Some(found),
            None => match prior_invoice_id {
                Some(prior_id) => self.store.get_invoice(prior_id).await?.map(|mut prior| {
                    // Keep the earlier number over one made up for this document.
                    let generated = source_document_id
                        .map(|id| is_generated_id(INVOICE_ID_PREFIX, &number, id))
                        .unwrap_or(false);
                    if !generated {
                        prior.invoice_number = number.clone();
                    }
                    prior
                }),
                None => None,
            },
        };
        let (mut invoice, exists) = match existing {
            Some(existing) => (existing, true),
            None => (Invoice::new(number, vendor.id, 0.0), false),
        };

        invoice.vendor_party_id = vendor.id;
        invoice.customer_party_id = customer.map(|c| c.id).or(invoice.customer_party_id);
        invoice.location_id = location.map(|l| l.id).or(invoice.location_id);
        invoice.contract_id = contract.as_ref().map(|c| c.id);
        invoice.invoice_date = data.invoice_date;
        invoice.due_date = data.due_date;
        invoice.service_date = data.service_date;
        invoice.currency = data
            .currency
            .as_deref()
            .map(|c| currency_or_default(Some(c)))
            .or_else(|| contract.as_ref().map(|c| c.currency.clone()));
        invoice.gross_amount = data.total_amount.filter(|v| v.is_finite()).unwrap_or(0.0);
        invoice.net_amount = data.net_amount.filter(|v| v.is_finite());
        invoice.tax_amount = data.tax_amount.filter(|v| v.is_finite());
        invoice.purchase_order = data.purchase_order.clone();
        invoice.source_document_id = invoice.source_document_id.or(source_document_id);

        if exists {
            invoice.updated_at = Utc::now();
            self.store.update_invoice(&invoice).await?;
            tracing::info!(invoice_id = %invoice.id, invoice_number = %invoice.invoice_number, "Updated invoice");
        } else {
            self.store.insert_invoice(&invoice).await?;
            tracing::info!(
                invoice_id = %invoice.id,
                invoice_number = %invoice.invoice_number,
                contract_matched = invoice.contract_id.is_some(),
                "Created invoice"
            );
        }

        let items = match &contract {
            Some(contract) => self.store.list_billable_items(contract.id).await?,
            None => Vec::new(),
        };
        let lines: Vec<InvoiceLineItem> = data
            .line_items
            .iter()
            .enumerate()
            .map(|(index, source)| build_line(invoice.id, index, source, &items))
            .collect();
        self.store.replace_line_items(invoice.id, &lines).await?;

        Ok(invoice.id)
    }

    /// Contract reference first, then the vendor's contracts in force on the
    /// invoice date, latest effective date winning.
    async fn match_contract(
        &self,
        reference: Option<&str>,
        vendor_id: Uuid,
        effective_date: Option<NaiveDate>,
    ) -> CovenantResult<Option<Contract>> {
        if let Some(reference) = reference
            .and_then(clean_identifier)
            .filter(|r| is_identifier_shaped(r))
        {
            if let Some(contract) = self.store.find_contract_by_number(&reference).await? {
                return Ok(Some(contract));
            }
            tracing::debug!(reference = %reference, "Contract reference did not match a stored contract");
        }

        let Some(date) = effective_date else {
            return Ok(None);
        };
        let contract = self
            .store
            .find_contracts_for_party(vendor_id)
            .await?
            .into_iter()
            .filter(|c| c.covers(date))
            .max_by_key(|c| c.effective_date);
        Ok(contract)
    }
}

fn build_line(invoice_id: Uuid, index: usize, source: &ExtractedLineItem, items: &[BillableItem]) -> InvoiceLineItem {
    let extended = source.extended_amount.filter(|v| v.is_finite());
    let quantity = source
        .quantity
        .filter(|v| v.is_finite())
        .or_else(|| match (extended, source.unit_price) {
            (Some(ext), Some(price)) if price != 0.0 => Some(ext / price),
            (Some(_), _) => Some(1.0),
            _ => None,
        })
        .unwrap_or(0.0);
    let unit_price = source
        .unit_price
        .filter(|v| v.is_finite())
        .or_else(|| extended.filter(|_| quantity != 0.0).map(|ext| ext / quantity))
        .unwrap_or(0.0);

    let line_number = source.line_number.unwrap_or(index as u32 + 1);
    let mut line = InvoiceLineItem::new(invoice_id, line_number, quantity, unit_price);
    if let Some(ext) = extended {
        line.extended_amount = ext;
    }
    line.item_code = source.item_code.as_deref().and_then(clean_identifier);
    line.description = source.description.clone();
    line.uom = source.uom.as_ref().map(|u| u.trim().to_string());
    line.service_date = source.service_date;

    if let Some(item) = match_billable_item(&line, items) {
        line.billable_item_id = Some(item.id);
        line.price_variance = item.effective_price().map(|price| line.unit_price - price);
    }
    line
}

/// Item code first, then case-insensitive description.
fn match_billable_item<'a>(line: &InvoiceLineItem, items: &'a [BillableItem]) -> Option<&'a BillableItem> {
    let by_code = line
        .item_code
        .as_deref()
        .and_then(|code| items.iter().find(|i| i.item_code.eq_ignore_ascii_case(code)));

    by_code.or_else(|| {
        let description = line.description.as_deref()?.trim();
        items.iter().find(|i| {
            i.description
                .as_deref()
                .map(|d| d.trim().eq_ignore_ascii_case(description))
                .unwrap_or(false)
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::EntityNormalizer;
    use covenant_database::{Cache, MemoryCache, MemoryStore, RecordStore};
    use covenant_models::{ContractExtraction, ExtractedBillableItem, InvoiceStatus};
    use std::sync::Arc;
    use std::time::Duration;

    fn normalizer() -> (EntityNormalizer, Arc<dyn RecordStore>) {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new(Duration::from_secs(60)));
        (EntityNormalizer::new(store.clone(), cache), store)
    }

    fn contract() -> ContractExtraction {
        ContractExtraction {
            contract_id: Some("MSA-2024-001".into()),
            contract_title: Some("Lab Services".into()),
            effective_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            expiration_date: NaiveDate::from_ymd_opt(2024, 12, 31),
            currency: Some("USD".into()),
            parties: vec![ExtractedParty {
                legal_name: Some("Acme Medical Supply".into()),
                role: Some("vendor".into()),
                ..Default::default()
            }],
            billable_items: vec![ExtractedBillableItem {
                item_code: Some("LAB-01".into()),
                description: Some("Blood panel".into()),
                contract_price: Some(100.0),
                allowed_variance: Some(10.0),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn invoice() -> InvoiceExtraction {
        InvoiceExtraction {
            invoice_id: Some("INV-1001".into()),
            invoice_date: NaiveDate::from_ymd_opt(2024, 5, 1),
            vendor_party_id: Some("Acme Medical Supply".into()),
            currency: Some("USD".into()),
            total_amount: Some(1150.0),
            line_items: vec![
                ExtractedLineItem {
                    item_code: Some("LAB-01".into()),
                    quantity: Some(10.0),
                    unit_price: Some(115.0),
                    ..Default::default()
                },
                ExtractedLineItem {
                    description: Some("blood panel".into()),
                    quantity: Some(1.0),
                    unit_price: Some(100.0),
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_invoice_matches_vendor_contract_by_date() {
        let (normalizer, store) = normalizer();
        let contract_id = normalizer.normalize_contract(&contract(), None, None).await.unwrap();
        let invoice_id = normalizer.normalize_invoice(&invoice(), None, None).await.unwrap();

        let stored = store.get_invoice(invoice_id).await.unwrap().unwrap();
        assert_eq!(stored.contract_id, Some(contract_id));
        assert_eq!(stored.gross_amount, 1150.0);

        let lines = store.list_line_items(invoice_id).await.unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.billable_item_id.is_some()));
        assert_eq!(lines[0].price_variance, Some(15.0));
        assert_eq!(lines[1].line_number, 2);
    }

    #[tokio::test]
    async fn test_same_invoice_twice_updates_in_place() {
        let (normalizer, store) = normalizer();
        normalizer.normalize_contract(&contract(), None, None).await.unwrap();
        let first = normalizer.normalize_invoice(&invoice(), None, None).await.unwrap();

        let mut stored = store.get_invoice(first).await.unwrap().unwrap();
        stored.current_status = InvoiceStatus::Approved;
        store.update_invoice(&stored).await.unwrap();

        let mut again = invoice();
        again.total_amount = Some(1200.0);
        again.line_items.truncate(1);
        let second = normalizer.normalize_invoice(&again, None, None).await.unwrap();

        assert_eq!(first, second);
        let stored = store.get_invoice(second).await.unwrap().unwrap();
        assert_eq!(stored.gross_amount, 1200.0);
        assert_eq!(stored.current_status, InvoiceStatus::Approved);
        assert_eq!(store.list_line_items(second).await.unwrap().len(), 1);
        assert!(store.find_invoice_by_number("INV-1001").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_no_contract_outside_term() {
        let (normalizer, store) = normalizer();
        normalizer.normalize_contract(&contract(), None, None).await.unwrap();
        let mut data = invoice();
        data.invoice_date = NaiveDate::from_ymd_opt(2025, 3, 1);

        let id = normalizer.normalize_invoice(&data, None, None).await.unwrap();
        let stored = store.get_invoice(id).await.unwrap().unwrap();
        assert!(stored.contract_id.is_none());
        assert!(store
            .list_line_items(id)
            .await
            .unwrap()
            .iter()
            .all(|l| l.billable_item_id.is_none()));
    }

    #[tokio::test]
    async fn test_reference_wins_over_date_match() {
        let (normalizer, _) = normalizer();
        let contract_id = normalizer.normalize_contract(&contract(), None, None).await.unwrap();
        let mut data = invoice();
        data.invoice_date = None;
        data.contract_reference = Some("MSA-2024-001".into());

        let id = normalizer.normalize_invoice(&data, None, None).await.unwrap();
        let stored = normalizer.store.get_invoice(id).await.unwrap().unwrap();
        assert_eq!(stored.contract_id, Some(contract_id));
    }

    #[test]
    fn test_line_quantity_derived_from_amounts() {
        let source = ExtractedLineItem {
            unit_price: Some(25.0),
            extended_amount: Some(100.0),
            ..Default::default()
        };
        let line = build_line(Uuid::new_v4(), 0, &source, &[]);
        assert_eq!(line.quantity, 4.0);
        assert_eq!(line.extended_amount, 100.0);
        assert_eq!(line.line_number, 1);
    }
}
