use chrono::Utc;
use uuid::Uuid;

use covenant_models::{
    BillableItem, Contract, ContractExtraction, ContractLocation, ContractParty, ContractStatus,
    ExtractedBillableItem, ExtractedPricingModel, PartyRole, PartyType, PricingModel, PricingModelType,
    PricingTier, VarianceType,
};
use covenant_utils::{clean_identifier, is_identifier_shaped, validate_model, CovenantError, CovenantResult};

use super::{resolve_location, EntityNormalizer};
use crate::extraction::fallback::{is_generated_id, CONTRACT_ID_PREFIX};

pub(crate) const DEFAULT_CURRENCY: &str = "USD";

pub(crate) fn currency_or_default(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        Some(code) if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) => code.to_uppercase(),
        _ => DEFAULT_CURRENCY.to_string(),
    }
}

fn party_type_for(role: PartyRole) -> PartyType {
    match role {
        PartyRole::Vendor => PartyType::Vendor,
        PartyRole::Customer => PartyType::Customer,
        PartyRole::PaymentAgent => PartyType::PaymentAgent,
        PartyRole::Other => PartyType::Other,
    }
}

/// Key for direct lookup: the first identifier-shaped candidate.
fn lookup_key(data: &ContractExtraction) -> Option<String> {
    [data.contract_number.as_deref(), data.contract_id.as_deref()]
        .into_iter()
        .flatten()
        .filter_map(clean_identifier)
        .find(|candidate| is_identifier_shaped(candidate))
}

impl EntityNormalizer {
    pub async fn normalize_contract(
        &self,
        data: &ContractExtraction,
        source_document_id: Option<Uuid>,
        prior_contract_id: Option<Uuid>,
    ) -> CovenantResult<Uuid> {
        let (Some(effective_date), Some(expiration_date)) = (data.effective_date, data.expiration_date) else {
            return Err(CovenantError::business_rule(
                "contract is missing its effective or expiration date",
            ));
        };

        let key = lookup_key(data);
        let mut existing = match &key {
            Some(number) => self.store.find_contract_by_number(number).await?,
            None => None,
        };
        // A re-extraction whose key finds nothing updates the earlier contract,
        // taking the new number only when it is a real one.
        let mut renumber = None;
        if existing.is_none() {
            if let Some(prior_id) = prior_contract_id {
                existing = self.store.get_contract(prior_id).await?;
                renumber = key.clone().filter(|number| {
                    !source_document_id
                        .map(|id| is_generated_id(CONTRACT_ID_PREFIX, number, id))
                        .unwrap_or(false)
                });
            }
        }
        let number = key
            .or_else(|| {
                [data.contract_number.as_deref(), data.contract_id.as_deref()]
                    .into_iter()
                    .flatten()
                    .find_map(clean_identifier)
            })
            .ok_or_else(|| CovenantError::business_rule("contract has no usable identifier"))?;

        let title = data
            .contract_title
            .as_deref()
            .and_then(clean_title)
            .unwrap_or_else(|| format!("Contract {}", number));
        let currency = currency_or_default(data.currency.as_deref());
        let status = data.status.as_deref().and_then(ContractStatus::parse);

        let contract = match existing {
            Some(mut contract) => {
                if let Some(number) = renumber {
                    contract.contract_number = number;
                }
                contract.title = title;
                contract.effective_date = effective_date;
                contract.expiration_date = expiration_date;
                contract.currency = currency;
                if let Some(status) = status {
                    contract.status = status;
                }
                if data.payment_terms.is_some() {
                    contract.payment_terms = data.payment_terms.clone();
                }
                contract.source_document_id = contract.source_document_id.or(source_document_id);
                contract.ensure_valid_term();
                contract.updated_at = Utc::now();
                validate_model(&contract)?;
                self.store.update_contract(&contract).await?;
                tracing::info!(contract_id = %contract.id, contract_number = %contract.contract_number, "Updated contract");
                contract
            }
            None => {
                let mut contract = Contract::new(number, title, effective_date, expiration_date, currency);
                if let Some(status) = status {
                    contract.status = status;
                }
                contract.payment_terms = data.payment_terms.clone();
                contract.source_document_id = source_document_id;
                validate_model(&contract)?;
                self.store.insert_contract(&contract).await?;
                tracing::info!(contract_id = %contract.id, contract_number = %contract.contract_number, "Created contract");
                contract
            }
        };

        self.link_parties(&contract, data).await?;
        self.link_locations(&contract, data).await?;
        self.upsert_billable_items(&contract, &data.billable_items).await?;

        Ok(contract.id)
    }

    async fn link_parties(&self, contract: &Contract, data: &ContractExtraction) -> CovenantResult<()> {
        let mut edges = self.store.list_contract_parties(contract.id).await?;

        for extracted in &data.parties {
            let role = PartyRole::parse(extracted.role.as_deref().unwrap_or_default());
            let Some(party) = self.parties.resolve(extracted, party_type_for(role)).await? else {
                continue;
            };
            if edges.iter().any(|e| e.party_id == party.id && e.role == role) {
                continue;
            }
            let edge = ContractParty::new(contract.id, party.id, role);
            self.store.insert_contract_party(&edge).await?;
            edges.push(edge);
        }
        Ok(())
    }

    async fn link_locations(&self, contract: &Contract, data: &ContractExtraction) -> CovenantResult<()> {
        let mut edges = self.store.list_contract_locations(contract.id).await?;

        for extracted in &data.locations {
            let Some(location) = resolve_location(&self.store, extracted).await? else {
                continue;
            };
            if edges.iter().any(|e| e.location_id == location.id) {
                continue;
            }
            let edge = ContractLocation::new(contract.id, location.id);
            self.store.insert_contract_location(&edge).await?;
            edges.push(edge);
        }
        Ok(())
    }

    async fn upsert_billable_items(&self, contract: &Contract, extracted: &[ExtractedBillableItem]) -> CovenantResult<()> {
        let mut items = self.store.list_billable_items(contract.id).await?;
        let mut models = self.store.list_pricing_models(contract.id).await?;

        for source in extracted {
            let Some(code) = source
                .item_code
                .as_deref()
                .and_then(clean_identifier)
                .or_else(|| source.description.as_deref().and_then(clean_identifier))
            else {
                tracing::debug!(contract_id = %contract.id, "Skipping billable item without code or description");
                continue;
            };

            let position = items.iter().position(|i| i.item_code.eq_ignore_ascii_case(&code));
            let mut item = match position {
                Some(index) => items[index].clone(),
                None => BillableItem::new(contract.id, code.clone(), contract.currency.clone()),
            };
            apply_item_terms(&mut item, source, &contract.currency);
            validate_model(&item)?;

            match position {
                Some(index) => {
                    item.updated_at = Utc::now();
                    self.store.update_billable_item(&item).await?;
                    items[index] = item.clone();
                }
                None => {
                    self.store.insert_billable_item(&item).await?;
                    items.push(item.clone());
                }
            }

            if let Some(model) = &source.pricing_model {
                self.upsert_pricing_model(contract, &item, model, &mut models).await?;
            }
        }

        tracing::debug!(contract_id = %contract.id, items = items.len(), "Billable items normalized");
        Ok(())
    }

    async fn upsert_pricing_model(
        &self,
        contract: &Contract,
        item: &BillableItem,
        source: &ExtractedPricingModel,
        models: &mut Vec<PricingModel>,
    ) -> CovenantResult<()> {
        let name = source
            .name
            .as_deref()
            .and_then(clean_identifier)
            .unwrap_or_else(|| format!("{} pricing", item.item_code));
        let model_type = source
            .model_type
            .as_deref()
            .map(PricingModelType::parse)
            .unwrap_or(PricingModelType::PerUnit);
        let tiers: Vec<PricingTier> = source
            .tiers
            .iter()
            .filter_map(|tier| {
                Some(PricingTier {
                    min_quantity: tier.min_quantity.unwrap_or(0.0),
                    max_quantity: tier.max_quantity,
                    rate: tier.rate?,
                })
            })
            .collect();

        let position = models
            .iter()
            .position(|m| m.billable_item_id == Some(item.id) && m.name.eq_ignore_ascii_case(&name));

        match position {
            Some(index) => {
                let model = &mut models[index];
                model.model_type = model_type;
                model.base_rate = source.base_rate.or(model.base_rate);
                if !tiers.is_empty() {
                    model.tiers = tiers;
                }
                model.updated_at = Utc::now();
                self.store.update_pricing_model(model).await?;
            }
            None => {
                let mut model = PricingModel::new(contract.id, name, model_type, item.currency.clone());
                model.billable_item_id = Some(item.id);
                model.base_rate = source.base_rate;
                model.tiers = tiers;
                self.store.insert_pricing_model(&model).await?;
                models.push(model);
            }
        }
        Ok(())
    }
}

/// Copy extracted terms onto the item; absent values keep what is stored.
fn apply_item_terms(item: &mut BillableItem, source: &ExtractedBillableItem, contract_currency: &str) {
    if source.description.is_some() {
        item.description = source.description.clone();
    }
    let non_negative = |v: Option<f64>| v.filter(|p| p.is_finite() && *p >= 0.0);
    if let Some(price) = non_negative(source.list_price) {
        item.list_price = Some(price);
    }
    if let Some(price) = non_negative(source.contract_price) {
        item.contract_price = Some(price);
    }
    if let Some(floor) = non_negative(source.price_floor) {
        item.price_floor = Some(floor);
    }
    if let Some(ceiling) = non_negative(source.price_ceiling) {
        item.price_ceiling = Some(ceiling);
    }
    if let Some(variance) = non_negative(source.allowed_variance) {
        item.allowed_variance = variance;
    }
    if let Some(kind) = source.allowed_variance_type.as_deref() {
        item.allowed_variance_type = VarianceType::parse(kind);
    }
    if source.uom.is_some() {
        item.uom = source.uom.as_ref().map(|u| u.trim().to_string());
    }
    item.currency = currency_or_default(source.currency.as_deref().or(Some(contract_currency)));
}

fn clean_title(raw: &str) -> Option<String> {
    let title = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let title: String = title.chars().take(255).collect();
    (!title.is_empty()).then_some(title)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::EntityNormalizer;
    use chrono::NaiveDate;
    use covenant_database::{Cache, MemoryCache, MemoryStore, RecordStore};
    use covenant_models::{ExtractedLocation, ExtractedParty, ExtractedPricingTier};
    use std::sync::Arc;
    use std::time::Duration;

    fn normalizer() -> (EntityNormalizer, Arc<dyn RecordStore>) {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new(Duration::from_secs(60)));
        (EntityNormalizer::new(store.clone(), cache), store)
    }

    fn sample() -> ContractExtraction {
        ContractExtraction {
            contract_id: Some("MSA-2024-001".into()),
            contract_number: Some("MSA-2024-001".into()),
            contract_title: Some("Laboratory Services Agreement".into()),
            effective_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            expiration_date: NaiveDate::from_ymd_opt(2024, 12, 31),
            currency: Some("usd".into()),
            parties: vec![
                ExtractedParty {
                    legal_name: Some("Acme Medical Supply".into()),
                    role: Some("Vendor".into()),
                    ..Default::default()
                },
                ExtractedParty {
                    legal_name: Some("General Hospital".into()),
                    role: Some("Customer".into()),
                    ..Default::default()
                },
            ],
            locations: vec![ExtractedLocation {
                name: Some("Main Campus".into()),
                ..Default::default()
            }],
            billable_items: vec![ExtractedBillableItem {
                item_code: Some("LAB-01".into()),
                description: Some("Blood panel".into()),
                contract_price: Some(100.0),
                allowed_variance: Some(10.0),
                uom: Some("EA".into()),
                pricing_model: Some(ExtractedPricingModel {
                    name: Some("Volume".into()),
                    model_type: Some("tiered".into()),
                    base_rate: Some(100.0),
                    tiers: vec![ExtractedPricingTier {
                        min_quantity: Some(100.0),
                        max_quantity: None,
                        rate: Some(90.0),
                    }],
                }),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_contract_graph_is_created_once() {
        let (normalizer, store) = normalizer();
        let first = normalizer.normalize_contract(&sample(), None, None).await.unwrap();
        let second = normalizer.normalize_contract(&sample(), None, None).await.unwrap();
        assert_eq!(first, second);

        let contract = store.get_contract(first).await.unwrap().unwrap();
        assert_eq!(contract.currency, "USD");
        assert_eq!(store.list_contract_parties(first).await.unwrap().len(), 2);
        assert_eq!(store.list_contract_locations(first).await.unwrap().len(), 1);
        assert_eq!(store.list_billable_items(first).await.unwrap().len(), 1);
        let models = store.list_pricing_models(first).await.unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].rate_for(150.0), Some(90.0));
    }

    #[tokio::test]
    async fn test_prose_identifier_is_not_a_lookup_key() {
        let (normalizer, store) = normalizer();
        let mut data = sample();
        data.contract_number = None;
        data.contract_id = Some("this agreement is entered into by and between the parties below".into());

        let id = normalizer.normalize_contract(&data, None, None).await.unwrap();
        let contract = store.get_contract(id).await.unwrap().unwrap();
        assert!(contract.contract_number.chars().count() <= 64);
    }

    #[tokio::test]
    async fn test_missing_dates_is_a_business_rule_violation() {
        let (normalizer, _) = normalizer();
        let mut data = sample();
        data.expiration_date = None;
        let err = normalizer.normalize_contract(&data, None, None).await.unwrap_err();
        assert_eq!(err.error_code(), "BUSINESS_RULE_VIOLATION");
    }

    #[tokio::test]
    async fn test_update_keeps_stored_prices_when_absent() {
        let (normalizer, store) = normalizer();
        let id = normalizer.normalize_contract(&sample(), None, None).await.unwrap();

        let mut data = sample();
        data.billable_items[0].contract_price = None;
        data.billable_items[0].item_code = Some("lab-01".into());
        normalizer.normalize_contract(&data, None, None).await.unwrap();

        let items = store.list_billable_items(id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].contract_price, Some(100.0));
    }

    #[test]
    fn test_currency_default() {
        assert_eq!(currency_or_default(Some("eur")), "EUR");
        assert_eq!(currency_or_default(Some("dollars")), "USD");
        assert_eq!(currency_or_default(None), "USD");
    }
}
