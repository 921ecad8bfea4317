//! Party and location match-or-create.

use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use covenant_database::{Cache, PartyFilter, RecordStore};
use covenant_models::{ExtractedLocation, ExtractedParty, Location, Party, PartyType};
use covenant_utils::{clean_identifier, is_party_name_shaped, validate_model, CovenantResult};

fn name_key(name: &str) -> String {
    let normalized = name.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    format!("party:name:{}", normalized)
}

/// Resolves extracted parties to stored ones, creating them when nothing matches.
#[derive(Clone)]
pub struct PartyResolver {
    store: Arc<dyn RecordStore>,
    cache: Arc<dyn Cache>,
}

impl PartyResolver {
    pub fn new(store: Arc<dyn RecordStore>, cache: Arc<dyn Cache>) -> Self {
        Self { store, cache }
    }

    /// Match by id, then name, then tax/DUNS/NPI identifiers. A match is
    /// enriched with any fields it lacks; no match creates a new party.
    /// Returns `None` only when the extraction carries neither a usable name
    /// nor an identifier that finds an existing party.
    pub async fn resolve(&self, extracted: &ExtractedParty, party_type: PartyType) -> CovenantResult<Option<Party>> {
        let candidate = candidate_party(extracted, party_type);

        let found = match self.find(extracted, candidate.as_ref()).await? {
            Some(found) => found,
            None => {
                let Some(party) = candidate else {
                    tracing::debug!("Extracted party has no usable name, skipping");
                    return Ok(None);
                };
                validate_model(&party)?;
                self.store.insert_party(&party).await?;
                self.invalidate_names(&party).await;
                tracing::info!(party_id = %party.id, legal_name = %party.legal_name, "Created party");
                self.remember(&party.legal_name, party.id).await;
                return Ok(Some(party));
            }
        };

        let mut party = found;
        if let Some(candidate) = &candidate {
            if party.enrich_from(candidate) {
                validate_model(&party)?;
                self.store.update_party(&party).await?;
                self.invalidate_names(&party).await;
                tracing::debug!(party_id = %party.id, "Enriched party from extraction");
            }
            self.remember(&candidate.legal_name, party.id).await;
        }

        Ok(Some(party))
    }

    async fn find(&self, extracted: &ExtractedParty, candidate: Option<&Party>) -> CovenantResult<Option<Party>> {
        if let Some(id) = extracted
            .party_id
            .as_deref()
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
        {
            if let Some(party) = self.store.get_party(id).await? {
                return Ok(Some(party));
            }
        }

        if let Some(candidate) = candidate {
            if let Some(party) = self.find_by_name(&candidate.legal_name).await? {
                return Ok(Some(party));
            }
        }

        let identifiers = [
            extracted.tax_id.as_deref().map(|v| PartyFilter::TaxId(v.trim().to_string())),
            extracted.duns.as_deref().map(|v| PartyFilter::Duns(v.trim().to_string())),
            extracted.npi.as_deref().map(|v| PartyFilter::Npi(v.trim().to_string())),
        ];
        for filter in identifiers.into_iter().flatten() {
            if let Some(party) = self.store.find_parties(&filter).await?.into_iter().next() {
                return Ok(Some(party));
            }
        }

        Ok(None)
    }

    async fn find_by_name(&self, name: &str) -> CovenantResult<Option<Party>> {
        let key = name_key(name);
        let cached_id = match self.cache.get(&key).await {
            Ok(value) => value.and_then(|v| v.as_str().and_then(|s| Uuid::parse_str(s).ok())),
            Err(e) => {
                tracing::warn!(error = %e, key = %key, "Party cache read failed");
                None
            }
        };
        if let Some(id) = cached_id {
            if let Some(party) = self.store.get_party(id).await? {
                return Ok(Some(party));
            }
            self.forget(&key).await;
        }

        let matches = self.store.find_parties(&PartyFilter::Name(name.to_string())).await?;
        // Prefer an exact (case-insensitive) legal name over a substring hit.
        let exact = matches
            .iter()
            .position(|p| p.legal_name.trim().eq_ignore_ascii_case(name.trim()));
        Ok(match exact {
            Some(index) => matches.into_iter().nth(index),
            None => matches.into_iter().next(),
        })
    }

    async fn remember(&self, name: &str, id: Uuid) {
        let key = name_key(name);
        if let Err(e) = self.cache.set(&key, Value::String(id.to_string())).await {
            tracing::warn!(error = %e, key = %key, "Party cache write failed");
        }
    }

    async fn forget(&self, key: &str) {
        if let Err(e) = self.cache.invalidate(key).await {
            tracing::warn!(error = %e, key = %key, "Party cache invalidation failed");
        }
    }

    async fn invalidate_names(&self, party: &Party) {
        for name in std::iter::once(&party.legal_name).chain(party.trading_name.iter()) {
            self.forget(&name_key(name)).await;
        }
    }
}

fn candidate_party(extracted: &ExtractedParty, party_type: PartyType) -> Option<Party> {
    let legal_name = [extracted.legal_name.as_deref(), extracted.trading_name.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|name| is_party_name_shaped(name))?;

    let mut party = Party::new(legal_name.to_string(), party_type);
    party.trading_name = extracted
        .trading_name
        .as_deref()
        .map(str::trim)
        .filter(|name| *name != legal_name && is_party_name_shaped(name))
        .map(str::to_string);
    party.tax_id = extracted.tax_id.as_deref().and_then(clean_identifier);
    party.duns_number = extracted.duns.as_deref().and_then(clean_identifier);
    party.npi = extracted.npi.as_deref().and_then(clean_identifier);
    party.email = extracted.email.clone();
    party.phone = extracted.phone.clone();
    party.address = extracted.address.clone();
    Some(party)
}

/// Find a stored location that is the same place, or create it.
pub async fn resolve_location(
    store: &Arc<dyn RecordStore>,
    extracted: &ExtractedLocation,
) -> CovenantResult<Option<Location>> {
    let Some(name) = [extracted.name.as_deref(), extracted.address.as_deref(), extracted.city.as_deref()]
        .into_iter()
        .flatten()
        .find_map(clean_identifier)
    else {
        return Ok(None);
    };

    let mut candidate = Location::new(name);
    candidate.address_line = extracted.address.clone();
    candidate.city = extracted.city.clone();
    candidate.state = extracted.state.clone();
    candidate.postal_code = extracted.postal_code.clone();
    candidate.country = extracted.country.clone();

    let existing = store
        .find_locations(&candidate.name, candidate.postal_code.as_deref())
        .await?;
    if let Some(location) = existing.into_iter().find(|l| l.same_place(&candidate)) {
        return Ok(Some(location));
    }

    validate_model(&candidate)?;
    store.insert_location(&candidate).await?;
    tracing::info!(location_id = %candidate.id, name = %candidate.name, "Created location");
    Ok(Some(candidate))
}
