//! Property-based tests for the Covenant domain models
//!
//! Covers the invariants that every caller relies on: stage transitions stay
//! on the fixed sequence, contract terms are always non-empty, and approval
//! levels partition the amount axis.

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;
use uuid::Uuid;

use crate::{
    ApprovalLevel, BillableItem, Contract, DocumentStage, DocumentType, Party, PartyType,
    VarianceType,
};

prop_compose! {
    fn arb_date()(days in 0i64..20000) -> NaiveDate {
        NaiveDate::from_ymd_opt(1990, 1, 1).unwrap() + Duration::days(days)
    }
}

fn arb_document_type() -> impl Strategy<Value = DocumentType> {
    prop_oneof![Just(DocumentType::Contract), Just(DocumentType::Invoice)]
}

fn arb_stage() -> impl Strategy<Value = DocumentStage> {
    prop_oneof![
        Just(DocumentStage::Uploaded),
        Just(DocumentStage::Ocr),
        Just(DocumentStage::TypeValidation),
        Just(DocumentStage::Extraction),
        Just(DocumentStage::Normalization),
        Just(DocumentStage::Validation),
        Just(DocumentStage::Completed),
        Just(DocumentStage::Error),
        Just(DocumentStage::ValidationError),
    ]
}

prop_compose! {
    fn arb_ladder()(
        boundaries in prop::collection::btree_set(1u32..1_000_000, 1..6)
    ) -> Vec<ApprovalLevel> {
        let mut mins = vec![0.0];
        mins.extend(boundaries.into_iter().map(f64::from));

        mins.iter()
            .enumerate()
            .map(|(i, min)| {
                let max = mins.get(i + 1).copied();
                ApprovalLevel::new(format!("L{}", i + 1), *min, max, "approver", 2, i as u32 + 1)
            })
            .collect()
    }
}

proptest! {
    /// Happy-path transitions move exactly one step forward, except the
    /// contract shortcut from normalization to completed.
    #[test]
    fn stage_transitions_are_monotonic(
        from in arb_stage(),
        to in arb_stage(),
        doc_type in arb_document_type()
    ) {
        if from.can_transition_to(to, doc_type) {
            match (from.ordinal(), to.ordinal()) {
                (Some(a), Some(b)) => {
                    let skipped = b - a;
                    if skipped == 2 {
                        prop_assert_eq!(doc_type, DocumentType::Contract);
                        prop_assert_eq!(from, DocumentStage::Normalization);
                    } else {
                        prop_assert_eq!(skipped, 1);
                    }
                }
                (_, None) => prop_assert!(!from.is_terminal()),
                (None, Some(_)) => prop_assert!(false, "left a failure stage via transition"),
            }
        }
    }

    #[test]
    fn contract_term_is_never_empty(effective in arb_date(), expiration in arb_date()) {
        let contract = Contract::new(
            "C-1".to_string(),
            "Agreement".to_string(),
            effective,
            expiration,
            "USD".to_string(),
        );
        prop_assert!(contract.expiration_date > contract.effective_date);
        prop_assert!(contract.covers(effective));
    }

    /// Every non-negative amount falls in exactly one level of a contiguous ladder.
    #[test]
    fn ladder_levels_partition_amounts(ladder in arb_ladder(), amount in 0.0f64..5_000_000.0) {
        let matching = ladder.iter().filter(|level| level.contains(amount)).count();
        prop_assert_eq!(matching, 1);
    }

    #[test]
    fn tolerance_is_non_negative(
        price in 0.0f64..100_000.0,
        variance in -50.0f64..50.0,
        percentage in any::<bool>()
    ) {
        let mut item = BillableItem::new(Uuid::new_v4(), "SKU".to_string(), "USD".to_string());
        item.contract_price = Some(price);
        item.allowed_variance = variance;
        item.allowed_variance_type = if percentage { VarianceType::Percentage } else { VarianceType::Absolute };
        prop_assert!(item.tolerance() >= 0.0);
    }

    #[test]
    fn party_matches_its_own_name(name in "[A-Za-z][A-Za-z &.,]{0,40}") {
        let party = Party::new(name.clone(), PartyType::Vendor);
        prop_assert!(party.name_matches(&name.to_uppercase()));
    }
}
