//! Property-Based Test Generators
//!
//! Provides proptest strategies for generating random test data
//! that maintains domain invariants.

use core_kernel::{Currency, Money, ParticipantId};
use domain_bill::{BillItem, CreateBillRequest};
use proptest::prelude::*;
use uuid::Uuid;

use crate::fixtures::{IdFixtures, ParticipantFixtures, TimeFixtures};

/// Strategy for generating Currency values
pub fn currency_strategy() -> impl Strategy<Value = Currency> {
    prop_oneof![
        Just(Currency::USD),
        Just(Currency::EUR),
        Just(Currency::GBP),
        Just(Currency::JPY),
        Just(Currency::CHF),
        Just(Currency::INR),
    ]
}

/// Strategy for generating valid item prices in minor units
pub fn price_minor_strategy() -> impl Strategy<Value = i64> {
    1i64..10_000_000i64
}

/// Strategy for generating positive Money values
pub fn positive_money_strategy() -> impl Strategy<Value = Money> {
    (price_minor_strategy(), currency_strategy())
        .prop_map(|(amount, currency)| Money::from_minor(amount, currency))
}

/// Strategy for generating ParticipantId
pub fn participant_id_strategy() -> impl Strategy<Value = ParticipantId> {
    any::<u128>().prop_map(|n| ParticipantId::from_uuid(Uuid::from_u128(n)))
}

/// Strategy for generating valid bill creation requests
///
/// Produces 1 to 12 participants and 1 to 10 items; every item is shared by
/// a non-empty subset of the participants and the payer is one of them.
pub fn bill_request_strategy() -> impl Strategy<Value = CreateBillRequest> {
    (
        currency_strategy(),
        proptest::collection::btree_set(1u128..1_000_000u128, 1..=12),
    )
        .prop_flat_map(|(currency, ids)| {
            let ids: Vec<u128> = ids.into_iter().collect();
            let n = ids.len();
            let item = (
                price_minor_strategy(),
                proptest::collection::vec(any::<bool>(), n),
                0..n,
            );
            (
                Just(currency),
                Just(ids),
                proptest::collection::vec(item, 1..=10),
                0..n,
            )
        })
        .prop_map(|(currency, ids, items, payer)| {
            let participants: Vec<_> = ids.iter().map(|n| ParticipantFixtures::numbered(*n)).collect();
            let items = items
                .into_iter()
                .enumerate()
                .map(|(index, (price, mask, forced))| {
                    let shared_by = participants
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| mask[*i] || *i == forced)
                        .map(|(_, p)| p.id);
                    BillItem::new(
                        IdFixtures::item(index as u128 + 1),
                        format!("Item {index}"),
                        Money::from_minor(price, currency),
                    )
                    .assigned_to(shared_by)
                })
                .collect();

            CreateBillRequest {
                bill_name: "Generated".to_string(),
                currency,
                date: TimeFixtures::bill_date(),
                created_by: participants[payer].id,
                paid_by: participants[payer].id,
                items,
                participants,
            }
        })
}
