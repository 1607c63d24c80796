//! Balance calculator
//!
//! Pure functions, no I/O. All splitting happens in integer minor units
//! through `Money::allocate`; the remainder of each item goes one minor unit
//! at a time to its participants in ascending id order, so the shares of an
//! item always sum to its price exactly.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{Currency, Money, ParticipantId};

use crate::bill::{Bill, BillItem, BillParticipant};
use crate::error::ValidationError;

/// Splits the items among their assigned participants
///
/// Every participant gets an entry, zero if they share no item.
///
/// # Errors
///
/// - `UnassignedItem` if an item has no participants
/// - `UnknownParticipant` if an item names someone not in `participants`
/// - `CurrencyMismatch` / `InvalidPrice` for prices that are not exact
///   amounts of `currency`
pub fn split(
    items: &[BillItem],
    participants: &[BillParticipant],
    currency: Currency,
) -> Result<BTreeMap<ParticipantId, Money>, ValidationError> {
    let mut totals: BTreeMap<ParticipantId, Money> = participants
        .iter()
        .map(|p| (p.id, Money::zero(currency)))
        .collect();

    for item in items {
        if item.price.currency() != currency {
            return Err(ValidationError::CurrencyMismatch {
                item_id: item.id,
                expected: currency,
                actual: item.price.currency(),
            });
        }
        if item.participant_ids.is_empty() {
            return Err(ValidationError::UnassignedItem { item_id: item.id });
        }

        let invalid_price = |e: core_kernel::MoneyError| ValidationError::InvalidPrice {
            item_id: item.id,
            reason: e.to_string(),
        };
        let parts = u32::try_from(item.participant_ids.len()).map_err(|_| {
            ValidationError::InvalidPrice {
                item_id: item.id,
                reason: "too many participants on one item".to_string(),
            }
        })?;
        let shares = item.price.allocate(parts).map_err(invalid_price)?;

        // BTreeSet iteration is ascending, which fixes who receives the remainder
        for (participant_id, share) in item.participant_ids.iter().zip(shares) {
            let total = totals.get_mut(participant_id).ok_or(
                ValidationError::UnknownParticipant {
                    item_id: item.id,
                    participant_id: *participant_id,
                },
            )?;
            *total = total.checked_add(&share).map_err(invalid_price)?;
        }
    }

    Ok(totals)
}

/// Net position between the user and one counterparty in one currency
///
/// Positive `net` means the counterparty owes the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterpartyBalance {
    pub counterparty: ParticipantId,
    pub net: Money,
}

/// Derived balances of one user across their active bills
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBalances {
    user: ParticipantId,
    balances: Vec<CounterpartyBalance>,
}

impl UserBalances {
    /// Computes what each counterparty owes `user`, per currency
    ///
    /// On every non-deleted bill the payer is owed each other participant's
    /// share. Settled pairs (net zero) are omitted. Shares are bounded by
    /// bill validation, so the running nets saturate rather than panic.
    pub fn compute<'a, I>(user: ParticipantId, bills: I) -> Self
    where
        I: IntoIterator<Item = &'a Bill>,
    {
        let mut nets: BTreeMap<(ParticipantId, Currency), Decimal> = BTreeMap::new();

        for bill in bills.into_iter().filter(|b| !b.is_deleted()) {
            let currency = bill.currency();
            if bill.paid_by() == user {
                for (participant, share) in bill.calculated_totals() {
                    if *participant != user {
                        let net = nets.entry((*participant, currency)).or_default();
                        *net = net.saturating_add(share.amount());
                    }
                }
            } else if let Some(share) = bill.share_of(user) {
                let net = nets.entry((bill.paid_by(), currency)).or_default();
                *net = net.saturating_sub(share.amount());
            }
        }

        let balances = nets
            .into_iter()
            .filter(|(_, net)| !net.is_zero())
            .map(|((counterparty, currency), net)| CounterpartyBalance {
                counterparty,
                net: Money::new(net, currency),
            })
            .collect();

        Self { user, balances }
    }

    pub fn user(&self) -> ParticipantId {
        self.user
    }

    /// Non-zero positions, ordered by counterparty then currency
    pub fn balances(&self) -> &[CounterpartyBalance] {
        &self.balances
    }

    /// The net position with `counterparty` in `currency`, if unsettled
    pub fn net_with(&self, counterparty: ParticipantId, currency: Currency) -> Option<Money> {
        self.balances
            .iter()
            .find(|b| b.counterparty == counterparty && b.net.currency() == currency)
            .map(|b| b.net)
    }

    /// Total the user is owed minus total the user owes, in `currency`
    pub fn net_total(&self, currency: Currency) -> Money {
        let total = self
            .balances
            .iter()
            .filter(|b| b.net.currency() == currency)
            .fold(Decimal::ZERO, |acc, b| acc.saturating_add(b.net.amount()));
        Money::new(total, currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::ItemId;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn pid(n: u128) -> ParticipantId {
        ParticipantId::from_uuid(Uuid::from_u128(n))
    }

    fn people(ids: &[u128]) -> Vec<BillParticipant> {
        ids.iter()
            .map(|n| BillParticipant::new(pid(*n), format!("P{n}"), format!("p{n}@example.com")))
            .collect()
    }

    #[test]
    fn test_ten_dollars_three_ways() {
        let items = vec![BillItem::new(
            ItemId::new(),
            "Pizza",
            Money::new(dec!(10.00), Currency::USD),
        )
        .assigned_to([pid(3), pid(1), pid(2)])];

        let totals = split(&items, &people(&[1, 2, 3]), Currency::USD).unwrap();

        assert_eq!(totals[&pid(1)].amount(), dec!(3.34));
        assert_eq!(totals[&pid(2)].amount(), dec!(3.33));
        assert_eq!(totals[&pid(3)].amount(), dec!(3.33));
    }

    #[test]
    fn test_uninvolved_participant_owes_zero() {
        let items = vec![BillItem::new(
            ItemId::new(),
            "Coffee",
            Money::new(dec!(4.50), Currency::USD),
        )
        .assigned_to([pid(1)])];

        let totals = split(&items, &people(&[1, 2]), Currency::USD).unwrap();
        assert_eq!(totals[&pid(1)].amount(), dec!(4.50));
        assert!(totals[&pid(2)].is_zero());
    }

    #[test]
    fn test_zero_decimal_currency() {
        let items = vec![BillItem::new(
            ItemId::new(),
            "Ramen",
            Money::new(dec!(1000), Currency::JPY),
        )
        .assigned_to([pid(1), pid(2), pid(3)])];

        let totals = split(&items, &people(&[1, 2, 3]), Currency::JPY).unwrap();
        let amounts: Vec<_> = totals.values().map(|m| m.amount()).collect();
        assert_eq!(amounts, vec![dec!(334), dec!(333), dec!(333)]);
    }

    #[test]
    fn test_unknown_participant() {
        let items = vec![BillItem::new(
            ItemId::new(),
            "Tea",
            Money::new(dec!(3.00), Currency::USD),
        )
        .assigned_to([pid(7)])];

        assert!(matches!(
            split(&items, &people(&[1]), Currency::USD),
            Err(ValidationError::UnknownParticipant { .. })
        ));
    }

    #[test]
    fn test_net_total_saturates_instead_of_panicking() {
        let balances = UserBalances {
            user: pid(1),
            balances: vec![
                CounterpartyBalance {
                    counterparty: pid(2),
                    net: Money::new(Decimal::MAX, Currency::USD),
                },
                CounterpartyBalance {
                    counterparty: pid(3),
                    net: Money::new(Decimal::MAX, Currency::USD),
                },
            ],
        };
        assert_eq!(balances.net_total(Currency::USD).amount(), Decimal::MAX);
    }

    #[test]
    fn test_unassigned_item() {
        let items = vec![BillItem::new(
            ItemId::new(),
            "Tea",
            Money::new(dec!(3.00), Currency::USD),
        )];

        assert!(matches!(
            split(&items, &people(&[1]), Currency::USD),
            Err(ValidationError::UnassignedItem { .. })
        ));
    }
}
