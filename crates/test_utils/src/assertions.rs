//! Custom Test Assertions
//!
//! Provides ledger invariant checks that give more meaningful error messages
//! than standard assertions.

use std::collections::{BTreeMap, BTreeSet};

use core_kernel::{Money, ParticipantId};
use domain_bill::Bill;

fn minor(money: &Money) -> i64 {
    money
        .to_minor()
        .unwrap_or_else(|e| panic!("{money} is not an exact minor-unit amount: {e}"))
}

/// Asserts that per-participant shares add up to `total` exactly
pub fn assert_exact_split(totals: &BTreeMap<ParticipantId, Money>, total: &Money) {
    let sum: i64 = totals.values().map(minor).sum();
    assert_eq!(
        sum,
        minor(total),
        "Shares sum to {} minor units but the total is {}",
        sum,
        total
    );
}

/// Asserts the ledger invariants of a committed bill
///
/// # Panics
///
/// Panics if:
/// - the shares do not sum to the total
/// - the total is not the sum of item prices
/// - an item is shared by someone who is not a participant
/// - the totals are not keyed by exactly the participants
/// - a deleted bill lacks its deletion markers
pub fn assert_bill_invariants(bill: &Bill) {
    assert_exact_split(bill.calculated_totals(), &bill.total_amount());

    let item_sum: i64 = bill.items().iter().map(|item| minor(&item.price)).sum();
    assert_eq!(
        item_sum,
        minor(&bill.total_amount()),
        "Bill {} total {} differs from the sum of its items",
        bill.id(),
        bill.total_amount()
    );

    let participants: BTreeSet<ParticipantId> = bill.participant_ids().collect();
    for item in bill.items() {
        assert!(
            item.participant_ids.is_subset(&participants),
            "Item {} is shared by someone outside bill {}",
            item.id,
            bill.id()
        );
    }

    let keys: BTreeSet<ParticipantId> = bill.calculated_totals().keys().copied().collect();
    assert_eq!(keys, participants, "Totals of bill {} are not keyed by its participants", bill.id());

    if bill.is_deleted() {
        assert!(bill.deleted_by().is_some(), "Deleted bill {} has no deleted_by", bill.id());
        assert!(bill.deleted_at().is_some(), "Deleted bill {} has no deleted_at", bill.id());
    }
    assert!(bill.version() >= 1, "Bill {} has version 0", bill.id());
}

/// Asserts that soft deletion left the content untouched
pub fn assert_content_preserved(before: &Bill, after: &Bill) {
    assert_eq!(before.items(), after.items(), "Items changed");
    assert_eq!(before.participants(), after.participants(), "Participants changed");
    assert_eq!(before.total_amount(), after.total_amount(), "Total changed");
    assert_eq!(before.calculated_totals(), after.calculated_totals(), "Shares changed");
    assert_eq!(before.paid_by(), after.paid_by(), "Payer changed");
    assert_eq!(before.bill_name(), after.bill_name(), "Name changed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::TestBillBuilder;
    use crate::fixtures::IdFixtures;

    #[test]
    fn test_default_bill_satisfies_invariants() {
        let bill = TestBillBuilder::new().build();
        assert_bill_invariants(&bill);
    }

    #[test]
    fn test_soft_delete_preserves_content() {
        let bill = TestBillBuilder::new().build();
        let deleted = bill.soft_deleted(IdFixtures::alice(), bill.created_at());
        assert_bill_invariants(&deleted);
        assert_content_preserved(&bill, &deleted);
    }

    #[test]
    #[should_panic(expected = "Shares sum")]
    fn test_detects_broken_split() {
        let bill = TestBillBuilder::new().build();
        let mut totals = bill.calculated_totals().clone();
        totals.insert(IdFixtures::alice(), Money::from_minor(1, bill.currency()));
        assert_exact_split(&totals, &bill.total_amount());
    }
}
