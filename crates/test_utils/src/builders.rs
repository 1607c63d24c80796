//! Test Data Builders
//!
//! Provides builder patterns for constructing test data with sensible defaults.
//! These builders allow tests to specify only the relevant fields while using
//! defaults for everything else.

use chrono::{DateTime, NaiveDate, Utc};
use core_kernel::{BillId, Currency, Money, ParticipantId, SessionId};
use domain_bill::{Bill, BillItem, BillParticipant, CreateBillRequest};
use domain_session::{CreationStep, SessionSnapshot};

use crate::fixtures::{IdFixtures, ParticipantFixtures, TimeFixtures};

/// Builder for bills and bill creation requests
///
/// Without explicit items the bill gets a single $10.00 item shared by every
/// participant.
pub struct TestBillBuilder {
    bill_id: BillId,
    bill_name: String,
    currency: Currency,
    date: NaiveDate,
    created_by: ParticipantId,
    paid_by: ParticipantId,
    items: Vec<BillItem>,
    participants: Vec<BillParticipant>,
    created_at: DateTime<Utc>,
}

impl Default for TestBillBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestBillBuilder {
    /// Creates a new builder: Alice, Bob and Carol, paid by Alice
    pub fn new() -> Self {
        Self {
            bill_id: BillId::new_v7(),
            bill_name: "Team dinner".to_string(),
            currency: Currency::USD,
            date: TimeFixtures::bill_date(),
            created_by: IdFixtures::alice(),
            paid_by: IdFixtures::alice(),
            items: Vec::new(),
            participants: ParticipantFixtures::trio(),
            created_at: TimeFixtures::now(),
        }
    }

    pub fn with_id(mut self, id: BillId) -> Self {
        self.bill_id = id;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.bill_name = name.into();
        self
    }

    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = date;
        self
    }

    pub fn created_by(mut self, creator: ParticipantId) -> Self {
        self.created_by = creator;
        self
    }

    pub fn paid_by(mut self, payer: ParticipantId) -> Self {
        self.paid_by = payer;
        self
    }

    pub fn with_participants(mut self, participants: Vec<BillParticipant>) -> Self {
        self.participants = participants;
        self
    }

    pub fn with_participant(mut self, participant: BillParticipant) -> Self {
        self.participants.push(participant);
        self
    }

    /// Adds an item priced in minor units of the bill currency
    ///
    /// Item ids are deterministic: the n-th item gets `IdFixtures::item(n)`.
    pub fn with_item(mut self, name: &str, price_minor: i64, shared_by: &[ParticipantId]) -> Self {
        let id = IdFixtures::item(self.items.len() as u128 + 1);
        self.items.push(
            BillItem::new(id, name, Money::from_minor(price_minor, self.currency))
                .assigned_to(shared_by.iter().copied()),
        );
        self
    }

    pub fn with_items(mut self, items: Vec<BillItem>) -> Self {
        self.items = items;
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }

    /// The request the command service would receive
    pub fn request(&self) -> CreateBillRequest {
        let items = if self.items.is_empty() {
            vec![BillItem::new(
                IdFixtures::item(1),
                "Pizza",
                Money::from_minor(10 * self.currency.minor_unit_factor(), self.currency),
            )
            .assigned_to(self.participants.iter().map(|p| p.id))]
        } else {
            self.items.clone()
        };

        CreateBillRequest {
            bill_name: self.bill_name.clone(),
            currency: self.currency,
            date: self.date,
            created_by: self.created_by,
            paid_by: self.paid_by,
            items,
            participants: self.participants.clone(),
        }
    }

    /// Builds the bill at version 1
    ///
    /// # Panics
    ///
    /// Panics if the configured contents are invalid
    pub fn build(self) -> Bill {
        let request = self.request();
        Bill::create(self.bill_id, request, self.created_at).expect("test bill should be valid")
    }
}

/// Builder for session snapshots
pub struct TestSessionBuilder {
    snapshot: SessionSnapshot,
}

impl Default for TestSessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestSessionBuilder {
    /// An in-progress session at the assignment step with one item and the trio
    pub fn new() -> Self {
        let mut snapshot = SessionSnapshot::new(SessionId::new_v7(), Currency::USD, TimeFixtures::now());
        snapshot.step = CreationStep::Assignment;
        snapshot.bill_name = "Team dinner".to_string();
        snapshot.participants = ParticipantFixtures::trio();
        snapshot.items = vec![BillItem::new(
            IdFixtures::item(1),
            "Pizza",
            Money::from_minor(1000, Currency::USD),
        )];
        Self { snapshot }
    }

    pub fn at_step(mut self, step: CreationStep) -> Self {
        self.snapshot.step = step;
        self
    }

    pub fn saved_at(mut self, at: DateTime<Utc>) -> Self {
        self.snapshot.last_saved_at = at;
        self
    }

    pub fn paid_by(mut self, payer: ParticipantId) -> Self {
        self.snapshot.payer_id = Some(payer);
        self
    }

    pub fn with_items(mut self, items: Vec<BillItem>) -> Self {
        self.snapshot.items = items;
        self
    }

    pub fn with_participants(mut self, participants: Vec<BillParticipant>) -> Self {
        self.snapshot.participants = participants;
        self
    }

    /// Clears items and participants
    pub fn empty(mut self) -> Self {
        self.snapshot.items.clear();
        self.snapshot.participants.clear();
        self
    }

    /// Assigns every item to every participant
    pub fn fully_assigned(mut self) -> Self {
        let everyone: Vec<ParticipantId> = self.snapshot.participants.iter().map(|p| p.id).collect();
        for item in &mut self.snapshot.items {
            item.participant_ids = everyone.iter().copied().collect();
        }
        self
    }

    pub fn build(self) -> SessionSnapshot {
        self.snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bill_is_valid() {
        let bill = TestBillBuilder::new().build();
        assert_eq!(bill.version(), 1);
        assert_eq!(bill.items().len(), 1);
        assert_eq!(bill.participants().len(), 3);
    }

    #[test]
    fn test_item_ids_are_sequential() {
        let bill = TestBillBuilder::new()
            .with_item("Soup", 500, &[IdFixtures::alice()])
            .with_item("Salad", 700, &[IdFixtures::bob()])
            .build();
        assert_eq!(bill.items()[0].id, IdFixtures::item(1));
        assert_eq!(bill.items()[1].id, IdFixtures::item(2));
    }

    #[test]
    fn test_session_builder_defaults() {
        let snapshot = TestSessionBuilder::new().build();
        assert_eq!(snapshot.step, CreationStep::Assignment);
        assert!(!snapshot.is_empty());
    }
}
