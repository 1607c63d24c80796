//! Pre-built Test Fixtures
//!
//! Identifiers are built from small integers so their ordering is obvious:
//! Alice < Bob < Carol < Dave. The split calculator hands remainders out in
//! that order.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use core_kernel::{Currency, ItemId, Money, ParticipantId};
use domain_bill::BillParticipant;
use rust_decimal_macros::dec;
use uuid::Uuid;

/// Fixture for Money test data
pub struct MoneyFixtures;

impl MoneyFixtures {
    /// The canonical three-way split amount
    pub fn usd_10() -> Money {
        Money::new(dec!(10.00), Currency::USD)
    }

    pub fn usd(minor: i64) -> Money {
        Money::from_minor(minor, Currency::USD)
    }

    /// Creates a EUR amount for currency mismatch tests
    pub fn eur_10() -> Money {
        Money::new(dec!(10.00), Currency::EUR)
    }

    /// Creates a JPY amount (zero decimal places)
    pub fn jpy_1000() -> Money {
        Money::new(dec!(1000), Currency::JPY)
    }
}

/// Fixture for time test data
pub struct TimeFixtures;

impl TimeFixtures {
    /// The instant test clocks start at
    pub fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    /// The default bill date
    pub fn bill_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }
}

/// Fixture for identifier test data
pub struct IdFixtures;

impl IdFixtures {
    pub fn alice() -> ParticipantId {
        Self::participant(1)
    }

    pub fn bob() -> ParticipantId {
        Self::participant(2)
    }

    pub fn carol() -> ParticipantId {
        Self::participant(3)
    }

    pub fn dave() -> ParticipantId {
        Self::participant(4)
    }

    /// Someone on no bill
    pub fn outsider() -> ParticipantId {
        Self::participant(99)
    }

    pub fn participant(n: u128) -> ParticipantId {
        ParticipantId::from_uuid(Uuid::from_u128(n))
    }

    pub fn item(n: u128) -> ItemId {
        ItemId::from_uuid(Uuid::from_u128(0x1000 + n))
    }
}

/// Fixture for participant value objects
pub struct ParticipantFixtures;

impl ParticipantFixtures {
    pub fn alice() -> BillParticipant {
        BillParticipant::new(IdFixtures::alice(), "Alice", "alice@example.com")
    }

    pub fn bob() -> BillParticipant {
        BillParticipant::new(IdFixtures::bob(), "Bob", "bob@example.com")
    }

    pub fn carol() -> BillParticipant {
        BillParticipant::new(IdFixtures::carol(), "Carol", "carol@example.com")
            .with_photo_url("https://example.com/carol.png")
    }

    pub fn dave() -> BillParticipant {
        BillParticipant::new(IdFixtures::dave(), "Dave", "dave@example.com")
    }

    /// Alice, Bob and Carol
    pub fn trio() -> Vec<BillParticipant> {
        vec![Self::alice(), Self::bob(), Self::carol()]
    }

    /// A participant with a numbered id
    pub fn numbered(n: u128) -> BillParticipant {
        BillParticipant::new(
            IdFixtures::participant(n),
            format!("Person {n}"),
            format!("person{n}@example.com"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_participant_ids_are_ordered() {
        assert!(IdFixtures::alice() < IdFixtures::bob());
        assert!(IdFixtures::bob() < IdFixtures::carol());
        assert!(IdFixtures::carol() < IdFixtures::dave());
    }

    #[test]
    fn test_id_fixtures_are_deterministic() {
        assert_eq!(IdFixtures::item(1), IdFixtures::item(1));
        assert_ne!(IdFixtures::item(1), IdFixtures::item(2));
    }
}
