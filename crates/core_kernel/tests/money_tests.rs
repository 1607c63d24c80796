//! Integration tests for the Money module
//!
//! Covers creation, minor-unit conversion, checked arithmetic, allocation
//! and serialization.

use core_kernel::{Money, Currency, MoneyError};
use rust_decimal_macros::dec;

mod creation {
    use super::*;

    #[test]
    fn test_new_keeps_amount_exactly() {
        let m = Money::new(dec!(100.50), Currency::USD);
        assert_eq!(m.amount(), dec!(100.50));
        assert_eq!(m.currency(), Currency::USD);
    }

    #[test]
    fn test_from_minor_handles_jpy_no_decimals() {
        let m = Money::from_minor(10000, Currency::JPY);
        assert_eq!(m.amount(), dec!(10000));
    }

    #[test]
    fn test_zero_creates_zero_amount() {
        let m = Money::zero(Currency::EUR);
        assert!(m.is_zero());
        assert!(!m.is_positive());
        assert!(!m.is_negative());
        assert_eq!(m.currency(), Currency::EUR);
    }

    #[test]
    fn test_negative_amount_creation() {
        let m = Money::new(dec!(-100.00), Currency::USD);
        assert!(m.is_negative());
        assert!(!m.is_positive());
    }
}

mod minor_units {
    use super::*;

    #[test]
    fn test_to_minor_for_whole_cents() {
        assert_eq!(Money::new(dec!(0.01), Currency::GBP).to_minor(), Ok(1));
        assert_eq!(Money::new(dec!(-12.34), Currency::USD).to_minor(), Ok(-1234));
    }

    #[test]
    fn test_to_minor_rejects_sub_cent_amounts() {
        let err = Money::new(dec!(0.001), Currency::USD).to_minor().unwrap_err();
        assert_eq!(
            err,
            MoneyError::SubMinorPrecision {
                amount: dec!(0.001),
                currency: Currency::USD,
            }
        );
    }

    #[test]
    fn test_to_minor_overflow() {
        let huge = Money::new(dec!(99999999999999999999), Currency::USD);
        assert_eq!(huge.to_minor(), Err(MoneyError::Overflow));
    }
}

mod arithmetic {
    use super::*;

    #[test]
    fn test_checked_add_same_currency() {
        let a = Money::new(dec!(100.00), Currency::USD);
        let b = Money::new(dec!(50.25), Currency::USD);
        assert_eq!(a.checked_add(&b).unwrap().amount(), dec!(150.25));
    }

    #[test]
    fn test_checked_sub_can_go_negative() {
        let a = Money::new(dec!(10.00), Currency::USD);
        let b = Money::new(dec!(25.00), Currency::USD);
        assert_eq!(a.checked_sub(&b).unwrap().amount(), dec!(-15.00));
    }

    #[test]
    fn test_checked_sub_currency_mismatch() {
        let a = Money::new(dec!(10.00), Currency::USD);
        let b = Money::new(dec!(10.00), Currency::CHF);
        assert!(matches!(a.checked_sub(&b), Err(MoneyError::CurrencyMismatch(_, _))));
    }

    #[test]
    fn test_sum_of_amounts() {
        let amounts = vec![
            Money::from_minor(333, Currency::USD),
            Money::from_minor(333, Currency::USD),
            Money::from_minor(334, Currency::USD),
        ];
        assert_eq!(Money::sum(Currency::USD, &amounts).unwrap(), Money::from_minor(1000, Currency::USD));
    }

    #[test]
    fn test_sum_rejects_mixed_currencies() {
        let amounts = vec![
            Money::from_minor(100, Currency::USD),
            Money::from_minor(100, Currency::EUR),
        ];
        assert!(Money::sum(Currency::USD, &amounts).is_err());
    }
}

mod allocation {
    use super::*;

    #[test]
    fn test_allocate_equal_parts() {
        let m = Money::new(dec!(9.00), Currency::USD);
        let parts = m.allocate(3).unwrap();
        assert!(parts.iter().all(|p| p.amount() == dec!(3.00)));
    }

    #[test]
    fn test_allocate_remainder_goes_to_first_parts() {
        let m = Money::new(dec!(0.05), Currency::USD);
        let parts: Vec<i64> = m
            .allocate(3)
            .unwrap()
            .iter()
            .map(|p| p.to_minor().unwrap())
            .collect();
        assert_eq!(parts, vec![2, 2, 1]);
    }

    #[test]
    fn test_allocate_single_part() {
        let m = Money::new(dec!(12.34), Currency::USD);
        assert_eq!(m.allocate(1).unwrap(), vec![m]);
    }

    #[test]
    fn test_allocate_fewer_cents_than_parts() {
        let m = Money::from_minor(2, Currency::USD);
        let parts: Vec<i64> = m
            .allocate(4)
            .unwrap()
            .iter()
            .map(|p| p.to_minor().unwrap())
            .collect();
        assert_eq!(parts, vec![1, 1, 0, 0]);
    }

    #[test]
    fn test_allocate_sub_cent_amount_fails() {
        let m = Money::new(dec!(1.005), Currency::USD);
        assert!(matches!(m.allocate(2), Err(MoneyError::SubMinorPrecision { .. })));
    }
}

mod currency {
    use super::*;

    #[test]
    fn test_minor_unit_factor() {
        assert_eq!(Currency::USD.minor_unit_factor(), 100);
        assert_eq!(Currency::JPY.minor_unit_factor(), 1);
    }

    #[test]
    fn test_currency_display() {
        assert_eq!(Currency::SGD.to_string(), "SGD");
    }
}

mod serialization {
    use super::*;

    #[test]
    fn test_money_json_roundtrip() {
        let m = Money::new(dec!(42.10), Currency::EUR);
        let json = serde_json::to_string(&m).unwrap();
        let back: Money = serde_json::from_str(&json).unwrap();
        assert_eq!(m, back);
    }

    #[test]
    fn test_currency_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Currency::HKD).unwrap(), "\"HKD\"");
    }
}
