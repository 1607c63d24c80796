//! Tests for core_kernel error types

use core_kernel::error::CoreError;
use core_kernel::money::MoneyError;
use core_kernel::PortError;

#[test]
fn test_core_error_validation() {
    let error = CoreError::validation("Invalid input");

    match error {
        CoreError::Validation(msg) => assert_eq!(msg, "Invalid input"),
        _ => panic!("Expected Validation error"),
    }
}

#[test]
fn test_core_error_not_found() {
    let error = CoreError::not_found("Bill not found");

    match error {
        CoreError::NotFound(msg) => assert_eq!(msg, "Bill not found"),
        _ => panic!("Expected NotFound error"),
    }
}

#[test]
fn test_core_error_from_money_error() {
    let money_error = MoneyError::CurrencyMismatch("USD".to_string(), "EUR".to_string());
    let core_error: CoreError = money_error.into();

    assert!(matches!(core_error, CoreError::Money(_)));
}

#[test]
fn test_core_error_configuration_display() {
    let error = CoreError::configuration("port must be non-zero");
    assert!(error.to_string().contains("Configuration error"));
}

#[test]
fn test_port_error_helpers() {
    assert!(PortError::connection("refused").is_transient());
    assert!(!PortError::transformation("bad json").is_transient());
    assert!(!PortError::internal("boom").is_not_found());
}
