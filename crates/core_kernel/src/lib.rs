//! Core Kernel - Foundational types and utilities for the shared-bill ledger
//!
//! This crate provides the building blocks used across all domain modules:
//! - Money types with exact minor-unit arithmetic
//! - Strongly-typed identifiers
//! - Port error and health-check abstractions for adapters
//! - An injectable clock

pub mod money;
pub mod identifiers;
pub mod error;
pub mod ports;
pub mod clock;

pub use money::{Money, Currency, MoneyError};
pub use identifiers::{
    BillId, ItemId, ActivityId, ConflictId, ParticipantId, SessionId,
};
pub use error::CoreError;
pub use ports::{
    PortError, DomainPort, HealthCheckable, HealthCheckResult, AdapterHealth,
};
pub use clock::{Clock, SystemClock, FixedClock};
