//! Test Utilities Crate
//!
//! Provides shared test infrastructure, fixtures, and helpers for the
//! shared-bill ledger test suite.
//!
//! # Modules
//!
//! - `fixtures`: Pre-built test data with deterministic identifiers
//! - `builders`: Builder patterns for bills and session snapshots
//! - `assertions`: Ledger invariant checks with readable failure messages
//! - `generators`: Property-based test data generators

pub mod fixtures;
pub mod builders;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use assertions::*;
pub use generators::*;
