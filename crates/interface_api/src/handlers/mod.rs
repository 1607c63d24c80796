//! Request handlers

pub mod bills;
pub mod conflicts;
pub mod health;
pub mod ledger;
pub mod session;
