//! Request/response data transfer objects

pub mod bills;
pub mod ledger;
pub mod session;
