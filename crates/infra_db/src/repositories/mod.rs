//! Repository implementations
//!
//! Repositories own the SQL. They speak in rows (UUIDs, `BIGINT` versions,
//! JSONB documents) and know nothing about the domain model; adapters
//! translate between the two.
//!
//! Every multi-statement write runs in one transaction, and the change
//! notification is issued inside it, so PostgreSQL delivers it only if the
//! write commits.

pub mod bill;

pub use bill::{
    BillRepository, BillRow, ConditionalWrite, NewActivity, NewBillVersion, BILL_CHANGES_CHANNEL,
};
