//! Domain Adapters
//!
//! Adapter implementations for domain ports, connecting domain interfaces to
//! the PostgreSQL database layer. Each adapter implements the domain's port
//! trait, translates between domain models and rows, and uses the
//! repository layer for the SQL.
//!
//! ```rust,ignore
//! use infra_db::adapters::PostgresBillStore;
//! use domain_bill::BillStorePort;
//!
//! let store = PostgresBillStore::new(pool);
//! let bill = store.get_bill(bill_id).await?;
//! ```

pub mod bill;

pub use bill::{ChangeNotification, PostgresBillStore};
