//! Infrastructure Database Layer
//!
//! PostgreSQL persistence for the shared-bill ledger using SQLx.
//!
//! # Architecture
//!
//! The crate follows the repository pattern: `repositories` hold the SQL and
//! work in rows, `adapters` implement the domain ports on top of them.
//!
//! # Consistency
//!
//! The bill store's conditional write locks the bill row, compares versions
//! and writes the next version, its history row, member rows and activities
//! in one transaction. A `NOTIFY` issued inside that transaction announces
//! the commit to every listening service instance.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig, PostgresBillStore};
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/splitledger")).await?;
//! run_migrations(&pool).await?;
//! let store = PostgresBillStore::new(pool);
//! ```

pub mod adapters;
pub mod error;
pub mod pool;
pub mod repositories;

pub use adapters::{ChangeNotification, PostgresBillStore};
pub use error::DatabaseError;
pub use pool::{create_pool, create_pool_from_url, run_migrations, DatabaseConfig, DatabasePool};
pub use repositories::BillRepository;
