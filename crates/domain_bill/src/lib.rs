//! Bill Domain - Shared Expense Ledger
//!
//! This crate implements the ledger of shared bills: who paid, what was
//! bought, who shares each item, and how much everyone owes. Several clients
//! may edit the same bill concurrently; consistency comes from
//! version-checked writes against a single authoritative store.
//!
//! # Components
//!
//! - **Balance Calculator** (`calculator`): penny-exact splitting of items
//!   among their participants, plus per-user balances across bills
//! - **Bill Command Service** (`commands`): create, update and soft-delete
//!   through compare-and-swap writes
//! - **Conflict Detector** (`conflict`): three-way diff of a stale edit,
//!   severity classification and the resolutions on offer
//! - **Ledger Store** (`ledger`): a user's read-side cache kept current from
//!   the store's change stream
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_bill::{BillCommandService, BillPatch, BillError};
//!
//! let service = BillCommandService::new(store, clock);
//! let bill = service.create_bill(request).await?;
//!
//! match service.update_bill(bill.id(), patch, bill.version(), actor).await {
//!     Ok(updated) => assert_eq!(updated.version(), 2),
//!     Err(BillError::Conflict(conflict)) => {
//!         // let the user pick one of conflict.conflict.resolution_options
//!     }
//!     Err(other) => return Err(other),
//! }
//! ```

pub mod activity;
pub mod bill;
pub mod calculator;
pub mod commands;
pub mod conflict;
pub mod error;
pub mod events;
pub mod ledger;
pub mod patch;
pub mod ports;

pub use activity::{ActivityType, BillActivity};
pub use bill::{Bill, BillItem, BillParticipant, CreateBillRequest};
pub use calculator::{split, CounterpartyBalance, UserBalances};
pub use commands::{BillCommandService, CommandServiceConfig, DeleteAck, ResolutionOutcome};
pub use conflict::{BillConflict, ConflictDetector, ConflictSeverity, ResolutionOption};
pub use error::{BillAction, BillError, ConflictError, ValidationError};
pub use events::BillEvent;
pub use ledger::{LedgerSnapshot, LedgerStore};
pub use patch::{BillField, BillPatch};
pub use ports::{
    BillChange, BillFilter, BillStorePort, BillSubscription, SubscriptionError, WriteOutcome,
};
