//! Session Domain - Recovery of Unfinished Bills
//!
//! Creating a bill is a multi-step flow (capture, items, participants,
//! assignment, review). Until the bill is committed, its state lives only in
//! a local session snapshot. This crate persists that snapshot atomically and
//! decides whether it may be offered again after an interruption:
//!
//! - saved less than `max_age` ago (24 hours by default)
//! - not at the terminal `Complete` step
//! - holds at least one item or participant
//!
//! Snapshots failing a check, and files that cannot be read back, are
//! cleared instead of surfaced. Discarding a session never touches the
//! ledger, since nothing is committed before `create_bill` succeeds.

pub mod error;
pub mod recovery;
pub mod snapshot;
pub mod store;

pub use error::SessionError;
pub use recovery::{RecoveryAssessment, RecoveryPolicy};
pub use snapshot::{CreationStep, SessionSnapshot, SESSION_SCHEMA_VERSION};
pub use store::{FileSessionStore, SessionPort};
