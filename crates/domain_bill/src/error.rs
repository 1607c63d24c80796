//! Bill domain errors
//!
//! The taxonomy is shaped around what a caller may do next: validation and
//! authorization failures are final, conflicts need a resolution choice, and
//! only transient storage failures are safe to retry.

use std::fmt;

use thiserror::Error;

use core_kernel::{BillId, ConflictId, Currency, ItemId, Money, ParticipantId, PortError};

use crate::bill::Bill;
use crate::conflict::{BillConflict, ResolutionOption};

/// Malformed bill contents or patch; never retried
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("A bill needs at least one item")]
    EmptyItems,

    #[error("Item {item_id} must have a positive price, got {price}")]
    NonPositivePrice { item_id: ItemId, price: Money },

    #[error("Item {item_id} has an unusable price: {reason}")]
    InvalidPrice { item_id: ItemId, reason: String },

    #[error("Item {item_id} is priced in {actual} but the bill is in {expected}")]
    CurrencyMismatch {
        item_id: ItemId,
        expected: Currency,
        actual: Currency,
    },

    #[error("Item {item_id} is not assigned to any participant")]
    UnassignedItem { item_id: ItemId },

    #[error("Item {item_id} is assigned to {participant_id}, who is not on the bill")]
    UnknownParticipant {
        item_id: ItemId,
        participant_id: ParticipantId,
    },

    #[error("Payer {0} is not a participant of the bill")]
    PayerNotParticipant(ParticipantId),

    #[error("Participant {0} is listed more than once")]
    DuplicateParticipant(ParticipantId),

    #[error("Item {0} is listed more than once")]
    DuplicateItem(ItemId),

    #[error("The patch does not change anything")]
    EmptyPatch,
}

/// What an actor attempted when authorization failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillAction {
    Edit,
    Delete,
}

impl fmt::Display for BillAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BillAction::Edit => write!(f, "edit"),
            BillAction::Delete => write!(f, "delete"),
        }
    }
}

/// A rejected write: the detected conflict plus the server's current snapshot
#[derive(Debug, Clone)]
pub struct ConflictError {
    pub conflict: BillConflict,
    pub server: Bill,
}

impl fmt::Display for ConflictError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bill {} expected v{} but the server is at v{} ({:?} severity, conflict {})",
            self.conflict.operation_id,
            self.conflict.local_version,
            self.conflict.server_version,
            self.conflict.severity,
            self.conflict.id,
        )
    }
}

/// Errors returned by the bill command surface
#[derive(Debug, Error)]
pub enum BillError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Version conflict: {0}")]
    Conflict(Box<ConflictError>),

    #[error("{actor_id} is not allowed to {action} bill {bill_id}")]
    Authorization {
        bill_id: BillId,
        actor_id: ParticipantId,
        action: BillAction,
    },

    #[error("Bill not found: {0}")]
    NotFound(BillId),

    #[error("Bill {0} is deleted and can no longer be edited")]
    Deleted(BillId),

    #[error("Conflict not found or already resolved: {0}")]
    ConflictNotFound(ConflictId),

    #[error("Resolution {resolution:?} is not offered for conflict {conflict_id}")]
    ResolutionNotOffered {
        conflict_id: ConflictId,
        resolution: ResolutionOption,
    },

    #[error("A manual resolution needs a resolved patch")]
    ManualPatchMissing,

    #[error("Bill {bill_id} kept changing while being deleted ({attempts} attempts)")]
    Contention { bill_id: BillId, attempts: u32 },

    #[error("Storage error: {0}")]
    Storage(#[from] PortError),
}

impl BillError {
    /// True when repeating the same call later may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            BillError::Storage(e) => e.is_transient(),
            BillError::Contention { .. } => true,
            _ => false,
        }
    }

    /// True when the caller must pick a conflict resolution
    pub fn requires_user_choice(&self) -> bool {
        matches!(self, BillError::Conflict(_))
    }

    /// True when the actor lacks permission for the operation
    pub fn is_forbidden(&self) -> bool {
        matches!(self, BillError::Authorization { .. })
    }

    /// Returns the conflict details, if this is a conflict
    pub fn as_conflict(&self) -> Option<&ConflictError> {
        match self {
            BillError::Conflict(conflict) => Some(conflict),
            _ => None,
        }
    }

    pub(crate) fn from_port(bill_id: BillId, error: PortError) -> Self {
        if error.is_not_found() {
            BillError::NotFound(bill_id)
        } else {
            BillError::Storage(error)
        }
    }
}
