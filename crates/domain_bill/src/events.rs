//! Domain events for the bill ledger
//!
//! One event is published per committed write or conflict transition. They
//! are the logical "bill changed" notification handed to downstream
//! dispatchers; delivery is not this crate's concern.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{BillId, ConflictId, Money, ParticipantId};

use crate::bill::Bill;
use crate::conflict::{ConflictSeverity, ResolutionOption};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BillEvent {
    /// A bill was committed at version 1
    BillCreated {
        bill_id: BillId,
        version: u64,
        actor_id: ParticipantId,
        participant_ids: Vec<ParticipantId>,
        total_amount: Money,
        timestamp: DateTime<Utc>,
    },

    /// A version-checked update was committed
    BillUpdated {
        bill_id: BillId,
        version: u64,
        actor_id: ParticipantId,
        participant_ids: Vec<ParticipantId>,
        total_amount: Money,
        timestamp: DateTime<Utc>,
    },

    /// The bill was soft-deleted
    BillDeleted {
        bill_id: BillId,
        version: u64,
        actor_id: ParticipantId,
        participant_ids: Vec<ParticipantId>,
        timestamp: DateTime<Utc>,
    },

    /// A stale write was rejected and is waiting for a resolution
    ConflictDetected {
        conflict_id: ConflictId,
        bill_id: BillId,
        actor_id: ParticipantId,
        severity: ConflictSeverity,
        local_version: u64,
        server_version: u64,
        timestamp: DateTime<Utc>,
    },

    /// A pending conflict was settled
    ConflictResolved {
        conflict_id: ConflictId,
        bill_id: BillId,
        actor_id: ParticipantId,
        resolution: ResolutionOption,
        /// Version committed by the resolution, if it wrote anything
        version: Option<u64>,
        timestamp: DateTime<Utc>,
    },
}

impl BillEvent {
    pub(crate) fn created(bill: &Bill, actor: ParticipantId) -> Self {
        BillEvent::BillCreated {
            bill_id: bill.id(),
            version: bill.version(),
            actor_id: actor,
            participant_ids: bill.participant_ids().collect(),
            total_amount: bill.total_amount(),
            timestamp: bill.updated_at(),
        }
    }

    pub(crate) fn updated(bill: &Bill, actor: ParticipantId) -> Self {
        BillEvent::BillUpdated {
            bill_id: bill.id(),
            version: bill.version(),
            actor_id: actor,
            participant_ids: bill.participant_ids().collect(),
            total_amount: bill.total_amount(),
            timestamp: bill.updated_at(),
        }
    }

    pub(crate) fn deleted(bill: &Bill, actor: ParticipantId) -> Self {
        BillEvent::BillDeleted {
            bill_id: bill.id(),
            version: bill.version(),
            actor_id: actor,
            participant_ids: bill.participant_ids().collect(),
            timestamp: bill.updated_at(),
        }
    }

    pub fn bill_id(&self) -> BillId {
        match self {
            BillEvent::BillCreated { bill_id, .. }
            | BillEvent::BillUpdated { bill_id, .. }
            | BillEvent::BillDeleted { bill_id, .. }
            | BillEvent::ConflictDetected { bill_id, .. }
            | BillEvent::ConflictResolved { bill_id, .. } => *bill_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            BillEvent::BillCreated { timestamp, .. }
            | BillEvent::BillUpdated { timestamp, .. }
            | BillEvent::BillDeleted { timestamp, .. }
            | BillEvent::ConflictDetected { timestamp, .. }
            | BillEvent::ConflictResolved { timestamp, .. } => *timestamp,
        }
    }

    /// Returns the event type name for routing and logs
    pub fn event_type(&self) -> &'static str {
        match self {
            BillEvent::BillCreated { .. } => "bill_created",
            BillEvent::BillUpdated { .. } => "bill_updated",
            BillEvent::BillDeleted { .. } => "bill_deleted",
            BillEvent::ConflictDetected { .. } => "conflict_detected",
            BillEvent::ConflictResolved { .. } => "conflict_resolved",
        }
    }
}
