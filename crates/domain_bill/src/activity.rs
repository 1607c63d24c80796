//! Append-only activity feed entries
//!
//! Each committed write produces one entry per affected participant so every
//! feed can be read without joining against the bill.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{ActivityId, BillId, Money, ParticipantId};

use crate::bill::Bill;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
    Created,
    Edited,
    Deleted,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::Created => "created",
            ActivityType::Edited => "edited",
            ActivityType::Deleted => "deleted",
        }
    }
}

/// An audit record; never mutated or removed once written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillActivity {
    pub id: ActivityId,
    pub bill_id: BillId,
    /// Whose feed the entry belongs to
    pub participant_id: ParticipantId,
    pub actor_id: ParticipantId,
    pub activity_type: ActivityType,
    pub timestamp: DateTime<Utc>,
    /// Bill total at the time of the write
    pub amount_snapshot: Money,
    pub bill_version: u64,
}

impl BillActivity {
    /// Builds the entries for a committed write of `bill`
    ///
    /// Recipients are the bill's participants plus, for edits, anyone dropped
    /// from `previous`, so removed participants still learn about the change.
    pub fn fan_out(
        bill: &Bill,
        previous: Option<&Bill>,
        actor: ParticipantId,
        activity_type: ActivityType,
        now: DateTime<Utc>,
    ) -> Vec<BillActivity> {
        let mut recipients: BTreeSet<ParticipantId> = bill.participant_ids().collect();
        if let Some(previous) = previous {
            recipients.extend(previous.participant_ids());
        }

        recipients
            .into_iter()
            .map(|participant_id| BillActivity {
                id: ActivityId::new_v7(),
                bill_id: bill.id(),
                participant_id,
                actor_id: actor,
                activity_type,
                timestamp: now,
                amount_snapshot: bill.total_amount(),
                bill_version: bill.version(),
            })
            .collect()
    }
}
