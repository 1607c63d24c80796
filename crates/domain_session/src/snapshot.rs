//! Snapshot of an unfinished bill-creation flow

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{Currency, ParticipantId, SessionId};
use domain_bill::{BillItem, BillParticipant, CreateBillRequest};

use crate::error::SessionError;

/// Format version written into every snapshot
pub const SESSION_SCHEMA_VERSION: u32 = 1;

/// Steps of the creation flow, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreationStep {
    /// Scanning or typing in the receipt
    Capture,
    /// Reviewing the captured items
    Items,
    /// Picking who takes part
    Participants,
    /// Assigning items to participants
    Assignment,
    /// Final check before committing
    Review,
    /// The bill was committed; nothing left to recover
    Complete,
}

impl CreationStep {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CreationStep::Complete)
    }
}

/// Everything needed to resume a creation flow after an interruption
///
/// Items may still be unassigned or provisionally priced; nothing here is
/// validated until the flow turns into a `CreateBillRequest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub schema_version: u32,
    pub session_id: SessionId,
    pub step: CreationStep,
    #[serde(default)]
    pub bill_name: String,
    pub currency: Currency,
    #[serde(default)]
    pub payer_id: Option<ParticipantId>,
    #[serde(default)]
    pub items: Vec<BillItem>,
    #[serde(default)]
    pub participants: Vec<BillParticipant>,
    pub last_saved_at: DateTime<Utc>,
}

impl SessionSnapshot {
    /// A fresh session at the capture step
    pub fn new(session_id: SessionId, currency: Currency, now: DateTime<Utc>) -> Self {
        Self {
            schema_version: SESSION_SCHEMA_VERSION,
            session_id,
            step: CreationStep::Capture,
            bill_name: String::new(),
            currency,
            payer_id: None,
            items: Vec::new(),
            participants: Vec::new(),
            last_saved_at: now,
        }
    }

    /// True when there is nothing worth recovering
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.participants.is_empty()
    }

    /// Builds the create command for the finished flow
    ///
    /// # Errors
    ///
    /// `Incomplete` when no payer was chosen or the bill has no name. Content
    /// rules (prices, assignments) are left to the command service.
    pub fn to_create_request(
        &self,
        created_by: ParticipantId,
        date: NaiveDate,
    ) -> Result<CreateBillRequest, SessionError> {
        let paid_by = self
            .payer_id
            .ok_or_else(|| SessionError::incomplete("no payer selected"))?;
        let bill_name = self.bill_name.trim();
        if bill_name.is_empty() {
            return Err(SessionError::incomplete("bill has no name"));
        }

        Ok(CreateBillRequest {
            bill_name: bill_name.to_string(),
            currency: self.currency,
            date,
            created_by,
            paid_by,
            items: self.items.clone(),
            participants: self.participants.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_only_complete_is_terminal() {
        assert!(CreationStep::Complete.is_terminal());
        assert!(!CreationStep::Review.is_terminal());
        assert!(CreationStep::Capture < CreationStep::Review);
    }

    #[test]
    fn test_new_session_is_empty() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let snapshot = SessionSnapshot::new(SessionId::new(), Currency::EUR, now);
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.schema_version, SESSION_SCHEMA_VERSION);
    }

    #[test]
    fn test_request_needs_payer() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let mut snapshot = SessionSnapshot::new(SessionId::new(), Currency::EUR, now);
        snapshot.bill_name = "Brunch".to_string();

        let result = snapshot.to_create_request(ParticipantId::new(), now.date_naive());
        assert!(matches!(result, Err(SessionError::Incomplete(_))));
    }
}
