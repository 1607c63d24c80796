//! Rules deciding whether a saved session may be offered for recovery

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::snapshot::SessionSnapshot;

/// Verdict on a loaded snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAssessment {
    Recoverable,
    /// Saved too long ago
    Expired,
    /// The flow already finished
    Terminal,
    /// No items and no participants
    Empty,
}

impl RecoveryAssessment {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RecoveryAssessment::Recoverable)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryPolicy {
    /// Snapshots at least this old are expired
    pub max_age: std::time::Duration,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            max_age: std::time::Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl RecoveryPolicy {
    pub fn with_max_age_hours(hours: u64) -> Self {
        Self {
            max_age: std::time::Duration::from_secs(hours.saturating_mul(60 * 60)),
        }
    }

    /// Checks expiry first, then the step, then the contents
    ///
    /// A snapshot stamped in the future (clock skew) counts as fresh.
    pub fn assess(&self, snapshot: &SessionSnapshot, now: DateTime<Utc>) -> RecoveryAssessment {
        if self.is_expired(snapshot.last_saved_at, now) {
            RecoveryAssessment::Expired
        } else if snapshot.step.is_terminal() {
            RecoveryAssessment::Terminal
        } else if snapshot.is_empty() {
            RecoveryAssessment::Empty
        } else {
            RecoveryAssessment::Recoverable
        }
    }

    fn is_expired(&self, saved_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        // Negative ages (future stamps) fail the conversion and count as fresh
        match (now - saved_at).to_std() {
            Ok(age) => age >= self.max_age,
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::CreationStep;
    use chrono::{Duration, TimeZone};
    use core_kernel::{Currency, ItemId, Money, SessionId};
    use domain_bill::BillItem;

    fn snapshot(saved_at: DateTime<Utc>) -> SessionSnapshot {
        let mut snapshot = SessionSnapshot::new(SessionId::new(), Currency::USD, saved_at);
        snapshot.step = CreationStep::Items;
        snapshot.items.push(BillItem::new(
            ItemId::new(),
            "Tacos",
            Money::from_minor(1250, Currency::USD),
        ));
        snapshot
    }

    #[test]
    fn test_fresh_snapshot_is_recoverable() {
        let now = Utc.with_ymd_and_hms(2024, 4, 1, 12, 0, 0).unwrap();
        let policy = RecoveryPolicy::default();
        assert_eq!(
            policy.assess(&snapshot(now - Duration::hours(23)), now),
            RecoveryAssessment::Recoverable
        );
    }

    #[test]
    fn test_expiry_boundary() {
        let now = Utc.with_ymd_and_hms(2024, 4, 1, 12, 0, 0).unwrap();
        let policy = RecoveryPolicy::default();
        assert_eq!(
            policy.assess(&snapshot(now - Duration::hours(24)), now),
            RecoveryAssessment::Expired
        );
        assert_eq!(
            policy.assess(&snapshot(now - Duration::hours(25)), now),
            RecoveryAssessment::Expired
        );
    }

    #[test]
    fn test_future_stamp_counts_as_fresh() {
        let now = Utc.with_ymd_and_hms(2024, 4, 1, 12, 0, 0).unwrap();
        assert!(RecoveryPolicy::default()
            .assess(&snapshot(now + Duration::minutes(5)), now)
            .is_recoverable());
    }

    #[test]
    fn test_terminal_and_empty() {
        let now = Utc.with_ymd_and_hms(2024, 4, 1, 12, 0, 0).unwrap();
        let policy = RecoveryPolicy::default();

        let mut done = snapshot(now);
        done.step = CreationStep::Complete;
        assert_eq!(policy.assess(&done, now), RecoveryAssessment::Terminal);

        let mut empty = snapshot(now);
        empty.items.clear();
        assert_eq!(policy.assess(&empty, now), RecoveryAssessment::Empty);
    }

    #[test]
    fn test_custom_max_age() {
        let now = Utc.with_ymd_and_hms(2024, 4, 1, 12, 0, 0).unwrap();
        let policy = RecoveryPolicy::with_max_age_hours(2);
        assert_eq!(
            policy.assess(&snapshot(now - Duration::hours(3)), now),
            RecoveryAssessment::Expired
        );
    }
}
