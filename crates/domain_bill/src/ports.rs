//! Bill Store Port
//!
//! The remote document store the ledger commits to. The whole consistency
//! story rests on `write_if_version`: the store must read the current
//! version and conditionally write the next one inside a single
//! transaction, so at most one writer per bill wins per version.
//!
//! Adapters:
//!
//! - **PostgreSQL** (`infra_db::PostgresBillStore`)
//! - **Mock**: in-memory, behind the `mock` feature
//!
//! ```rust,ignore
//! let store: Arc<dyn BillStorePort> = Arc::new(PostgresBillStore::new(pool));
//! match store.write_if_version(&next, 3, &activities).await? {
//!     WriteOutcome::Committed(bill) => { /* version 4 landed */ }
//!     WriteOutcome::VersionConflict { current } => { /* route to the detector */ }
//! }
//! ```

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use core_kernel::{BillId, DomainPort, HealthCheckable, ParticipantId, PortError};

use crate::activity::BillActivity;
use crate::bill::Bill;

/// Result of a version-checked write
#[derive(Debug, Clone)]
pub enum WriteOutcome {
    /// The write landed; carries the committed bill
    Committed(Bill),
    /// The stored version did not match; nothing was written
    VersionConflict { current: Bill },
}

/// One committed bill state delivered on the change stream
#[derive(Debug, Clone, PartialEq)]
pub struct BillChange {
    pub bill: Bill,
    /// Participants of the version this change replaced
    pub previous_participants: Vec<ParticipantId>,
}

/// Selects which changes a subscriber receives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BillFilter {
    #[default]
    All,
    /// Bills the participant is or was part of
    Participant(ParticipantId),
    Bill(BillId),
}

impl BillFilter {
    pub fn all() -> Self {
        BillFilter::All
    }

    pub fn for_participant(participant: ParticipantId) -> Self {
        BillFilter::Participant(participant)
    }

    pub fn for_bill(bill_id: BillId) -> Self {
        BillFilter::Bill(bill_id)
    }

    /// A participant also sees the change that removed them
    pub fn matches(&self, change: &BillChange) -> bool {
        match self {
            BillFilter::All => true,
            BillFilter::Participant(p) => {
                change.bill.involves(*p) || change.previous_participants.contains(p)
            }
            BillFilter::Bill(id) => change.bill.id() == *id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    /// The subscriber fell behind and missed this many changes
    #[error("Change stream lagged, {0} changes skipped")]
    Lagged(u64),

    #[error("Change stream closed")]
    Closed,
}

/// A filtered receiver over the store's change stream
#[derive(Debug)]
pub struct BillSubscription {
    filter: BillFilter,
    receiver: broadcast::Receiver<BillChange>,
}

impl BillSubscription {
    pub fn new(filter: BillFilter, receiver: broadcast::Receiver<BillChange>) -> Self {
        Self { filter, receiver }
    }

    pub fn filter(&self) -> BillFilter {
        self.filter
    }

    /// Waits for the next change that passes the filter
    pub async fn recv(&mut self) -> Result<BillChange, SubscriptionError> {
        loop {
            match self.receiver.recv().await {
                Ok(change) if self.filter.matches(&change) => return Ok(change),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    return Err(SubscriptionError::Lagged(skipped))
                }
                Err(broadcast::error::RecvError::Closed) => return Err(SubscriptionError::Closed),
            }
        }
    }
}

/// Port for the authoritative bill store
#[async_trait]
pub trait BillStorePort: DomainPort + HealthCheckable {
    /// Current state of a bill, deleted or not
    async fn get_bill(&self, id: BillId) -> Result<Bill, PortError>;

    /// A historical version, if the store still has it
    async fn get_bill_at_version(&self, id: BillId, version: u64)
        -> Result<Option<Bill>, PortError>;

    async fn read_version(&self, id: BillId) -> Result<u64, PortError>;

    /// Stores a new bill at version 1 with its activities
    ///
    /// Fails with `PortError::Conflict` if the id is taken.
    async fn insert_bill(&self, bill: &Bill, activities: &[BillActivity]) -> Result<(), PortError>;

    /// Compare-and-swap: writes `bill` only if the stored version is
    /// `expected_version`, appending `activities` in the same transaction
    async fn write_if_version(
        &self,
        bill: &Bill,
        expected_version: u64,
        activities: &[BillActivity],
    ) -> Result<WriteOutcome, PortError>;

    /// Every bill the participant created or takes part in, deleted ones included
    async fn bills_for_participant(&self, participant: ParticipantId)
        -> Result<Vec<Bill>, PortError>;

    /// Activity entries of a bill in write order
    async fn activities(&self, bill_id: BillId) -> Result<Vec<BillActivity>, PortError>;

    /// Subscribes to committed changes from now on
    fn subscribe(&self, filter: BillFilter) -> BillSubscription;
}

/// In-memory BillStorePort for tests
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio::sync::RwLock;

    use core_kernel::HealthCheckResult;

    const MOCK_ID: &str = "mock-bill-store";

    #[derive(Debug, Default)]
    struct MockState {
        bills: HashMap<BillId, Bill>,
        history: HashMap<(BillId, u64), Bill>,
        activities: Vec<BillActivity>,
    }

    /// Keeps every version in memory; one write lock makes each
    /// compare-and-swap atomic
    #[derive(Debug, Clone)]
    pub struct MockBillStore {
        state: Arc<RwLock<MockState>>,
        changes: broadcast::Sender<BillChange>,
        unavailable: Arc<AtomicBool>,
    }

    impl Default for MockBillStore {
        fn default() -> Self {
            Self::with_capacity(256)
        }
    }

    impl MockBillStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Creates a store whose change stream buffers `capacity` changes
        pub fn with_capacity(capacity: usize) -> Self {
            let (changes, _) = broadcast::channel(capacity.max(1));
            Self {
                state: Arc::new(RwLock::new(MockState::default())),
                changes,
                unavailable: Arc::new(AtomicBool::new(false)),
            }
        }

        /// Pre-populates with bills, bypassing the change stream
        pub async fn with_bills(bills: Vec<Bill>) -> Self {
            let store = Self::new();
            {
                let mut state = store.state.write().await;
                for bill in bills {
                    state.history.insert((bill.id(), bill.version()), bill.clone());
                    state.bills.insert(bill.id(), bill);
                }
            }
            store
        }

        /// Makes every call fail with `ServiceUnavailable` until reset
        pub fn set_unavailable(&self, unavailable: bool) {
            self.unavailable.store(unavailable, Ordering::SeqCst);
        }

        /// Writes a bill as-is, as if another client had committed it
        pub async fn force_put(&self, bill: Bill) {
            let mut state = self.state.write().await;
            let previous = state
                .bills
                .get(&bill.id())
                .map(|b| b.participant_ids().collect())
                .unwrap_or_default();
            state.history.insert((bill.id(), bill.version()), bill.clone());
            state.bills.insert(bill.id(), bill.clone());
            let _ = self.changes.send(BillChange {
                bill,
                previous_participants: previous,
            });
        }

        pub async fn bill_count(&self) -> usize {
            self.state.read().await.bills.len()
        }

        fn check_available(&self) -> Result<(), PortError> {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(PortError::unavailable(MOCK_ID));
            }
            Ok(())
        }
    }

    impl DomainPort for MockBillStore {}

    #[async_trait]
    impl HealthCheckable for MockBillStore {
        async fn health_check(&self) -> HealthCheckResult {
            if self.unavailable.load(Ordering::SeqCst) {
                HealthCheckResult::unhealthy(MOCK_ID, 0, "marked unavailable")
            } else {
                HealthCheckResult::healthy(MOCK_ID, 0)
            }
        }
    }

    #[async_trait]
    impl BillStorePort for MockBillStore {
        async fn get_bill(&self, id: BillId) -> Result<Bill, PortError> {
            self.check_available()?;
            self.state
                .read()
                .await
                .bills
                .get(&id)
                .cloned()
                .ok_or_else(|| PortError::not_found("Bill", id))
        }

        async fn get_bill_at_version(
            &self,
            id: BillId,
            version: u64,
        ) -> Result<Option<Bill>, PortError> {
            self.check_available()?;
            Ok(self.state.read().await.history.get(&(id, version)).cloned())
        }

        async fn read_version(&self, id: BillId) -> Result<u64, PortError> {
            self.get_bill(id).await.map(|bill| bill.version())
        }

        async fn insert_bill(
            &self,
            bill: &Bill,
            activities: &[BillActivity],
        ) -> Result<(), PortError> {
            self.check_available()?;
            let mut state = self.state.write().await;
            if state.bills.contains_key(&bill.id()) {
                return Err(PortError::conflict(format!("bill {} already exists", bill.id())));
            }
            state.history.insert((bill.id(), bill.version()), bill.clone());
            state.bills.insert(bill.id(), bill.clone());
            state.activities.extend_from_slice(activities);
            drop(state);

            let _ = self.changes.send(BillChange {
                bill: bill.clone(),
                previous_participants: Vec::new(),
            });
            Ok(())
        }

        async fn write_if_version(
            &self,
            bill: &Bill,
            expected_version: u64,
            activities: &[BillActivity],
        ) -> Result<WriteOutcome, PortError> {
            self.check_available()?;
            if bill.version() != expected_version + 1 {
                return Err(PortError::internal(format!(
                    "write of v{} does not follow v{expected_version}",
                    bill.version()
                )));
            }

            let mut state = self.state.write().await;
            let current = state
                .bills
                .get(&bill.id())
                .cloned()
                .ok_or_else(|| PortError::not_found("Bill", bill.id()))?;

            if current.version() != expected_version {
                return Ok(WriteOutcome::VersionConflict { current });
            }

            state.history.insert((bill.id(), bill.version()), bill.clone());
            state.bills.insert(bill.id(), bill.clone());
            state.activities.extend_from_slice(activities);
            drop(state);

            let _ = self.changes.send(BillChange {
                bill: bill.clone(),
                previous_participants: current.participant_ids().collect(),
            });
            Ok(WriteOutcome::Committed(bill.clone()))
        }

        async fn bills_for_participant(
            &self,
            participant: ParticipantId,
        ) -> Result<Vec<Bill>, PortError> {
            self.check_available()?;
            let state = self.state.read().await;
            let mut bills: Vec<Bill> = state
                .bills
                .values()
                .filter(|bill| bill.involves(participant))
                .cloned()
                .collect();
            bills.sort_by_key(|bill| (bill.created_at(), bill.id()));
            Ok(bills)
        }

        async fn activities(&self, bill_id: BillId) -> Result<Vec<BillActivity>, PortError> {
            self.check_available()?;
            Ok(self
                .state
                .read()
                .await
                .activities
                .iter()
                .filter(|a| a.bill_id == bill_id)
                .cloned()
                .collect())
        }

        fn subscribe(&self, filter: BillFilter) -> BillSubscription {
            BillSubscription::new(filter, self.changes.subscribe())
        }
    }
}
