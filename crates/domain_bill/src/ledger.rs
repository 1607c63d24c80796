//! Ledger Store (read side)
//!
//! An in-memory, eventually consistent view of one user's bills. It loads
//! once from the store, then follows the filtered change stream. Every
//! update produces a new immutable [`LedgerSnapshot`] on a `watch` channel,
//! so readers never observe a half-applied change and balances are always
//! recomputed together with the bills they derive from.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use core_kernel::{BillId, ParticipantId, PortError};

use crate::bill::Bill;
use crate::calculator::UserBalances;
use crate::ports::{BillChange, BillFilter, BillStorePort, SubscriptionError};

/// One consistent view of the user's ledger
#[derive(Debug, Clone)]
pub struct LedgerSnapshot {
    user: ParticipantId,
    revision: u64,
    /// Includes soft-deleted bills so late deliveries can be recognised
    bills: BTreeMap<BillId, Bill>,
    /// Highest version seen per bill, evicted bills included
    versions: BTreeMap<BillId, u64>,
    balances: UserBalances,
}

impl LedgerSnapshot {
    fn empty(user: ParticipantId) -> Self {
        Self {
            user,
            revision: 0,
            bills: BTreeMap::new(),
            versions: BTreeMap::new(),
            balances: UserBalances::compute(user, std::iter::empty::<&Bill>()),
        }
    }

    pub fn user(&self) -> ParticipantId {
        self.user
    }

    /// Increases by one with every applied change or reload
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Active bills, ordered by id
    pub fn bills(&self) -> impl Iterator<Item = &Bill> {
        self.bills.values().filter(|b| !b.is_deleted())
    }

    /// A cached bill, deleted or not
    pub fn bill(&self, id: BillId) -> Option<&Bill> {
        self.bills.get(&id)
    }

    pub fn balances(&self) -> &UserBalances {
        &self.balances
    }

    fn recompute(&mut self) {
        self.balances = UserBalances::compute(self.user, self.bills.values());
        self.revision += 1;
    }
}

/// Keeps one user's ledger current from the store's change stream
pub struct LedgerStore {
    user: ParticipantId,
    store: Arc<dyn BillStorePort>,
    snapshots: watch::Sender<Arc<LedgerSnapshot>>,
}

impl LedgerStore {
    pub fn new(user: ParticipantId, store: Arc<dyn BillStorePort>) -> Self {
        let (snapshots, _) = watch::channel(Arc::new(LedgerSnapshot::empty(user)));
        Self {
            user,
            store,
            snapshots,
        }
    }

    pub fn user(&self) -> ParticipantId {
        self.user
    }

    /// The latest published snapshot
    pub fn snapshot(&self) -> Arc<LedgerSnapshot> {
        self.snapshots.borrow().clone()
    }

    /// Receives a notification for every new snapshot
    pub fn subscribe(&self) -> watch::Receiver<Arc<LedgerSnapshot>> {
        self.snapshots.subscribe()
    }

    /// Replaces the cache with the store's current view
    #[instrument(skip(self), fields(user = %self.user))]
    pub async fn load(&self) -> Result<(), PortError> {
        let bills = self.store.bills_for_participant(self.user).await?;
        let count = bills.len();

        self.snapshots.send_modify(|snapshot| {
            let next = Arc::make_mut(snapshot);
            next.bills.clear();
            for bill in bills {
                next.versions.insert(bill.id(), bill.version());
                next.bills.insert(bill.id(), bill);
            }
            next.recompute();
        });

        debug!(bills = count, "Ledger loaded");
        Ok(())
    }

    /// Applies one delivered change; returns whether the snapshot changed
    ///
    /// Deliveries at or below the cached version are dropped. A bill that
    /// no longer involves the user is evicted.
    pub fn apply(&self, change: &BillChange) -> bool {
        let user = self.user;
        let bill = &change.bill;

        self.snapshots.send_if_modified(|snapshot| {
            if let Some(seen) = snapshot.versions.get(&bill.id()) {
                if bill.version() <= *seen {
                    debug!(bill_id = %bill.id(), version = bill.version(), seen, "Ignoring stale delivery");
                    return false;
                }
            }

            let next = Arc::make_mut(snapshot);
            next.versions.insert(bill.id(), bill.version());
            if bill.involves(user) {
                next.bills.insert(bill.id(), bill.clone());
            } else if next.bills.remove(&bill.id()).is_none() {
                return false;
            }
            next.recompute();
            debug!(bill_id = %bill.id(), version = bill.version(), revision = next.revision, "Ledger updated");
            true
        })
    }

    /// Follows the change stream until `shutdown` turns true
    ///
    /// Subscribes before the initial load so no commit between the two is
    /// missed. On lag the cache is rebuilt from the store.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), PortError> {
        let mut subscription = self.store.subscribe(BillFilter::for_participant(self.user));
        self.load().await?;
        info!(user = %self.user, "Ledger following change stream");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                received = subscription.recv() => match received {
                    Ok(change) => {
                        self.apply(&change);
                    }
                    Err(SubscriptionError::Lagged(skipped)) => {
                        warn!(skipped, "Change stream lagged, reloading ledger");
                        if let Err(e) = self.load().await {
                            warn!(error = %e, "Ledger reload failed, keeping previous snapshot");
                        }
                    }
                    Err(SubscriptionError::Closed) => {
                        info!("Change stream closed");
                        break;
                    }
                },
            }
        }

        info!(user = %self.user, "Ledger stopped");
        Ok(())
    }
}
