//! Live per-participant ledgers
//!
//! The first ledger request of a participant loads their bills and starts a
//! task that follows the change stream. Later requests read the latest
//! snapshot without touching the store. A follower that stops on its own
//! (closed stream, failed reload) is forgotten and restarted on next use.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use core_kernel::{ParticipantId, PortError};
use domain_bill::{BillStorePort, LedgerSnapshot, LedgerStore};

struct Follower {
    ledger: Arc<LedgerStore>,
    task: JoinHandle<()>,
}

struct Inner {
    store: Arc<dyn BillStorePort>,
    stop: watch::Sender<bool>,
    followers: Mutex<HashMap<ParticipantId, Follower>>,
}

/// Running ledgers keyed by participant
#[derive(Clone)]
pub struct LedgerRegistry {
    inner: Arc<Inner>,
}

impl LedgerRegistry {
    pub fn new(store: Arc<dyn BillStorePort>) -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                store,
                stop,
                followers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The participant's ledger, started and loaded on first use
    ///
    /// # Errors
    ///
    /// The store error of the initial load; nothing is cached in that case.
    pub async fn ledger(&self, user: ParticipantId) -> Result<Arc<LedgerStore>, PortError> {
        let mut followers = self.inner.followers.lock().await;
        if let Some(follower) = followers.get(&user) {
            if !follower.task.is_finished() {
                return Ok(follower.ledger.clone());
            }
            debug!(%user, "Ledger follower stopped, restarting");
            followers.remove(&user);
        }
        if *self.inner.stop.borrow() {
            return Err(PortError::unavailable("ledger"));
        }

        let ledger = Arc::new(LedgerStore::new(user, self.inner.store.clone()));
        ledger.load().await?;

        let task = {
            let ledger = ledger.clone();
            let stop = self.inner.stop.subscribe();
            tokio::spawn(async move {
                if let Err(e) = ledger.run(stop).await {
                    warn!(user = %ledger.user(), error = %e, "Ledger follower failed");
                }
            })
        };
        followers.insert(
            user,
            Follower {
                ledger: ledger.clone(),
                task,
            },
        );
        info!(%user, live = followers.len(), "Ledger follower started");
        Ok(ledger)
    }

    /// The latest snapshot of the participant's ledger
    pub async fn snapshot(&self, user: ParticipantId) -> Result<Arc<LedgerSnapshot>, PortError> {
        Ok(self.ledger(user).await?.snapshot())
    }

    pub async fn live_count(&self) -> usize {
        self.inner.followers.lock().await.len()
    }

    /// Stops every follower and waits for them to finish
    pub async fn shutdown(&self) {
        self.inner.stop.send_replace(true);
        let followers: Vec<Follower> = self
            .inner
            .followers
            .lock()
            .await
            .drain()
            .map(|(_, follower)| follower)
            .collect();

        let count = followers.len();
        for follower in followers {
            if let Err(e) = follower.task.await {
                warn!(error = %e, "Ledger follower task panicked");
            }
        }
        info!(count, "Ledger followers stopped");
    }
}
