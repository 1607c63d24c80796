//! Bill Command Service (write side)
//!
//! Every write goes through the store's compare-and-swap. Nothing is retried
//! blindly: a version mismatch on update is turned into a `BillConflict`,
//! parked in the pending registry and handed back to the caller, who picks a
//! resolution through [`BillCommandService::resolve_conflict`].
//!
//! Soft delete is the exception. Its marker does not depend on the content
//! it races with, so a lost race is re-read and retried a bounded number of
//! times.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, instrument, warn};

use core_kernel::{BillId, Clock, ConflictId, ParticipantId};

use crate::activity::{ActivityType, BillActivity};
use crate::bill::{Bill, CreateBillRequest};
use crate::conflict::{BillConflict, ConflictDetector, ConflictSeverity, ResolutionOption};
use crate::error::{BillAction, BillError, ConflictError, ValidationError};
use crate::events::BillEvent;
use crate::patch::BillPatch;
use crate::ports::{BillStorePort, WriteOutcome};

/// Upper bound on the pending-conflict lifetime (about a century)
const MAX_PENDING_TTL_SECS: i64 = 100 * 365 * 24 * 60 * 60;

/// Tunables for the command service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandServiceConfig {
    /// Force low-severity conflicts through without asking
    pub auto_dismiss_low_severity: bool,
    /// Attempts a delete makes when it keeps losing version races
    pub delete_retry_limit: u32,
    /// Buffer of the domain event channel
    pub event_channel_capacity: usize,
    /// Seconds an unresolved conflict stays pending
    pub pending_conflict_ttl_secs: u64,
}

impl Default for CommandServiceConfig {
    fn default() -> Self {
        Self {
            auto_dismiss_low_severity: false,
            delete_retry_limit: 3,
            event_channel_capacity: 256,
            pending_conflict_ttl_secs: 24 * 60 * 60,
        }
    }
}

/// Acknowledgement of a soft delete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteAck {
    pub bill_id: BillId,
    pub version: u64,
    pub deleted_by: Option<ParticipantId>,
    /// Timestamp of the first successful delete
    pub deleted_at: Option<DateTime<Utc>>,
    /// True when the bill was already deleted before this call
    pub already_deleted: bool,
}

impl DeleteAck {
    fn of(bill: &Bill, already_deleted: bool) -> Self {
        Self {
            bill_id: bill.id(),
            version: bill.version(),
            deleted_by: bill.deleted_by(),
            deleted_at: bill.deleted_at(),
            already_deleted,
        }
    }
}

/// What a conflict resolution did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "bill", rename_all = "snake_case")]
pub enum ResolutionOutcome {
    /// A patch was written; carries the committed bill
    Committed(Bill),
    /// Nothing was written; carries the current server copy to re-edit from
    ServerAccepted(Bill),
    /// The edit was abandoned
    Cancelled,
}

/// A rejected write waiting for its resolution
#[derive(Debug, Clone)]
struct PendingConflict {
    conflict: BillConflict,
    /// The version the client edited from
    base: Bill,
    patch: BillPatch,
    actor: ParticipantId,
    /// The server copy the conflict was detected against
    server: Bill,
}

/// Validates and commits bill commands against the store
pub struct BillCommandService {
    store: Arc<dyn BillStorePort>,
    clock: Arc<dyn Clock>,
    detector: ConflictDetector,
    config: CommandServiceConfig,
    pending: RwLock<HashMap<ConflictId, PendingConflict>>,
    events: broadcast::Sender<BillEvent>,
}

impl BillCommandService {
    pub fn new(store: Arc<dyn BillStorePort>, clock: Arc<dyn Clock>) -> Self {
        Self::with_config(store, clock, CommandServiceConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn BillStorePort>,
        clock: Arc<dyn Clock>,
        config: CommandServiceConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_channel_capacity.max(1));
        Self {
            store,
            clock,
            detector: ConflictDetector::new(),
            config,
            pending: RwLock::new(HashMap::new()),
            events,
        }
    }

    pub fn config(&self) -> &CommandServiceConfig {
        &self.config
    }

    /// Receives every domain event published from now on
    pub fn subscribe_events(&self) -> broadcast::Receiver<BillEvent> {
        self.events.subscribe()
    }

    /// Creates a bill at version 1
    ///
    /// The bill, its totals and one `created` activity per participant are
    /// written in a single store transaction.
    #[instrument(skip(self, request), fields(created_by = %request.created_by, items = request.items.len()))]
    pub async fn create_bill(&self, request: CreateBillRequest) -> Result<Bill, BillError> {
        let actor = request.created_by;
        let now = self.clock.now();
        let bill = Bill::create(BillId::new_v7(), request, now)?;

        let activities = BillActivity::fan_out(&bill, None, actor, ActivityType::Created, now);
        self.store
            .insert_bill(&bill, &activities)
            .await
            .map_err(BillError::Storage)?;

        info!(bill_id = %bill.id(), total = %bill.total_amount(), "Bill created");
        self.publish(BillEvent::created(&bill, actor));
        Ok(bill)
    }

    /// Applies `patch` if the bill is still at `expected_version`
    ///
    /// # Errors
    ///
    /// - `Conflict` when another write landed first; nothing is written and
    ///   the conflict is parked until resolved
    /// - `Validation` when the patched bill breaks a content rule
    /// - `Authorization` when `actor` is not part of the bill
    /// - `Deleted` when the bill is soft-deleted
    #[instrument(skip(self, patch), fields(bill_id = %bill_id, actor = %actor))]
    pub async fn update_bill(
        &self,
        bill_id: BillId,
        patch: BillPatch,
        expected_version: u64,
        actor: ParticipantId,
    ) -> Result<Bill, BillError> {
        let current = self.load(bill_id).await?;
        if current.is_deleted() {
            return Err(BillError::Deleted(bill_id));
        }
        if !current.can_edit(actor) {
            return Err(BillError::Authorization {
                bill_id,
                actor_id: actor,
                action: BillAction::Edit,
            });
        }
        if patch.is_empty() {
            return Err(ValidationError::EmptyPatch.into());
        }

        if current.version() != expected_version {
            return self
                .handle_stale_write(expected_version, patch, actor, current)
                .await;
        }

        let next = current.with_patch(&patch, actor, self.clock.now())?;
        match self.commit(&next, &current, actor, ActivityType::Edited).await? {
            WriteOutcome::Committed(bill) => {
                info!(version = bill.version(), "Bill updated");
                self.publish(BillEvent::updated(&bill, actor));
                Ok(bill)
            }
            WriteOutcome::VersionConflict { current } => {
                self.handle_stale_write(expected_version, patch, actor, current)
                    .await
            }
        }
    }

    /// Soft-deletes a bill; only its creator or payer may do so
    ///
    /// Deleting an already deleted bill succeeds and reports the original
    /// deletion.
    #[instrument(skip(self), fields(bill_id = %bill_id, actor = %actor))]
    pub async fn delete_bill(
        &self,
        bill_id: BillId,
        actor: ParticipantId,
    ) -> Result<DeleteAck, BillError> {
        let attempts = self.config.delete_retry_limit.max(1);

        for attempt in 1..=attempts {
            let current = self.load(bill_id).await?;
            if !current.can_delete(actor) {
                return Err(BillError::Authorization {
                    bill_id,
                    actor_id: actor,
                    action: BillAction::Delete,
                });
            }
            if current.is_deleted() {
                debug!("Bill already deleted");
                return Ok(DeleteAck::of(&current, true));
            }

            let next = current.soft_deleted(actor, self.clock.now());
            let activities =
                BillActivity::fan_out(&next, None, actor, ActivityType::Deleted, next.updated_at());
            let outcome = self
                .store
                .write_if_version(&next, current.version(), &activities)
                .await
                .map_err(|e| BillError::from_port(bill_id, e))?;

            match outcome {
                WriteOutcome::Committed(bill) => {
                    info!(version = bill.version(), "Bill soft-deleted");
                    self.publish(BillEvent::deleted(&bill, actor));
                    return Ok(DeleteAck::of(&bill, false));
                }
                WriteOutcome::VersionConflict { current } => {
                    debug!(attempt, server_version = current.version(), "Delete lost a version race");
                }
            }
        }

        warn!(attempts, "Giving up on delete after repeated version races");
        Err(BillError::Contention { bill_id, attempts })
    }

    /// Settles a pending conflict with one of its offered resolutions
    ///
    /// Only the actor whose write was rejected may resolve it, and `Cancel`
    /// is accepted at every severity. The conflict leaves the registry before
    /// anything is written, so concurrent resolutions of one conflict cannot
    /// both proceed. It is put back when the chosen patch fails validation or
    /// the store is briefly unavailable, so another attempt can be made.
    #[instrument(skip(self, manual_patch), fields(conflict_id = %conflict_id, ?resolution))]
    pub async fn resolve_conflict(
        &self,
        conflict_id: ConflictId,
        resolution: ResolutionOption,
        manual_patch: Option<BillPatch>,
        actor: ParticipantId,
    ) -> Result<ResolutionOutcome, BillError> {
        let pending = self
            .claim_pending(conflict_id, resolution, manual_patch.is_some(), actor)
            .await?;
        let bill_id = pending.conflict.operation_id;

        let result = match resolution {
            ResolutionOption::Cancel => Ok(ResolutionOutcome::Cancelled),
            ResolutionOption::AcceptServer => {
                self.load(bill_id).await.map(ResolutionOutcome::ServerAccepted)
            }
            ResolutionOption::AcceptLocal => {
                let patch = pending.patch.clone();
                self.write_resolution(&pending, patch).await
            }
            ResolutionOption::Manual => match manual_patch {
                Some(patch) => self.write_resolution(&pending, patch).await,
                None => Err(BillError::ManualPatchMissing),
            },
            ResolutionOption::Merge => {
                let merged = self.detector.merge(
                    &pending.base,
                    &pending.patch,
                    &pending.server,
                    &pending.conflict.conflicting_fields,
                );
                if merged.is_empty() {
                    self.load(bill_id).await.map(ResolutionOutcome::ServerAccepted)
                } else {
                    self.write_resolution(&pending, merged).await
                }
            }
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                if matches!(e, BillError::Validation(_)) || e.is_retryable() {
                    debug!(error = %e, "Resolution failed, conflict stays pending");
                    self.pending.write().await.insert(conflict_id, pending);
                }
                return Err(e);
            }
        };

        let version = match &outcome {
            ResolutionOutcome::Committed(bill) => Some(bill.version()),
            _ => None,
        };
        info!(?version, "Conflict resolved");
        self.publish(BillEvent::ConflictResolved {
            conflict_id,
            bill_id,
            actor_id: actor,
            resolution,
            version,
            timestamp: self.clock.now(),
        });
        Ok(outcome)
    }

    pub async fn get_bill(&self, bill_id: BillId) -> Result<Bill, BillError> {
        self.load(bill_id).await
    }

    /// Activity entries of a bill, oldest first
    pub async fn activities(&self, bill_id: BillId) -> Result<Vec<BillActivity>, BillError> {
        self.load(bill_id).await?;
        Ok(self.store.activities(bill_id).await?)
    }

    /// Conflicts waiting for a resolution, oldest first
    pub async fn pending_conflicts(&self) -> Vec<BillConflict> {
        let cutoff = self.expiry_cutoff();
        let mut conflicts: Vec<BillConflict> = self
            .pending
            .read()
            .await
            .values()
            .filter(|p| p.conflict.detected_at > cutoff)
            .map(|p| p.conflict.clone())
            .collect();
        conflicts.sort_by_key(|c| (c.detected_at, c.id));
        conflicts
    }

    /// Pending conflicts the actor is able to resolve, oldest first
    pub async fn pending_conflicts_for(&self, actor: ParticipantId) -> Vec<BillConflict> {
        let cutoff = self.expiry_cutoff();
        let mut conflicts: Vec<BillConflict> = self
            .pending
            .read()
            .await
            .values()
            .filter(|p| p.actor == actor && p.conflict.detected_at > cutoff)
            .map(|p| p.conflict.clone())
            .collect();
        conflicts.sort_by_key(|c| (c.detected_at, c.id));
        conflicts
    }

    async fn load(&self, bill_id: BillId) -> Result<Bill, BillError> {
        self.store
            .get_bill(bill_id)
            .await
            .map_err(|e| BillError::from_port(bill_id, e))
    }

    async fn commit(
        &self,
        next: &Bill,
        previous: &Bill,
        actor: ParticipantId,
        activity_type: ActivityType,
    ) -> Result<WriteOutcome, BillError> {
        let activities =
            BillActivity::fan_out(next, Some(previous), actor, activity_type, next.updated_at());
        self.store
            .write_if_version(next, previous.version(), &activities)
            .await
            .map_err(|e| BillError::from_port(next.id(), e))
    }

    /// Turns a lost race into a conflict, or pushes a low-severity one
    /// through when auto-dismiss is enabled
    async fn handle_stale_write(
        &self,
        expected_version: u64,
        patch: BillPatch,
        actor: ParticipantId,
        server: Bill,
    ) -> Result<Bill, BillError> {
        if server.is_deleted() {
            return Err(BillError::Deleted(server.id()));
        }
        let base = self.base_version(&server, expected_version).await?;
        let conflict = self.build_conflict(&base, &patch, &server, expected_version);

        if conflict.severity == ConflictSeverity::Low && self.config.auto_dismiss_low_severity {
            let next = server.with_patch(&patch, actor, self.clock.now())?;
            match self.commit(&next, &server, actor, ActivityType::Edited).await? {
                WriteOutcome::Committed(bill) => {
                    info!(version = bill.version(), "Low-severity conflict dismissed, local edit kept");
                    self.publish(BillEvent::updated(&bill, actor));
                    return Ok(bill);
                }
                WriteOutcome::VersionConflict { current } => {
                    let conflict = self.build_conflict(&base, &patch, &current, expected_version);
                    return Err(self.park(conflict, base, patch, actor, current).await);
                }
            }
        }

        Err(self.park(conflict, base, patch, actor, server).await)
    }

    /// The version the client edited from, or the server copy if the store
    /// no longer has it
    async fn base_version(&self, server: &Bill, version: u64) -> Result<Bill, BillError> {
        match self.store.get_bill_at_version(server.id(), version).await? {
            Some(base) => Ok(base),
            None => {
                warn!(version, "Base version unavailable, diffing against the server copy");
                Ok(server.clone())
            }
        }
    }

    fn build_conflict(
        &self,
        base: &Bill,
        patch: &BillPatch,
        server: &Bill,
        expected_version: u64,
    ) -> BillConflict {
        let now = self.clock.now();
        let mut conflict = self
            .detector
            .detect(base, patch, server, now)
            .unwrap_or_else(|| self.detector.stale_write(base, server, now));
        conflict.local_version = expected_version;
        conflict
    }

    async fn park(
        &self,
        conflict: BillConflict,
        base: Bill,
        patch: BillPatch,
        actor: ParticipantId,
        server: Bill,
    ) -> BillError {
        warn!(
            conflict_id = %conflict.id,
            severity = ?conflict.severity,
            server_version = conflict.server_version,
            fields = conflict.conflicting_fields.len(),
            "Write rejected with a version conflict"
        );
        self.publish(BillEvent::ConflictDetected {
            conflict_id: conflict.id,
            bill_id: conflict.operation_id,
            actor_id: actor,
            severity: conflict.severity,
            local_version: conflict.local_version,
            server_version: conflict.server_version,
            timestamp: conflict.detected_at,
        });

        let bill_id = conflict.operation_id;
        let cutoff = self.expiry_cutoff();
        let mut registry = self.pending.write().await;
        let before = registry.len();
        // The actor's newest rejected edit of a bill supersedes older ones
        registry.retain(|_, p| {
            p.conflict.detected_at > cutoff && !(p.actor == actor && p.conflict.operation_id == bill_id)
        });
        let evicted = before - registry.len();
        if evicted > 0 {
            debug!(evicted, "Dropped superseded or expired pending conflicts");
        }
        registry.insert(
            conflict.id,
            PendingConflict {
                conflict: conflict.clone(),
                base,
                patch,
                actor,
                server: server.clone(),
            },
        );
        drop(registry);

        BillError::Conflict(Box::new(ConflictError { conflict, server }))
    }

    /// Writes `patch` over the server copy the conflict was detected against
    ///
    /// If the bill moved again in the meantime the old conflict is replaced
    /// by a fresh one against the newer copy.
    async fn write_resolution(
        &self,
        pending: &PendingConflict,
        patch: BillPatch,
    ) -> Result<ResolutionOutcome, BillError> {
        let conflict_id = pending.conflict.id;
        let server = &pending.server;
        let next = server.with_patch(&patch, pending.actor, self.clock.now())?;

        match self.commit(&next, server, pending.actor, ActivityType::Edited).await? {
            WriteOutcome::Committed(bill) => {
                self.publish(BillEvent::updated(&bill, pending.actor));
                Ok(ResolutionOutcome::Committed(bill))
            }
            WriteOutcome::VersionConflict { current } => {
                debug!(%conflict_id, "Bill moved again before the resolution landed");
                if current.is_deleted() {
                    return Err(BillError::Deleted(current.id()));
                }
                let conflict =
                    self.build_conflict(server, &patch, &current, server.version());
                Err(self
                    .park(conflict, server.clone(), patch, pending.actor, current)
                    .await)
            }
        }
    }

    /// Removes a conflict from the registry once the caller may resolve it
    ///
    /// The checks and the removal happen under one write lock. Expired
    /// entries are dropped and reported as not found.
    async fn claim_pending(
        &self,
        conflict_id: ConflictId,
        resolution: ResolutionOption,
        has_manual_patch: bool,
        actor: ParticipantId,
    ) -> Result<PendingConflict, BillError> {
        let mut registry = self.pending.write().await;
        let Some(entry) = registry.get(&conflict_id) else {
            return Err(BillError::ConflictNotFound(conflict_id));
        };

        if entry.conflict.detected_at <= self.expiry_cutoff() {
            registry.remove(&conflict_id);
            debug!(%conflict_id, "Pending conflict expired");
            return Err(BillError::ConflictNotFound(conflict_id));
        }
        if entry.actor != actor {
            return Err(BillError::Authorization {
                bill_id: entry.conflict.operation_id,
                actor_id: actor,
                action: BillAction::Edit,
            });
        }
        if !entry.conflict.accepts(resolution) {
            return Err(BillError::ResolutionNotOffered {
                conflict_id,
                resolution,
            });
        }
        if resolution == ResolutionOption::Manual && !has_manual_patch {
            return Err(BillError::ManualPatchMissing);
        }

        registry
            .remove(&conflict_id)
            .ok_or(BillError::ConflictNotFound(conflict_id))
    }

    /// Conflicts detected at or before this instant have expired
    fn expiry_cutoff(&self) -> DateTime<Utc> {
        let secs = i64::try_from(self.config.pending_conflict_ttl_secs)
            .unwrap_or(MAX_PENDING_TTL_SECS)
            .min(MAX_PENDING_TTL_SECS);
        let ttl = Duration::seconds(secs);
        self.clock
            .now()
            .checked_sub_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    fn publish(&self, event: BillEvent) {
        debug!(event_type = event.event_type(), bill_id = %event.bill_id(), "Publishing bill event");
        // No subscribers is not an error
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bill::{BillItem, BillParticipant};
    use crate::ports::mock::MockBillStore;
    use chrono::{NaiveDate, TimeZone};
    use core_kernel::{Currency, FixedClock, ItemId, Money};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn pid(n: u128) -> ParticipantId {
        ParticipantId::from_uuid(Uuid::from_u128(n))
    }

    fn service() -> (BillCommandService, MockBillStore, FixedClock) {
        let store = MockBillStore::new();
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 18, 0, 0).unwrap());
        let service = BillCommandService::new(Arc::new(store.clone()), Arc::new(clock.clone()));
        (service, store, clock)
    }

    fn request() -> CreateBillRequest {
        CreateBillRequest {
            bill_name: "Dinner".to_string(),
            currency: Currency::USD,
            date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            created_by: pid(1),
            paid_by: pid(1),
            items: vec![BillItem::new(
                ItemId::new(),
                "Pizza",
                Money::new(dec!(10.00), Currency::USD),
            )
            .assigned_to([pid(1), pid(2), pid(3)])],
            participants: (1..=3)
                .map(|n| BillParticipant::new(pid(n), format!("P{n}"), format!("p{n}@example.com")))
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_create_writes_activity_per_participant() {
        let (service, _, _) = service();
        let bill = service.create_bill(request()).await.unwrap();

        let activities = service.activities(bill.id()).await.unwrap();
        assert_eq!(activities.len(), 3);
        assert!(activities
            .iter()
            .all(|a| a.activity_type == ActivityType::Created && a.bill_version == 1));
    }

    #[tokio::test]
    async fn test_stale_update_returns_conflict() {
        let (service, _, _) = service();
        let bill = service.create_bill(request()).await.unwrap();

        service
            .update_bill(bill.id(), BillPatch::default().with_bill_name("B"), 1, pid(2))
            .await
            .unwrap();
        let err = service
            .update_bill(bill.id(), BillPatch::default().with_bill_name("A"), 1, pid(3))
            .await
            .unwrap_err();

        let conflict = err.as_conflict().unwrap();
        assert_eq!(conflict.conflict.local_version, 1);
        assert_eq!(conflict.server.version(), 2);
        assert_eq!(conflict.server.bill_name(), "B");
        assert_eq!(service.pending_conflicts().await.len(), 1);
    }

    #[tokio::test]
    async fn test_outsider_cannot_edit() {
        let (service, _, _) = service();
        let bill = service.create_bill(request()).await.unwrap();

        let err = service
            .update_bill(bill.id(), BillPatch::default().with_bill_name("X"), 1, pid(9))
            .await
            .unwrap_err();
        assert!(err.is_forbidden());
    }

    #[tokio::test]
    async fn test_storage_outage_is_retryable() {
        let (service, store, _) = service();
        store.set_unavailable(true);

        let err = service.create_bill(request()).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
