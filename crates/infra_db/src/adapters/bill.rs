//! PostgreSQL Bill Store
//!
//! Implements `BillStorePort` on top of [`BillRepository`]. Committed writes
//! raise a `NOTIFY` inside their transaction; [`PostgresBillStore::follow_changes`]
//! listens on that channel, loads the committed version and fans it out to
//! in-process subscribers. Every instance of the service runs its own
//! listener, so subscribers see writes made by any instance.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use core_kernel::{BillId, DomainPort, HealthCheckResult, HealthCheckable, ParticipantId, PortError};
use domain_bill::{
    Bill, BillActivity, BillChange, BillFilter, BillStorePort, BillSubscription, WriteOutcome,
};

use crate::error::DatabaseError;
use crate::repositories::bill::{
    BillRepository, BillRow, ConditionalWrite, NewActivity, NewBillVersion, BILL_CHANGES_CHANNEL,
};

const ADAPTER_ID: &str = "postgres-bill-store";

/// Payload of a `bill_changes` notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotification {
    pub bill_id: Uuid,
    pub version: i64,
}

impl ChangeNotification {
    pub fn parse(payload: &str) -> Result<Self, PortError> {
        serde_json::from_str(payload)
            .map_err(|e| PortError::transformation(format!("bad change notification: {e}")))
    }
}

/// PostgreSQL-backed implementation of `BillStorePort`
#[derive(Debug, Clone)]
pub struct PostgresBillStore {
    repository: BillRepository,
    pool: PgPool,
    changes: broadcast::Sender<BillChange>,
}

impl PostgresBillStore {
    pub fn new(pool: PgPool) -> Self {
        Self::with_capacity(pool, 1024)
    }

    /// Creates a store whose change fan-out buffers `capacity` changes per
    /// subscriber
    pub fn with_capacity(pool: PgPool, capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity.max(1));
        Self {
            repository: BillRepository::new(pool.clone()),
            pool,
            changes,
        }
    }

    pub fn repository(&self) -> &BillRepository {
        &self.repository
    }

    /// Relays committed versions to subscribers until `shutdown` turns true
    ///
    /// When the listener connection drops, sqlx reconnects on the next
    /// receive; notifications sent in between are lost and subscribers
    /// should reload.
    pub async fn follow_changes(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), PortError> {
        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(DatabaseError::from)?;
        listener
            .listen(BILL_CHANGES_CHANNEL)
            .await
            .map_err(DatabaseError::from)?;
        info!(channel = BILL_CHANGES_CHANNEL, "Listening for bill changes");

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
                received = listener.try_recv() => match received {
                    Ok(Some(notification)) => {
                        if let Err(e) = self.relay(notification.payload()).await {
                            warn!(error = %e, "Dropping undeliverable bill change");
                        }
                    }
                    Ok(None) => {
                        warn!("Change listener lost its connection, reconnecting");
                    }
                    Err(e) => return Err(DatabaseError::from(e).into()),
                },
            }
        }

        info!("Stopped listening for bill changes");
        Ok(())
    }

    async fn relay(&self, payload: &str) -> Result<(), PortError> {
        let notification = ChangeNotification::parse(payload)?;
        let bill_id = BillId::from_uuid(notification.bill_id);
        let version = to_version(notification.version)?;

        let bill = self
            .get_bill_at_version(bill_id, version)
            .await?
            .ok_or_else(|| PortError::not_found("BillVersion", format!("{bill_id}@v{version}")))?;
        let previous_participants = match version.checked_sub(1).filter(|v| *v > 0) {
            Some(previous) => self
                .get_bill_at_version(bill_id, previous)
                .await?
                .map(|b| b.participant_ids().collect())
                .unwrap_or_default(),
            None => Vec::new(),
        };

        debug!(bill_id = %bill_id, version, "Relaying bill change");
        // No subscribers is not an error
        let _ = self.changes.send(BillChange {
            bill,
            previous_participants,
        });
        Ok(())
    }
}

fn to_version(version: i64) -> Result<u64, PortError> {
    u64::try_from(version).map_err(|_| PortError::transformation(format!("negative version {version}")))
}

fn to_db_version(version: u64) -> Result<i64, PortError> {
    i64::try_from(version).map_err(|_| PortError::transformation(format!("version {version} out of range")))
}

fn decode_bill(document: serde_json::Value) -> Result<Bill, PortError> {
    serde_json::from_value::<Bill>(document)
        .map_err(|e| PortError::from(DatabaseError::serialization(e)))
}

fn row_to_bill(row: BillRow) -> Result<Bill, PortError> {
    decode_bill(row.document)
}

fn bill_to_row(bill: &Bill) -> Result<NewBillVersion, PortError> {
    let members: BTreeSet<ParticipantId> = bill
        .participant_ids()
        .chain(std::iter::once(bill.created_by()))
        .collect();

    Ok(NewBillVersion {
        bill_id: bill.id().into(),
        version: to_db_version(bill.version())?,
        document: serde_json::to_value(bill).map_err(DatabaseError::serialization)?,
        is_deleted: bill.is_deleted(),
        created_at: bill.created_at(),
        updated_at: bill.updated_at(),
        members: members.into_iter().map(Uuid::from).collect(),
    })
}

fn activity_to_row(activity: &BillActivity) -> Result<NewActivity, PortError> {
    Ok(NewActivity {
        activity_id: activity.id.into(),
        bill_id: activity.bill_id.into(),
        participant_id: activity.participant_id.into(),
        activity_type: activity.activity_type.as_str(),
        bill_version: to_db_version(activity.bill_version)?,
        occurred_at: activity.timestamp,
        document: serde_json::to_value(activity).map_err(DatabaseError::serialization)?,
    })
}

fn activities_to_rows(activities: &[BillActivity]) -> Result<Vec<NewActivity>, PortError> {
    activities.iter().map(activity_to_row).collect()
}

/// Maps a missing row to a `NotFound` naming the bill
fn bill_error(bill_id: BillId, error: DatabaseError) -> PortError {
    if error.is_not_found() {
        PortError::not_found("Bill", bill_id)
    } else {
        error.into()
    }
}

impl DomainPort for PostgresBillStore {}

#[async_trait]
impl HealthCheckable for PostgresBillStore {
    async fn health_check(&self) -> HealthCheckResult {
        let start = std::time::Instant::now();

        let result = sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await;

        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(_) => HealthCheckResult::healthy(ADAPTER_ID, latency_ms),
            Err(e) => HealthCheckResult::unhealthy(ADAPTER_ID, latency_ms, format!("Database error: {e}")),
        }
    }
}

#[async_trait]
impl BillStorePort for PostgresBillStore {
    #[instrument(skip(self), fields(bill_id = %id))]
    async fn get_bill(&self, id: BillId) -> Result<Bill, PortError> {
        let row = self
            .repository
            .get(id.into())
            .await
            .map_err(|e| bill_error(id, e))?;
        row_to_bill(row)
    }

    async fn get_bill_at_version(
        &self,
        id: BillId,
        version: u64,
    ) -> Result<Option<Bill>, PortError> {
        self.repository
            .get_version(id.into(), to_db_version(version)?)
            .await?
            .map(decode_bill)
            .transpose()
    }

    async fn read_version(&self, id: BillId) -> Result<u64, PortError> {
        let row = self
            .repository
            .get(id.into())
            .await
            .map_err(|e| bill_error(id, e))?;
        to_version(row.version)
    }

    #[instrument(skip(self, bill, activities), fields(bill_id = %bill.id()))]
    async fn insert_bill(&self, bill: &Bill, activities: &[BillActivity]) -> Result<(), PortError> {
        let row = bill_to_row(bill)?;
        let activities = activities_to_rows(activities)?;
        self.repository.insert(&row, &activities).await?;
        Ok(())
    }

    #[instrument(skip(self, bill, activities), fields(bill_id = %bill.id(), version = bill.version()))]
    async fn write_if_version(
        &self,
        bill: &Bill,
        expected_version: u64,
        activities: &[BillActivity],
    ) -> Result<WriteOutcome, PortError> {
        if bill.version() != expected_version + 1 {
            return Err(PortError::internal(format!(
                "write of v{} does not follow v{expected_version}",
                bill.version()
            )));
        }

        let row = bill_to_row(bill)?;
        let activities = activities_to_rows(activities)?;
        let outcome = self
            .repository
            .write_if_version(&row, to_db_version(expected_version)?, &activities)
            .await
            .map_err(|e| bill_error(bill.id(), e))?;

        match outcome {
            ConditionalWrite::Written => Ok(WriteOutcome::Committed(bill.clone())),
            ConditionalWrite::Stale(current) => Ok(WriteOutcome::VersionConflict {
                current: row_to_bill(current)?,
            }),
        }
    }

    async fn bills_for_participant(
        &self,
        participant: ParticipantId,
    ) -> Result<Vec<Bill>, PortError> {
        self.repository
            .for_member(participant.into())
            .await?
            .into_iter()
            .map(row_to_bill)
            .collect()
    }

    async fn activities(&self, bill_id: BillId) -> Result<Vec<BillActivity>, PortError> {
        self.repository
            .activities(bill_id.into())
            .await?
            .into_iter()
            .map(|document| {
                serde_json::from_value::<BillActivity>(document)
                    .map_err(|e| PortError::from(DatabaseError::serialization(e)))
            })
            .collect()
    }

    fn subscribe(&self, filter: BillFilter) -> BillSubscription {
        BillSubscription::new(filter, self.changes.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use core_kernel::{Currency, ItemId, Money};
    use domain_bill::{ActivityType, BillItem, BillParticipant, CreateBillRequest};

    fn pid(n: u128) -> ParticipantId {
        ParticipantId::from_uuid(Uuid::from_u128(n))
    }

    fn bill() -> Bill {
        let members = [pid(1), pid(2)];
        Bill::create(
            BillId::new_v7(),
            CreateBillRequest {
                bill_name: "Taxi".to_string(),
                currency: Currency::EUR,
                date: NaiveDate::from_ymd_opt(2024, 5, 4).unwrap(),
                created_by: pid(3),
                paid_by: pid(1),
                items: vec![BillItem::new(ItemId::new(), "Fare", Money::from_minor(4200, Currency::EUR))
                    .assigned_to(members)],
                participants: members
                    .iter()
                    .map(|id| BillParticipant::new(*id, "Rider", "rider@example.com"))
                    .collect(),
            },
            Utc.with_ymd_and_hms(2024, 5, 4, 23, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_row_includes_creator_as_member() {
        let bill = bill();
        let row = bill_to_row(&bill).unwrap();

        assert_eq!(row.version, 1);
        assert_eq!(row.members.len(), 3);
        assert!(row.members.contains(&Uuid::from_u128(3)));
    }

    #[test]
    fn test_document_round_trip() {
        let bill = bill();
        let row = bill_to_row(&bill).unwrap();
        assert_eq!(decode_bill(row.document).unwrap(), bill);
    }

    #[test]
    fn test_activity_row_carries_type() {
        let bill = bill();
        let activities =
            BillActivity::fan_out(&bill, None, pid(3), ActivityType::Created, bill.created_at());
        let rows = activities_to_rows(&activities).unwrap();

        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.activity_type == "created" && r.bill_version == 1));
    }

    #[test]
    fn test_notification_payload() {
        let id = Uuid::from_u128(7);
        let payload = serde_json::json!({ "bill_id": id, "version": 4 }).to_string();
        assert_eq!(
            ChangeNotification::parse(&payload).unwrap(),
            ChangeNotification { bill_id: id, version: 4 }
        );
        assert!(ChangeNotification::parse("not json").is_err());
    }

    #[test]
    fn test_negative_version_rejected() {
        assert!(to_version(-1).is_err());
        assert_eq!(to_db_version(3).unwrap(), 3);
    }
}
