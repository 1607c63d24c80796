//! Bill repository implementation
//!
//! Bills are stored as JSONB documents next to the columns the store needs
//! to query or check: the version counter, the deletion flag and the member
//! list. Past versions are kept in `bill_versions` so a stale writer's base
//! can be read back for the three-way diff.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::error::DatabaseError;

/// `LISTEN`/`NOTIFY` channel carrying committed bill versions
pub const BILL_CHANGES_CHANNEL: &str = "bill_changes";

/// Current state of a stored bill
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BillRow {
    pub bill_id: Uuid,
    pub version: i64,
    pub document: serde_json::Value,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A bill version about to be written
#[derive(Debug, Clone)]
pub struct NewBillVersion {
    pub bill_id: Uuid,
    pub version: i64,
    pub document: serde_json::Value,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Creator and participants, deduplicated
    pub members: Vec<Uuid>,
}

/// An activity feed entry about to be appended
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub activity_id: Uuid,
    pub bill_id: Uuid,
    pub participant_id: Uuid,
    pub activity_type: &'static str,
    pub bill_version: i64,
    pub occurred_at: DateTime<Utc>,
    pub document: serde_json::Value,
}

/// Result of a version-checked write
#[derive(Debug, Clone)]
pub enum ConditionalWrite {
    Written,
    /// The stored version differed; carries the row as found
    Stale(BillRow),
}

/// Repository for bill documents, their history and activity feed
#[derive(Debug, Clone)]
pub struct BillRepository {
    pool: PgPool,
}

impl BillRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Retrieves the current row of a bill
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::NotFound` if the bill does not exist
    pub async fn get(&self, bill_id: Uuid) -> Result<BillRow, DatabaseError> {
        sqlx::query_as::<_, BillRow>(
            r#"
            SELECT bill_id, version, document, is_deleted, created_at, updated_at
            FROM bills
            WHERE bill_id = $1
            "#,
        )
        .bind(bill_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("Bill", bill_id))
    }

    /// Retrieves the document of a past version, if recorded
    pub async fn get_version(
        &self,
        bill_id: Uuid,
        version: i64,
    ) -> Result<Option<serde_json::Value>, DatabaseError> {
        let document = sqlx::query_scalar::<_, serde_json::Value>(
            r#"
            SELECT document
            FROM bill_versions
            WHERE bill_id = $1 AND version = $2
            "#,
        )
        .bind(bill_id)
        .bind(version)
        .fetch_optional(&self.pool)
        .await?;

        Ok(document)
    }

    /// Inserts a new bill with its first version and activities
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::DuplicateEntry` if the id is taken
    pub async fn insert(
        &self,
        bill: &NewBillVersion,
        activities: &[NewActivity],
    ) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO bills (bill_id, version, document, is_deleted, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(bill.bill_id)
        .bind(bill.version)
        .bind(&bill.document)
        .bind(bill.is_deleted)
        .bind(bill.created_at)
        .bind(bill.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| match DatabaseError::from(e) {
            DatabaseError::DuplicateEntry(_) => DatabaseError::duplicate("Bill", bill.bill_id),
            other => other,
        })?;

        Self::record_version(&mut tx, bill, activities).await?;
        tx.commit().await?;

        debug!(bill_id = %bill.bill_id, "Bill inserted");
        Ok(())
    }

    /// Writes `bill` only if the stored version equals `expected_version`
    ///
    /// The current row is locked with `FOR UPDATE`, so the version read and
    /// the conditional write form one atomic step.
    pub async fn write_if_version(
        &self,
        bill: &NewBillVersion,
        expected_version: i64,
        activities: &[NewActivity],
    ) -> Result<ConditionalWrite, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, BillRow>(
            r#"
            SELECT bill_id, version, document, is_deleted, created_at, updated_at
            FROM bills
            WHERE bill_id = $1
            FOR UPDATE
            "#,
        )
        .bind(bill.bill_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DatabaseError::not_found("Bill", bill.bill_id))?;

        if current.version != expected_version {
            tx.rollback().await?;
            debug!(
                bill_id = %bill.bill_id,
                expected_version,
                stored_version = current.version,
                "Conditional write rejected"
            );
            return Ok(ConditionalWrite::Stale(current));
        }

        sqlx::query(
            r#"
            UPDATE bills
            SET version = $2, document = $3, is_deleted = $4, updated_at = $5
            WHERE bill_id = $1
            "#,
        )
        .bind(bill.bill_id)
        .bind(bill.version)
        .bind(&bill.document)
        .bind(bill.is_deleted)
        .bind(bill.updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM bill_members WHERE bill_id = $1")
            .bind(bill.bill_id)
            .execute(&mut *tx)
            .await?;

        Self::record_version(&mut tx, bill, activities).await?;
        tx.commit().await?;

        Ok(ConditionalWrite::Written)
    }

    /// Every bill the participant is a member of, deleted ones included
    pub async fn for_member(&self, participant_id: Uuid) -> Result<Vec<BillRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, BillRow>(
            r#"
            SELECT b.bill_id, b.version, b.document, b.is_deleted, b.created_at, b.updated_at
            FROM bills b
            JOIN bill_members m ON m.bill_id = b.bill_id
            WHERE m.participant_id = $1
            ORDER BY b.created_at, b.bill_id
            "#,
        )
        .bind(participant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Activity documents of a bill in write order
    pub async fn activities(&self, bill_id: Uuid) -> Result<Vec<serde_json::Value>, DatabaseError> {
        let documents = sqlx::query_scalar::<_, serde_json::Value>(
            r#"
            SELECT document
            FROM bill_activities
            WHERE bill_id = $1
            ORDER BY seq
            "#,
        )
        .bind(bill_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(documents)
    }

    /// History row, member rows, activities and the change notification
    /// shared by inserts and conditional writes
    async fn record_version(
        tx: &mut Transaction<'_, Postgres>,
        bill: &NewBillVersion,
        activities: &[NewActivity],
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO bill_versions (bill_id, version, document, committed_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(bill.bill_id)
        .bind(bill.version)
        .bind(&bill.document)
        .bind(bill.updated_at)
        .execute(&mut **tx)
        .await?;

        for member in &bill.members {
            sqlx::query("INSERT INTO bill_members (bill_id, participant_id) VALUES ($1, $2)")
                .bind(bill.bill_id)
                .bind(member)
                .execute(&mut **tx)
                .await?;
        }

        for activity in activities {
            sqlx::query(
                r#"
                INSERT INTO bill_activities (
                    activity_id, bill_id, participant_id, activity_type,
                    bill_version, occurred_at, document
                ) VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(activity.activity_id)
            .bind(activity.bill_id)
            .bind(activity.participant_id)
            .bind(activity.activity_type)
            .bind(activity.bill_version)
            .bind(activity.occurred_at)
            .bind(&activity.document)
            .execute(&mut **tx)
            .await?;
        }

        let payload = serde_json::json!({
            "bill_id": bill.bill_id,
            "version": bill.version,
        });
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(BILL_CHANGES_CHANNEL)
            .bind(payload.to_string())
            .execute(&mut **tx)
            .await?;

        Ok(())
    }
}
