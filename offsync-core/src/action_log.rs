//! Durable action log.
//!
//! Every local mutation is appended here before the caller gets its id back,
//! and stays until the remote service accepts it or it runs out of attempts.
//! Drain order is priority first (high to low), then enqueue time (oldest
//! first), then insertion order.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;

use crate::action::{generate_action_id, ActionKind, NewAction, PendingAction, Priority};
use crate::error::SyncError;

const TABLE: &str = "pending_actions";

#[derive(Clone)]
pub struct ActionLog {
    pool: SqlitePool,
    attempt_limit: u32,
}

#[derive(sqlx::FromRow)]
struct ActionRow {
    id: String,
    kind: String,
    entity_type: String,
    entity_id: Option<String>,
    payload: String,
    enqueued_at: String,
    attempt: i64,
    attempt_limit: i64,
    priority: i64,
}

impl TryFrom<ActionRow> for PendingAction {
    type Error = SyncError;

    fn try_from(row: ActionRow) -> Result<Self, Self::Error> {
        let kind: ActionKind = row.kind.parse().map_err(|reason| SyncError::CorruptRecord {
            table: TABLE,
            reason,
        })?;
        let priority =
            Priority::from_rank(row.priority).ok_or_else(|| SyncError::CorruptRecord {
                table: TABLE,
                reason: format!("unknown priority rank {}", row.priority),
            })?;
        let enqueued_at = parse_timestamp(TABLE, &row.enqueued_at)?;
        let attempt = counter("attempt", row.attempt)?;
        let attempt_limit = counter("attempt_limit", row.attempt_limit)?;

        Ok(PendingAction {
            id: row.id,
            kind,
            entity_type: row.entity_type,
            entity_id: row.entity_id,
            payload: serde_json::from_str(&row.payload)?,
            enqueued_at,
            attempt,
            attempt_limit,
            priority,
        })
    }
}

fn counter(column: &str, value: i64) -> Result<u32, SyncError> {
    u32::try_from(value).map_err(|_| SyncError::CorruptRecord {
        table: TABLE,
        reason: format!("{} out of range: {}", column, value),
    })
}

impl ActionLog {
    /// Creates a log over `pool`; new actions get `attempt_limit` attempts.
    pub fn new(pool: SqlitePool, attempt_limit: u32) -> Self {
        Self {
            pool,
            attempt_limit: attempt_limit.max(1),
        }
    }

    pub fn attempt_limit(&self) -> u32 {
        self.attempt_limit
    }

    /// Validates and durably appends a mutation with `attempt = 0`.
    ///
    /// Never touches the network. Precondition errors leave the log untouched.
    pub async fn enqueue(&self, action: &NewAction) -> Result<PendingAction, SyncError> {
        action.validate()?;

        let now = Utc::now();
        let pending = PendingAction {
            id: generate_action_id(now),
            kind: action.kind,
            entity_type: action.entity_type.clone(),
            entity_id: action.entity_id.clone(),
            payload: action.payload.clone(),
            enqueued_at: now,
            attempt: 0,
            attempt_limit: self.attempt_limit,
            priority: action.priority,
        };

        sqlx::query(
            r#"
            INSERT INTO pending_actions (id, kind, entity_type, entity_id, payload, enqueued_at, attempt, attempt_limit, priority)
            VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(&pending.id)
        .bind(pending.kind.as_str())
        .bind(&pending.entity_type)
        .bind(&pending.entity_id)
        .bind(serde_json::to_string(&pending.payload)?)
        .bind(format_timestamp(pending.enqueued_at))
        .bind(i64::from(pending.attempt_limit))
        .bind(pending.priority.rank())
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            action_id = %pending.id,
            priority = %pending.priority,
            "queued {}",
            pending.label()
        );

        Ok(pending)
    }

    /// Returns every action that still has attempts left, in drain order.
    pub async fn list_retriable(&self) -> Result<Vec<PendingAction>, SyncError> {
        let rows: Vec<ActionRow> = sqlx::query_as(
            r#"
            SELECT id, kind, entity_type, entity_id, payload, enqueued_at, attempt, attempt_limit, priority
            FROM pending_actions
            WHERE attempt < attempt_limit
            ORDER BY priority DESC, enqueued_at ASC, seq ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PendingAction::try_from).collect()
    }

    pub async fn count_retriable(&self) -> Result<u64, SyncError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM pending_actions WHERE attempt < attempt_limit")
                .fetch_one(&self.pool)
                .await?;
        u64::try_from(count).map_err(|_| SyncError::CorruptRecord {
            table: TABLE,
            reason: format!("negative count: {}", count),
        })
    }

    pub async fn get(&self, id: &str) -> Result<Option<PendingAction>, SyncError> {
        let row: Option<ActionRow> = sqlx::query_as(
            r#"
            SELECT id, kind, entity_type, entity_id, payload, enqueued_at, attempt, attempt_limit, priority
            FROM pending_actions
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PendingAction::try_from).transpose()
    }

    /// Counts one more failed attempt for `id`.
    ///
    /// Returns the new attempt count, or `None` if the action is not in the
    /// log. When the count reaches the action's limit the row is deleted in the
    /// same transaction, so an exhausted action is never visible.
    pub async fn record_failure(&self, id: &str) -> Result<Option<u32>, SyncError> {
        let mut tx = self.pool.begin().await?;

        // Write first so the transaction holds the write lock from the start
        let updated = sqlx::query("UPDATE pending_actions SET attempt = attempt + 1 WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if updated.rows_affected() == 0 {
            return Ok(None);
        }

        let (attempt, limit): (i64, i64) =
            sqlx::query_as("SELECT attempt, attempt_limit FROM pending_actions WHERE id = ?")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;

        if attempt >= limit {
            sqlx::query("DELETE FROM pending_actions WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        counter("attempt", attempt).map(Some)
    }

    /// Deletes an action. Removing an unknown id is not an error.
    pub async fn remove(&self, id: &str) -> Result<(), SyncError> {
        sqlx::query("DELETE FROM pending_actions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Distinct entity types that still have queued work.
    pub async fn entity_types(&self) -> Result<Vec<String>, SyncError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT DISTINCT entity_type FROM pending_actions ORDER BY entity_type")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }
}

/// Fixed-width UTC form so that lexical order equals chronological order.
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(table: &'static str, s: &str) -> Result<DateTime<Utc>, SyncError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SyncError::CorruptRecord {
            table,
            reason: format!("invalid timestamp '{}': {}", s, e),
        })
}
