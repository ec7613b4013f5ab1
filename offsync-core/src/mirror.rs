//! Local mirror of remote collections.
//!
//! Each collection is replaced wholesale by a pull and tagged with the time
//! that pull completed. The watermark never moves backwards: a replace that
//! carries an older `as_of` than the stored one is ignored.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::action_log::{format_timestamp, parse_timestamp};
use crate::error::SyncError;

const TABLE: &str = "mirrored_collections";

#[derive(Clone)]
pub struct MirrorStore {
    pool: SqlitePool,
}

impl MirrorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Replaces the cached collection and its watermark.
    ///
    /// Returns `false` (and changes nothing) when `as_of` is earlier than the
    /// stored watermark.
    pub async fn replace(
        &self,
        entity_type: &str,
        entities: &[serde_json::Value],
        as_of: DateTime<Utc>,
    ) -> Result<bool, SyncError> {
        let encoded = serde_json::to_string(entities)?;

        // Single statement so the watermark check and the write cannot interleave
        let result = sqlx::query(
            r#"
            INSERT INTO mirrored_collections (entity_type, entities, last_synced_at)
            VALUES (?, ?, ?)
            ON CONFLICT(entity_type) DO UPDATE
                SET entities = excluded.entities, last_synced_at = excluded.last_synced_at
                WHERE excluded.last_synced_at >= mirrored_collections.last_synced_at
            "#,
        )
        .bind(entity_type)
        .bind(&encoded)
        .bind(format_timestamp(as_of))
        .execute(&self.pool)
        .await?;

        let applied = result.rows_affected() > 0;
        if applied {
            tracing::debug!(entity_type, count = entities.len(), "mirror replaced");
        } else {
            tracing::warn!(
                entity_type,
                as_of = %as_of,
                "ignoring out-of-order pull result older than stored watermark"
            );
        }

        Ok(applied)
    }

    /// Returns the last replaced collection, or an empty list.
    pub async fn get(&self, entity_type: &str) -> Result<Vec<serde_json::Value>, SyncError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT entities FROM mirrored_collections WHERE entity_type = ?")
                .bind(entity_type)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((entities,)) => Ok(serde_json::from_str(&entities)?),
            None => Ok(Vec::new()),
        }
    }

    pub async fn watermark(&self, entity_type: &str) -> Result<Option<DateTime<Utc>>, SyncError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT last_synced_at FROM mirrored_collections WHERE entity_type = ?")
                .bind(entity_type)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(ts,)| parse_timestamp(TABLE, &ts)).transpose()
    }

    /// Entity types that have been pulled at least once.
    pub async fn entity_types(&self) -> Result<Vec<String>, SyncError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT entity_type FROM mirrored_collections ORDER BY entity_type")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    /// Drops every collection together with its watermark.
    pub async fn clear_all(&self) -> Result<(), SyncError> {
        let result = sqlx::query("DELETE FROM mirrored_collections")
            .execute(&self.pool)
            .await?;
        tracing::info!(collections = result.rows_affected(), "cleared offline data");
        Ok(())
    }
}
