use async_trait::async_trait;
use chrono::{DateTime, Utc};
use exam_core::model::AttemptSnapshot;
use sqlx::Row;

use crate::repository::{
    ATTEMPT_SNAPSHOT_KEY, SessionStateRepository, StorageError, StoredSnapshot,
};

use super::SqliteRepository;

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

#[async_trait]
impl SessionStateRepository for SqliteRepository {
    async fn load_snapshot(&self) -> Result<Option<StoredSnapshot>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT value, updated_at
            FROM kv_store
            WHERE key = ?1
            ",
        )
        .bind(ATTEMPT_SNAPSHOT_KEY)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| StorageError::Connection(err.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let value: String = row.try_get("value").map_err(ser)?;
        let saved_at: DateTime<Utc> = row.try_get("updated_at").map_err(ser)?;
        let snapshot: AttemptSnapshot = serde_json::from_str(&value).map_err(ser)?;

        Ok(Some(StoredSnapshot { snapshot, saved_at }))
    }

    async fn save_snapshot(
        &self,
        snapshot: &AttemptSnapshot,
        saved_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let value = serde_json::to_string(snapshot).map_err(ser)?;

        sqlx::query(
            r"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            ",
        )
        .bind(ATTEMPT_SNAPSHOT_KEY)
        .bind(value)
        .bind(saved_at)
        .execute(&self.pool)
        .await
        .map_err(|err| StorageError::Connection(err.to_string()))?;

        Ok(())
    }

    async fn clear_snapshot(&self) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?1")
            .bind(ATTEMPT_SNAPSHOT_KEY)
            .execute(&self.pool)
            .await
            .map_err(|err| StorageError::Connection(err.to_string()))?;
        Ok(())
    }
}
