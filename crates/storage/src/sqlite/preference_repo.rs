use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use study_core::model::PreferenceKey;

use crate::repository::{PreferenceRepository, StorageError};

use super::SqliteRepository;

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl PreferenceRepository for SqliteRepository {
    async fn get_preference(&self, key: PreferenceKey) -> Result<Option<String>, StorageError> {
        let row = sqlx::query("SELECT value FROM preferences WHERE key = ?1")
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        row.map(|row| row.try_get::<String, _>("value").map_err(ser))
            .transpose()
    }

    async fn set_preference(&self, key: PreferenceKey, value: &str) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO preferences (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            ",
        )
        .bind(key.as_str())
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn list_preferences(&self) -> Result<Vec<(PreferenceKey, String)>, StorageError> {
        let rows = sqlx::query("SELECT key, value FROM preferences ORDER BY key")
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let raw_key: String = row.try_get("key").map_err(ser)?;
            let value: String = row.try_get("value").map_err(ser)?;
            // Keys written by newer builds are ignored.
            if let Ok(key) = raw_key.parse::<PreferenceKey>() {
                out.push((key, value));
            }
        }
        Ok(out)
    }
}
