//! Per-user sync document
//!
//! Clients store an opaque JSON document (preferences, watch state) and read it
//! back on another device. The document is replaced whole on every write.

use anyhow::{Context, Result};
use serde_json::Value as JsonValue;
use sqlx::SqlitePool;

use super::sqlite_helpers::now_iso8601;

pub struct UserDataRepository {
    pool: SqlitePool,
}

impl UserDataRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Stored document for the user, if any
    pub async fn get(&self, user_id: &str) -> Result<Option<JsonValue>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT data FROM user_data WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|(data,)| serde_json::from_str(&data).context("Stored user data is not valid JSON"))
            .transpose()
    }

    /// Replace the user's document
    pub async fn upsert(&self, user_id: &str, data: &JsonValue) -> Result<()> {
        let now = now_iso8601();
        sqlx::query(
            r#"
            INSERT INTO user_data (user_id, data, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT (user_id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(serde_json::to_string(data)?)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;
    use serde_json::json;

    #[tokio::test]
    async fn test_upsert_replaces_document() {
        let db = Database::in_memory().await.unwrap();
        let repo = db.user_data();

        assert!(repo.get("u1").await.unwrap().is_none());

        repo.upsert("u1", &json!({"theme": "dark"})).await.unwrap();
        repo.upsert("u1", &json!({"volume": 3})).await.unwrap();

        assert_eq!(repo.get("u1").await.unwrap(), Some(json!({"volume": 3})));
        assert!(repo.get("u2").await.unwrap().is_none());
    }
}
