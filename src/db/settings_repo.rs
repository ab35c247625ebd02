use chrono::Utc;
use futures::future::BoxFuture;
use medidash_core::plugins::{SettingsStore, StoreError};
use sqlx::SqlitePool;

/// SQLite-backed key/value settings.
pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, sqlx::Error> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(value,)| value))
    }

    pub async fn put(&self, key: &str, value: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

impl SettingsStore for SettingsRepository {
    fn read<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>, StoreError>> {
        Box::pin(async move {
            self.get(key)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))
        })
    }

    fn write<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            self.put(key, &value)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use medidash_core::plugins::{PluginRegistry, SETTINGS_KEY};
    use tempfile::tempdir;

    async fn setup() -> (SettingsRepository, tempfile::TempDir) {
        let temp_dir = tempdir().unwrap();
        let pool = init_db(&temp_dir.path().join("test.db")).await.unwrap();
        (SettingsRepository::new(pool), temp_dir)
    }

    #[tokio::test]
    async fn test_get_missing() {
        let (repo, _dir) = setup().await;
        assert!(repo.get("nothing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let (repo, _dir) = setup().await;
        repo.put("theme", "dark").await.unwrap();
        repo.put("theme", "light").await.unwrap();
        assert_eq!(repo.get("theme").await.unwrap().as_deref(), Some("light"));
    }

    #[tokio::test]
    async fn test_plugin_state_survives_reload() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let pool = init_db(&db_path).await.unwrap();
        let mut registry = PluginRegistry::load(SettingsRepository::new(pool))
            .await
            .unwrap();
        registry.set_enabled("report-export", true).await.unwrap();
        assert!(registry
            .store()
            .get(SETTINGS_KEY)
            .await
            .unwrap()
            .is_some());

        let pool = init_db(&db_path).await.unwrap();
        let registry = PluginRegistry::load(SettingsRepository::new(pool))
            .await
            .unwrap();
        assert!(registry.is_enabled("report-export").unwrap());
    }
}
