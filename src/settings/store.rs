//! Settings store boundary and its SQLite implementation

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use super::types::StoredSettings;
use crate::database::DatabaseManager;
use crate::error::{CoreError, Result};

/// Persisted key-value settings
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn read(&self) -> Result<StoredSettings>;

    /// Write one key; `None` removes it
    async fn write(&self, key: &str, value: Option<String>) -> Result<()>;

    /// Write several keys in one transaction
    async fn write_all(&self, entries: Vec<(String, Option<String>)>) -> Result<()>;

    /// Snapshots published after every committed write
    fn subscribe(&self) -> watch::Receiver<StoredSettings>;
}

pub struct SqliteSettingsStore {
    db: Arc<DatabaseManager>,
    changes: watch::Sender<StoredSettings>,
}

impl SqliteSettingsStore {
    pub fn new(db: Arc<DatabaseManager>) -> Result<Self> {
        let initial = db.load_settings_map()?;
        let (changes, _) = watch::channel(initial);
        Ok(Self { db, changes })
    }

    async fn apply(&self, entries: Vec<(String, Option<String>)>) -> Result<()> {
        let db = self.db.clone();
        let snapshot = tokio::task::spawn_blocking(move || {
            db.apply_settings(&entries)?;
            db.load_settings_map()
        })
        .await
        .map_err(|e| CoreError::Storage(format!("Settings task failed: {}", e)))??;

        self.changes.send_replace(snapshot);
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for SqliteSettingsStore {
    async fn read(&self) -> Result<StoredSettings> {
        let db = self.db.clone();
        let map = tokio::task::spawn_blocking(move || db.load_settings_map())
            .await
            .map_err(|e| CoreError::Storage(format!("Settings task failed: {}", e)))??;
        Ok(map)
    }

    async fn write(&self, key: &str, value: Option<String>) -> Result<()> {
        self.apply(vec![(key.to_string(), value)]).await
    }

    async fn write_all(&self, entries: Vec<(String, Option<String>)>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        self.apply(entries).await
    }

    fn subscribe(&self) -> watch::Receiver<StoredSettings> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_write_read_and_notify() {
        let dir = tempdir().unwrap();
        let db = Arc::new(DatabaseManager::new(dir.path().join("settings.db")).unwrap());
        let store = SqliteSettingsStore::new(db).unwrap();
        let mut rx = store.subscribe();

        store.write("preset_setting", Some("turbo".into())).await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().get("preset_setting").map(String::as_str), Some("turbo"));

        store
            .write_all(vec![
                ("preset_setting".into(), None),
                ("memory_setting".into(), Some("none".into())),
            ])
            .await
            .unwrap();

        let stored = store.read().await.unwrap();
        assert!(!stored.contains_key("preset_setting"));
        assert_eq!(stored.get("memory_setting").map(String::as_str), Some("none"));
    }

    #[tokio::test]
    async fn test_initial_snapshot_reflects_database() {
        let dir = tempdir().unwrap();
        let db = Arc::new(DatabaseManager::new(dir.path().join("settings.db")).unwrap());
        db.apply_settings(&[("model_path".into(), Some("/models/a.gguf".into()))]).unwrap();

        let store = SqliteSettingsStore::new(db).unwrap();
        let rx = store.subscribe();
        assert_eq!(rx.borrow().get("model_path").map(String::as_str), Some("/models/a.gguf"));
    }
}
