// Key-value rows backing the settings store

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use super::DatabaseManager;
use crate::settings::StoredSettings;

impl DatabaseManager {
    /// Every persisted setting, keyed by its storage name
    pub fn load_settings_map(&self) -> Result<StoredSettings> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare("SELECT key, value FROM settings")
                .context("Failed to prepare settings query")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
                .context("Failed to query settings")?;

            let mut map = StoredSettings::new();
            for row in rows {
                let (key, value) = row.context("Failed to read setting row")?;
                map.insert(key, value);
            }
            Ok(map)
        })
    }

    /// Apply a batch of writes atomically. `None` deletes the key.
    pub fn apply_settings(&self, changes: &[(String, Option<String>)]) -> Result<()> {
        self.transaction(|tx| {
            for (key, value) in changes {
                match value {
                    Some(value) => upsert(tx, key, value)?,
                    None => remove(tx, key)?,
                }
            }
            Ok(())
        })
    }
}

fn upsert(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO settings (key, value, updated_at)
        VALUES (?1, ?2, datetime('now'))
        ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            updated_at = datetime('now')
        "#,
        params![key, value],
    )
    .with_context(|| format!("Failed to write setting {}", key))?;
    Ok(())
}

fn remove(conn: &Connection, key: &str) -> Result<()> {
    conn.execute("DELETE FROM settings WHERE key = ?1", params![key])
        .with_context(|| format!("Failed to delete setting {}", key))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    fn create_test_db() -> (TempDir, DatabaseManager) {
        let dir = tempdir().unwrap();
        let db = DatabaseManager::new(dir.path().join("cicero.db")).unwrap();
        (dir, db)
    }

    fn entry(key: &str, value: Option<&str>) -> (String, Option<String>) {
        (key.to_string(), value.map(str::to_string))
    }

    #[test]
    fn test_apply_upserts_and_deletes() {
        let (_dir, db) = create_test_db();
        db.apply_settings(&[entry("stale", Some("x")), entry("preset_setting", Some("turbo"))])
            .unwrap();

        db.apply_settings(&[
            entry("preset_setting", Some("custom")),
            entry("runtime_setting", Some("{}")),
            entry("stale", None),
            entry("never_written", None),
        ])
        .unwrap();

        let map = db.load_settings_map().unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("preset_setting").map(String::as_str), Some("custom"));
        assert!(!map.contains_key("stale"));
    }

    #[test]
    fn test_empty_database_loads_empty_map() {
        let (_dir, db) = create_test_db();
        assert!(db.load_settings_map().unwrap().is_empty());
    }
}
