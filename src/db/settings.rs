use rusqlite::{params, OptionalExtension};
use std::path::Path;

use super::{current_timestamp_millis, with_connection, StorageResult};

pub(crate) const SETTINGS_TABLE_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at_millis INTEGER NOT NULL
);";

/// 读取单个设置项，不存在时返回 `None`。
pub fn get_setting(path: &Path, key: &str) -> StorageResult<Option<String>> {
    with_connection(path, |conn| {
        conn.query_row(
            "SELECT value FROM settings WHERE key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(|e| format!("failed to read setting {key}: {e}"))
    })
}

pub fn set_setting(path: &Path, key: &str, value: &str) -> StorageResult<()> {
    let updated_at = current_timestamp_millis();
    with_connection(path, |conn| {
        conn.execute(
            "INSERT INTO settings (key, value, updated_at_millis) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at_millis = excluded.updated_at_millis",
            params![key, value, updated_at],
        )
        .map_err(|e| format!("failed to upsert setting {key}: {e}"))?;
        Ok(())
    })
}

pub fn delete_setting(path: &Path, key: &str) -> StorageResult<()> {
    with_connection(path, |conn| {
        conn.execute("DELETE FROM settings WHERE key = ?1", params![key])
            .map_err(|e| format!("failed to delete setting {key}: {e}"))?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_delete_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.db");

        assert_eq!(get_setting(&path, "k").unwrap(), None);
        set_setting(&path, "k", "v1").unwrap();
        set_setting(&path, "k", "v2").unwrap();
        assert_eq!(get_setting(&path, "k").unwrap().as_deref(), Some("v2"));

        delete_setting(&path, "k").unwrap();
        assert_eq!(get_setting(&path, "k").unwrap(), None);
    }
}
