use directories::ProjectDirs;
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

mod settings;

pub use settings::{delete_setting, get_setting, set_setting};

const QUALIFIER: &str = "com";
const ORGANIZATION: &str = "Flowattach";
const APPLICATION: &str = "Flowattach";
const DB_FILE_NAME: &str = "settings.db";

pub type StorageResult<T> = Result<T, String>;

/// 默认数据库位置：系统应用数据目录下的 settings.db。
pub fn default_database_path() -> StorageResult<PathBuf> {
    let dirs = ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
        .ok_or_else(|| "failed to resolve application data directory".to_string())?;
    Ok(dirs.data_dir().join(DB_FILE_NAME))
}

/// 确保建表后再打开连接，调用方无需关心迁移。
pub fn init_storage(path: &Path) -> StorageResult<()> {
    with_connection(path, |_| Ok(()))
}

fn with_connection<T, F>(path: &Path, operation: F) -> StorageResult<T>
where
    F: FnOnce(&Connection) -> StorageResult<T>,
{
    let conn = open_connection(path)?;
    operation(&conn)
}

fn open_connection(path: &Path) -> StorageResult<Connection> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .map_err(|e| format!("failed to create database directory {dir:?}: {e}"))?;
    }

    let conn =
        Connection::open(path).map_err(|e| format!("failed to open SQLite database: {e}"))?;
    apply_migrations(&conn)?;
    Ok(conn)
}

fn apply_migrations(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(settings::SETTINGS_TABLE_SCHEMA)
        .map_err(|e| format!("failed to initialize database schema: {e}"))?;
    Ok(())
}

pub(crate) fn current_timestamp_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as i64)
        .unwrap_or(0)
}
