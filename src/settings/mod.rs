pub mod download_directory;
pub mod policy;

pub use download_directory::{
    default_download_directory, get_download_directory, set_download_directory,
};
pub use policy::{PolicyResolver, POLICY_OVERRIDE_KEY};

use crate::db;
use crate::error::{TransferError, TransferResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// 键值持久化接口，方便替换存储实现或编写单测。
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> TransferResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> TransferResult<()>;
    fn remove(&self, key: &str) -> TransferResult<()>;
}

/// 默认的 SQLite 实现，每次操作独立打开连接。
pub struct SqliteSettingsStore {
    path: PathBuf,
}

impl SqliteSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 使用系统应用数据目录下的默认数据库。
    pub fn open_default() -> TransferResult<Self> {
        let path = db::default_database_path().map_err(TransferError::Storage)?;
        db::init_storage(&path).map_err(TransferError::Storage)?;
        Ok(Self::new(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for SqliteSettingsStore {
    fn get(&self, key: &str) -> TransferResult<Option<String>> {
        db::get_setting(&self.path, key).map_err(TransferError::Storage)
    }

    fn set(&self, key: &str, value: &str) -> TransferResult<()> {
        db::set_setting(&self.path, key, value).map_err(TransferError::Storage)
    }

    fn remove(&self, key: &str) -> TransferResult<()> {
        db::delete_setting(&self.path, key).map_err(TransferError::Storage)
    }
}

/// 进程内实现，不落盘。
#[derive(Default)]
pub struct MemorySettingsStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, key: &str) -> TransferResult<Option<String>> {
        let values = self.values.lock().unwrap_or_else(|p| p.into_inner());
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> TransferResult<()> {
        let mut values = self.values.lock().unwrap_or_else(|p| p.into_inner());
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> TransferResult<()> {
        let mut values = self.values.lock().unwrap_or_else(|p| p.into_inner());
        values.remove(key);
        Ok(())
    }
}
