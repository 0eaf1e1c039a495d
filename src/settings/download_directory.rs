use super::SettingsStore;
use crate::error::{TransferError, TransferResult};
use directories::UserDirs;
use std::path::PathBuf;

const DOWNLOAD_DIR_KEY: &str = "download_directory";

/// 读取下载落地目录；未设置时返回默认目录。
pub fn get_download_directory(store: &dyn SettingsStore) -> TransferResult<PathBuf> {
    if let Some(value) = store.get(DOWNLOAD_DIR_KEY)? {
        return Ok(PathBuf::from(value));
    }
    default_download_directory()
}

pub fn set_download_directory(store: &dyn SettingsStore, path: String) -> TransferResult<String> {
    if path.trim().is_empty() {
        return Err(TransferError::InvalidConfiguration(
            "download directory cannot be empty".to_string(),
        ));
    }
    store.set(DOWNLOAD_DIR_KEY, &path)?;
    Ok(path)
}

pub fn default_download_directory() -> TransferResult<PathBuf> {
    if let Some(user_dirs) = UserDirs::new() {
        let base = user_dirs.download_dir().unwrap_or(user_dirs.home_dir());
        return Ok(base.join("flowattach"));
    }
    Err(TransferError::Storage(
        "failed to resolve default download directory".to_string(),
    ))
}
