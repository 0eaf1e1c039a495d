//! 本地文件状态表：渲染与上传的唯一数据来源。
//!
//! 状态只能单向流转：`pending|invalid → uploading → completed|failed`。

use crate::api::flow::ExistingRemoteFile;
use crate::config::Policy;
use crate::error::{TransferError, TransferResult};
use crate::validation::{detect_content_type, validate_file, FileCandidate};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Pending,
    Uploading,
    Completed,
    Failed,
    Invalid,
}

impl FileStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, FileStatus::Completed | FileStatus::Failed)
    }

    /// 只有 pending / invalid 可以被用户移除。
    pub fn is_removable(self) -> bool {
        matches!(self, FileStatus::Pending | FileStatus::Invalid)
    }

    fn can_become(self, next: FileStatus) -> bool {
        match (self, next) {
            (current, next) if current == next => true,
            (FileStatus::Pending | FileStatus::Invalid, FileStatus::Uploading) => true,
            (FileStatus::Uploading, FileStatus::Completed | FileStatus::Failed) => true,
            _ => false,
        }
    }
}

/// 文件内容来源：内存字节或本地路径（上传时才读取）。
#[derive(Clone, Debug)]
pub enum FileSource {
    Memory(Arc<[u8]>),
    Path(PathBuf),
}

/// 用户提供的待添加文件。
#[derive(Clone, Debug)]
pub struct LocalFile {
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub source: FileSource,
}

impl LocalFile {
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        Self {
            size: bytes.len() as u64,
            mime_type: detect_content_type(&name).to_string(),
            source: FileSource::Memory(bytes.into()),
            name,
        }
    }

    /// 只读取元数据，内容在真正处理时才加载。
    pub async fn from_path(path: impl Into<PathBuf>) -> TransferResult<Self> {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let metadata =
            tokio::fs::metadata(&path)
                .await
                .map_err(|e| TransferError::LocalReadFailed {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
        if !metadata.is_file() {
            return Err(TransferError::LocalReadFailed {
                name,
                reason: "not a regular file".to_string(),
            });
        }
        Ok(Self {
            size: metadata.len(),
            mime_type: detect_content_type(&name).to_string(),
            source: FileSource::Path(path),
            name,
        })
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }
}

impl FileSource {
    pub(crate) async fn read(&self, name: &str) -> TransferResult<Vec<u8>> {
        match self {
            FileSource::Memory(bytes) => Ok(bytes.to_vec()),
            FileSource::Path(path) => {
                tokio::fs::read(path)
                    .await
                    .map_err(|e| TransferError::LocalReadFailed {
                        name: name.to_string(),
                        reason: e.to_string(),
                    })
            }
        }
    }
}

/// 本地已知文件及其生命周期状态。以文件名为唯一键。
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingFile {
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub status: FileStatus,
    pub progress: u8,
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
    #[serde(skip)]
    pub source: FileSource,
}

/// 按名称合并的局部更新，未设置的字段保持不变。
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FileUpdate {
    pub status: Option<FileStatus>,
    pub progress: Option<u8>,
    pub error: Option<Option<String>>,
    pub remote_url: Option<String>,
}

impl FileUpdate {
    pub fn status(status: FileStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }

    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(Some(message.into()));
        self
    }

    pub fn clear_error(mut self) -> Self {
        self.error = Some(None);
        self
    }

    pub fn remote_url(mut self, url: Option<String>) -> Self {
        self.remote_url = url;
        self
    }
}

#[derive(Debug, Default)]
pub struct FileStateStore {
    files: Vec<PendingFile>,
    existing: Vec<ExistingRemoteFile>,
}

impl FileStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn files(&self) -> &[PendingFile] {
        &self.files
    }

    pub fn existing(&self) -> &[ExistingRemoteFile] {
        &self.existing
    }

    pub fn get(&self, name: &str) -> Option<&PendingFile> {
        self.files.iter().find(|f| f.name == name)
    }

    /// 已占用的额度：有效且未失败的本地文件 + 远程已有文件。
    pub fn committed_bytes(&self) -> u64 {
        let local: u64 = self
            .files
            .iter()
            .filter(|f| f.is_valid && f.status != FileStatus::Failed)
            .map(|f| f.size)
            .sum();
        let remote: u64 = self.existing.iter().map(|f| f.size).sum();
        local.saturating_add(remote)
    }

    /// 逐个校验并追加。每个文件都基于此前已接受的文件计算累计大小，因此结果与顺序相关。
    ///
    /// 名称已存在的文件只在返回值中报告为 `Invalid`，不会进入状态表，
    /// 名称始终唯一标识一个条目。
    pub fn add_files(&mut self, files: Vec<LocalFile>, policy: &Policy) -> Vec<PendingFile> {
        let mut added = Vec::with_capacity(files.len());
        for file in files {
            let duplicate = self.get(&file.name).is_some();
            let outcome = if duplicate {
                crate::validation::ValidationOutcome::rejected(format!(
                    "A file named \"{}\" is already selected",
                    file.name
                ))
            } else {
                let candidate = FileCandidate {
                    name: &file.name,
                    size: file.size,
                    mime_type: &file.mime_type,
                };
                validate_file(&candidate, self.committed_bytes(), policy)
            };

            if let Some(reason) = outcome.error.as_deref() {
                debug!(file = %file.name, reason, "file rejected");
            }
            let entry = PendingFile {
                name: file.name,
                size: file.size,
                mime_type: file.mime_type,
                status: if outcome.is_valid {
                    FileStatus::Pending
                } else {
                    FileStatus::Invalid
                },
                progress: 0,
                is_valid: outcome.is_valid,
                error: outcome.error,
                remote_url: None,
                source: file.source,
            };
            if duplicate {
                added.push(entry);
            } else {
                added.push(entry.clone());
                self.files.push(entry);
            }
        }
        added
    }

    /// 按名称合并更新；名称不存在时为空操作。逆向的状态变更会被拒绝并记录日志。
    pub fn update_status(&mut self, name: &str, update: FileUpdate) -> bool {
        let Some(file) = self.files.iter_mut().find(|f| f.name == name) else {
            return false;
        };
        if let Some(next) = update.status {
            if !file.status.can_become(next) {
                warn!(file = %name, from = ?file.status, to = ?next, "refusing status transition");
                return false;
            }
            file.status = next;
        }
        if let Some(progress) = update.progress {
            file.progress = progress;
        }
        if let Some(error) = update.error {
            file.error = error;
        }
        if let Some(url) = update.remote_url {
            file.remote_url = Some(url);
        }
        true
    }

    /// 仅在上传中时推进合成进度，返回 false 表示该文件已不在上传中。
    pub(crate) fn bump_progress(&mut self, name: &str, increment: u8, cap: u8) -> bool {
        match self.files.iter_mut().find(|f| f.name == name) {
            Some(file) if file.status == FileStatus::Uploading => {
                file.progress = file.progress.saturating_add(increment).min(cap);
                true
            }
            _ => false,
        }
    }

    /// 移除失败时只记录日志，不返回错误。
    pub fn remove_file(&mut self, name: &str) -> bool {
        let Some(position) = self.files.iter().position(|f| f.name == name) else {
            warn!(file = %name, "cannot remove unknown file");
            return false;
        };
        let status = self.files[position].status;
        if !status.is_removable() {
            warn!(file = %name, ?status, "file cannot be removed in its current state");
            return false;
        }
        self.files.remove(position);
        true
    }

    /// 清空本地文件，远程已有文件不受影响。
    pub fn clear_new(&mut self) {
        self.files.clear();
    }

    pub fn set_existing(&mut self, files: Vec<ExistingRemoteFile>) {
        self.existing = files;
    }

    pub fn remove_names(&mut self, names: &[String]) {
        self.files.retain(|f| !names.contains(&f.name));
    }

    /// 等待处理的有效文件，按添加顺序返回。
    pub fn pending_valid(&self) -> Vec<PendingFile> {
        self.files
            .iter()
            .filter(|f| f.is_valid && f.status == FileStatus::Pending)
            .cloned()
            .collect()
    }
}
