use super::batch::{CumulativeBatch, FileDescriptor};
use super::events::{EventBus, OutputEvent, UploadStatus};
use super::progress::{ProgressEstimator, DEFAULT_TICK_INTERVAL};
use super::recover_lock;
use super::state::{FileStateStore, FileStatus, FileUpdate, LocalFile, PendingFile};
use crate::api::flow::{
    save_downloaded_file, ExistingRemoteFile, FlowBackend, HttpFlowClient, SystemBrowser,
    UploadReceipt, UploadRequest, UploadResult, UrlOpener,
};
use crate::config::{BoundConfig, FlowEndpoints, Policy};
use crate::error::{TransferError, TransferResult};
use crate::settings::{get_download_directory, PolicyResolver, SettingsStore};
use crate::validation::{validate_file, FileCandidate};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, warn};

/// 查看文件的结果：直接打开了已知直链，或下载后落地到本地。
#[derive(Clone, Debug, PartialEq)]
pub enum ViewOutcome {
    OpenedUrl(String),
    Saved(PathBuf),
}

/// 某一时刻的完整视图，供宿主渲染。
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferSnapshot {
    pub files: Vec<PendingFile>,
    pub existing_files: Vec<ExistingRemoteFile>,
    pub batch: Vec<FileDescriptor>,
    pub upload_status: UploadStatus,
    pub is_loading: bool,
    pub pending_delete: Option<String>,
}

/// 附件传输编排器。
///
/// 克隆共享同一份内部状态；锁只在同步片段内持有，不跨越 await。
#[derive(Clone)]
pub struct TransferManager {
    state: Arc<Mutex<FileStateStore>>,
    config: Arc<Mutex<BoundConfig>>,
    policy: Arc<Mutex<PolicyResolver>>,
    settings: Arc<dyn SettingsStore>,
    backend: Arc<dyn FlowBackend>,
    opener: Arc<dyn UrlOpener>,
    progress: Arc<ProgressEstimator>,
    batch: Arc<Mutex<CumulativeBatch>>,
    events: Arc<EventBus>,
    loading: Arc<AtomicBool>,
    pending_delete: Arc<Mutex<Option<String>>>,
    upload_status: Arc<Mutex<UploadStatus>>,
}

impl TransferManager {
    pub fn new(config: BoundConfig, settings: Arc<dyn SettingsStore>) -> Self {
        let state = Arc::new(Mutex::new(FileStateStore::new()));
        let policy = PolicyResolver::load(Arc::clone(&settings), config.policy());
        Self {
            progress: Arc::new(ProgressEstimator::new(
                Arc::clone(&state),
                DEFAULT_TICK_INTERVAL,
            )),
            state,
            config: Arc::new(Mutex::new(config)),
            policy: Arc::new(Mutex::new(policy)),
            settings,
            backend: Arc::new(HttpFlowClient),
            opener: Arc::new(SystemBrowser),
            batch: Arc::new(Mutex::new(CumulativeBatch::default())),
            events: Arc::new(EventBus::default()),
            loading: Arc::new(AtomicBool::new(false)),
            pending_delete: Arc::new(Mutex::new(None)),
            upload_status: Arc::new(Mutex::new(UploadStatus::None)),
        }
    }

    pub fn with_backend(mut self, backend: Arc<dyn FlowBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_url_opener(mut self, opener: Arc<dyn UrlOpener>) -> Self {
        self.opener = opener;
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.progress = Arc::new(ProgressEstimator::new(Arc::clone(&self.state), interval));
        self
    }

    pub fn subscribe(&self) -> UnboundedReceiver<OutputEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> TransferSnapshot {
        let (files, existing_files) = {
            let state = recover_lock(&self.state);
            (state.files().to_vec(), state.existing().to_vec())
        };
        TransferSnapshot {
            files,
            existing_files,
            batch: recover_lock(&self.batch).entries().to_vec(),
            upload_status: *recover_lock(&self.upload_status),
            is_loading: self.loading.load(Ordering::SeqCst),
            pending_delete: recover_lock(&self.pending_delete).clone(),
        }
    }

    pub fn config(&self) -> BoundConfig {
        recover_lock(&self.config).clone()
    }

    pub fn active_policy(&self) -> Policy {
        recover_lock(&self.policy).active().clone()
    }

    pub fn is_policy_overridden(&self) -> bool {
        recover_lock(&self.policy).is_overridden()
    }

    pub fn is_cloud_flow_configured(&self) -> bool {
        recover_lock(&self.config).is_cloud_flow_configured()
    }

    /// 校验并加入本地状态表，返回本次新增的条目（含被拒绝的）。
    pub fn add_files(&self, files: Vec<LocalFile>) -> Vec<PendingFile> {
        let policy = self.active_policy();
        let added = recover_lock(&self.state).add_files(files, &policy);
        debug!(count = added.len(), "files added");
        added
    }

    /// 只校验不加入，供宿主在文件拖入前提示。
    pub fn check_file(&self, file: &LocalFile) -> TransferResult<()> {
        let policy = self.active_policy();
        let state = recover_lock(&self.state);
        if state.get(&file.name).is_some() {
            return Err(TransferError::ValidationRejected(format!(
                "A file named \"{}\" is already selected",
                file.name
            )));
        }
        let candidate = FileCandidate {
            name: &file.name,
            size: file.size,
            mime_type: &file.mime_type,
        };
        validate_file(&candidate, state.committed_bytes(), &policy).into_result()
    }

    pub fn remove_file(&self, name: &str) -> bool {
        recover_lock(&self.state).remove_file(name)
    }

    pub fn clear_new(&self) {
        recover_lock(&self.state).clear_new();
    }

    /// 清空累积批次，并移除已完成的本地条目。
    ///
    /// 除批次外，状态表中 `Completed` 的条目也会被删除，避免它们在下一批次中被再次报告；
    /// 其他状态的条目保持不变。
    pub fn clear_batch(&self) {
        recover_lock(&self.batch).clear();
        {
            let mut state = recover_lock(&self.state);
            let completed = names_with_status(state.files(), FileStatus::Completed);
            state.remove_names(&completed);
        }
        self.emit_batch(Vec::new());
    }

    pub fn set_max_total_size_mb(&self, max_mb: f64) -> TransferResult<()> {
        recover_lock(&self.policy).set_max_total_size_mb(max_mb)
    }

    pub fn set_allowed_types(&self, raw: &str) -> TransferResult<()> {
        recover_lock(&self.policy).set_allowed_types(raw)
    }

    pub fn set_policy_override(&self, policy: Policy) -> TransferResult<()> {
        recover_lock(&self.policy).set_override(policy)
    }

    /// 宿主重新绑定配置。策略值变化时以绑定值为准；记录上下文变化时重置批次并重新列举。
    pub async fn update_config(&self, next: BoundConfig) -> TransferResult<()> {
        let previous = std::mem::replace(&mut *recover_lock(&self.config), next.clone());

        let policy_result = if previous.policy() != next.policy() {
            recover_lock(&self.policy).on_bound_changed(next.policy())
        } else {
            Ok(())
        };

        let context_changed = previous.record_identity() != next.record_identity()
            || previous.folder_name != next.folder_name;
        if context_changed {
            self.on_context_changed().await?;
        }
        policy_result
    }

    /// 切换记录上下文（记录标识与目录名）。
    pub async fn set_context(
        &self,
        record_id: Option<String>,
        folder_name: Option<String>,
    ) -> TransferResult<()> {
        {
            let mut config = recover_lock(&self.config);
            config.record_id = record_id;
            config.folder_name = folder_name;
        }
        self.on_context_changed().await
    }

    async fn on_context_changed(&self) -> TransferResult<()> {
        info!("record context changed; resetting batch");
        recover_lock(&self.batch).clear();
        recover_lock(&self.state).clear_new();
        self.emit_batch(Vec::new());

        if self.is_cloud_flow_configured() {
            self.refresh_existing().await?;
        } else {
            recover_lock(&self.state).set_existing(Vec::new());
            self.emit_existing(&[]);
        }
        Ok(())
    }

    /// 重新列举远程已有文件，整体替换本地视图。
    pub async fn refresh_existing(&self) -> TransferResult<Vec<ExistingRemoteFile>> {
        let endpoints = self.endpoints()?;
        let files = self.backend.list(&endpoints).await?;
        debug!(count = files.len(), "existing files refreshed");
        recover_lock(&self.state).set_existing(files.clone());
        self.emit_existing(&files);
        Ok(files)
    }

    /// 处理所有待上传的有效文件。
    ///
    /// - 远程模式下逐个顺序上传，单个失败不影响其他文件。
    /// - 远程前置条件不满足时回退为本地 JSON 模式，不发起任何网络请求。
    /// - 批次内逃逸的错误（如对账失败）会把本批未终结的文件统一标记为失败。
    pub async fn process_files(&self) -> TransferResult<Vec<UploadResult>> {
        if self.loading.swap(true, Ordering::SeqCst) {
            warn!("process_files called while a batch is already running");
            return Ok(Vec::new());
        }
        let batch = recover_lock(&self.state).pending_valid();
        if batch.is_empty() {
            self.loading.store(false, Ordering::SeqCst);
            debug!("no pending files to process");
            return Ok(Vec::new());
        }

        self.set_upload_status(UploadStatus::InProgress);
        let names: Vec<String> = batch.iter().map(|f| f.name.clone()).collect();
        let outcome = self.run_batch(batch).await;
        self.loading.store(false, Ordering::SeqCst);

        outcome.inspect_err(|err| self.fail_batch(&names, err))
    }

    async fn run_batch(&self, batch: Vec<PendingFile>) -> TransferResult<Vec<UploadResult>> {
        let config = self.config();
        let endpoints = if config.is_cloud_flow_configured() {
            Some(config.flow_endpoints()?)
        } else {
            if let Err(err) = config.flow_endpoints() {
                info!(error = %err, "remote flow not configured; storing files locally");
            } else {
                info!("download endpoint not configured; storing files locally");
            }
            None
        };

        let mut results = Vec::with_capacity(batch.len());
        let mut descriptors = Vec::new();
        for file in &batch {
            let (result, descriptor) = match &endpoints {
                Some(endpoints) => self.upload_one(endpoints, file).await,
                None => self.store_locally(file).await,
            };
            results.push(result);
            descriptors.extend(descriptor);
        }

        self.events.emit(OutputEvent::UploadCompleted {
            upload_results_json: to_json(&results),
        });

        let record_bound = config.record_identity().is_some();
        if record_bound {
            self.emit_batch(descriptors);
        } else {
            let cumulative = {
                let mut cumulative = recover_lock(&self.batch);
                cumulative.append(descriptors);
                cumulative.entries().to_vec()
            };
            self.emit_batch(cumulative);
        }

        let succeeded: Vec<String> = results
            .iter()
            .filter(|r| r.success)
            .map(|r| r.file_name.clone())
            .collect();
        if let (Some(endpoints), false) = (&endpoints, succeeded.is_empty()) {
            let existing = self.backend.list(endpoints).await?;
            {
                let mut state = recover_lock(&self.state);
                state.set_existing(existing.clone());
                state.remove_names(&succeeded);
            }
            self.emit_existing(&existing);
        }
        if record_bound {
            let mut state = recover_lock(&self.state);
            let completed = names_with_status(state.files(), FileStatus::Completed);
            state.remove_names(&completed);
        }

        let status = if results.iter().all(|r| r.success) {
            UploadStatus::Completed
        } else {
            UploadStatus::Failed
        };
        info!(
            count = results.len(),
            succeeded = succeeded.len(),
            "batch processed"
        );
        self.set_upload_status(status);
        Ok(results)
    }

    async fn upload_one(
        &self,
        endpoints: &FlowEndpoints,
        file: &PendingFile,
    ) -> (UploadResult, Option<FileDescriptor>) {
        self.update_file(
            &file.name,
            FileUpdate::status(FileStatus::Uploading)
                .progress(0)
                .clear_error(),
        );
        self.progress.start(&file.name);
        let outcome = self.send_file(endpoints, file).await;
        self.progress.finish(&file.name);

        match outcome {
            Ok((receipt, descriptor)) => {
                info!(file = %file.name, "file uploaded");
                self.update_file(
                    &file.name,
                    FileUpdate::status(FileStatus::Completed)
                        .progress(100)
                        .remote_url(receipt.url.clone()),
                );
                (UploadResult::succeeded(&file.name, receipt), Some(descriptor))
            }
            Err(err) => {
                warn!(file = %file.name, error = %err, "upload failed");
                self.mark_failed(&file.name, &err);
                (UploadResult::failed(&file.name, err.to_string()), None)
            }
        }
    }

    async fn send_file(
        &self,
        endpoints: &FlowEndpoints,
        file: &PendingFile,
    ) -> TransferResult<(UploadReceipt, FileDescriptor)> {
        let content = file.source.read(&file.name).await?;
        let descriptor = FileDescriptor {
            name: file.name.clone(),
            size: file.size,
            content_base64: STANDARD.encode(&content),
        };
        let request = UploadRequest {
            file_name: file.name.clone(),
            content,
            content_type: file.mime_type.clone(),
        };
        let receipt = self.backend.upload(endpoints, request).await?;
        Ok((receipt, descriptor))
    }

    /// 本地 JSON 模式：读取内容并编码，直接视为完成。
    async fn store_locally(&self, file: &PendingFile) -> (UploadResult, Option<FileDescriptor>) {
        self.update_file(
            &file.name,
            FileUpdate::status(FileStatus::Uploading).progress(0),
        );
        match file.source.read(&file.name).await {
            Ok(content) => {
                self.update_file(
                    &file.name,
                    FileUpdate::status(FileStatus::Completed).progress(100),
                );
                let descriptor = FileDescriptor {
                    name: file.name.clone(),
                    size: file.size,
                    content_base64: STANDARD.encode(&content),
                };
                let receipt = UploadReceipt {
                    file_name: file.name.clone(),
                    remote_name: None,
                    url: None,
                    flow_run_id: None,
                };
                (UploadResult::succeeded(&file.name, receipt), Some(descriptor))
            }
            Err(err) => {
                warn!(file = %file.name, error = %err, "failed to read file");
                self.mark_failed(&file.name, &err);
                (UploadResult::failed(&file.name, err.to_string()), None)
            }
        }
    }

    /// 批次级错误的粗粒度处理：本批所有尚未终结的文件都记为同一个错误。
    fn fail_batch(&self, names: &[String], err: &TransferError) {
        error!(error = %err, count = names.len(), "batch processing failed");
        for name in names {
            self.progress.finish(name);
            let status = recover_lock(&self.state).get(name).map(|f| f.status);
            match status {
                Some(status) if status.is_terminal() => {}
                Some(_) => self.mark_failed(name, err),
                None => {}
            }
        }
        self.set_upload_status(UploadStatus::Failed);
    }

    fn mark_failed(&self, name: &str, err: &TransferError) {
        let mut state = recover_lock(&self.state);
        if state.get(name).map(|f| f.status) != Some(FileStatus::Uploading) {
            state.update_status(name, FileUpdate::status(FileStatus::Uploading));
        }
        state.update_status(
            name,
            FileUpdate::status(FileStatus::Failed)
                .progress(0)
                .error(err.to_string()),
        );
    }

    /// 记录待确认的删除；名称必须存在于远程已有文件中。
    pub fn request_delete(&self, name: &str) -> bool {
        let known = recover_lock(&self.state)
            .existing()
            .iter()
            .any(|f| f.name == name);
        if !known {
            warn!(file = %name, "cannot delete unknown remote file");
            return false;
        }
        *recover_lock(&self.pending_delete) = Some(name.to_string());
        true
    }

    pub fn cancel_delete(&self) {
        recover_lock(&self.pending_delete).take();
    }

    /// 执行待确认的删除。
    ///
    /// 先用本地过滤后的列表通知一次，再等待重新列举并以远程结果再通知一次，顺序固定。
    pub async fn confirm_delete(&self) -> TransferResult<()> {
        let Some(name) = recover_lock(&self.pending_delete).take() else {
            debug!("no pending delete to confirm");
            return Ok(());
        };
        let endpoints = self.endpoints()?;
        self.backend.delete(&endpoints, &name).await?;
        info!(file = %name, "remote file deleted");

        let filtered: Vec<ExistingRemoteFile> = {
            let mut state = recover_lock(&self.state);
            let filtered: Vec<ExistingRemoteFile> = state
                .existing()
                .iter()
                .filter(|f| f.name != name)
                .cloned()
                .collect();
            state.set_existing(filtered.clone());
            filtered
        };
        self.emit_existing(&filtered);

        self.refresh_existing().await?;
        Ok(())
    }

    /// 不经确认直接删除远程文件，随后重新列举。
    pub async fn delete_existing(&self, name: &str) -> TransferResult<()> {
        let endpoints = self.endpoints()?;
        self.backend.delete(&endpoints, name).await?;
        self.refresh_existing().await?;
        Ok(())
    }

    /// 通过下载 flow 取回文件并保存到下载目录，返回落地路径。
    pub async fn download_file(&self, name: &str) -> TransferResult<PathBuf> {
        let endpoints = self.endpoints()?;
        let file = self.backend.download(&endpoints, name).await?;
        let dir = get_download_directory(self.settings.as_ref())?;
        let path = save_downloaded_file(&dir, &file).await?;
        info!(file = %name, path = %path.display(), "file downloaded");
        Ok(path)
    }

    pub async fn view_file(&self, name: &str) -> TransferResult<ViewOutcome> {
        let has_download = matches!(
            self.endpoints(),
            Ok(endpoints) if endpoints.download.is_some()
        );
        if has_download {
            return self.download_file(name).await.map(ViewOutcome::Saved);
        }

        let url = recover_lock(&self.state)
            .existing()
            .iter()
            .find(|f| f.name == name)
            .and_then(|f| f.url.clone())
            .ok_or_else(|| {
                TransferError::RemoteCallFailed(format!("no direct url known for \"{name}\""))
            })?;
        self.opener.open(&url)?;
        Ok(ViewOutcome::OpenedUrl(url))
    }

    /// 取消全部进度任务。之后的处理不会再产生合成进度。
    pub fn shutdown(&self) {
        self.progress.shutdown();
    }

    fn endpoints(&self) -> TransferResult<FlowEndpoints> {
        recover_lock(&self.config).flow_endpoints()
    }

    fn update_file(&self, name: &str, update: FileUpdate) {
        recover_lock(&self.state).update_status(name, update);
    }

    fn set_upload_status(&self, status: UploadStatus) {
        *recover_lock(&self.upload_status) = status;
        self.events.emit(OutputEvent::UploadStatusChanged(status));
    }

    fn emit_batch(&self, descriptors: Vec<FileDescriptor>) {
        self.events.emit(OutputEvent::FilesChanged {
            files_json: to_json(&descriptors),
        });
    }

    fn emit_existing(&self, files: &[ExistingRemoteFile]) {
        self.events.emit(OutputEvent::ExistingFilesChanged {
            existing_files_json: to_json(files),
        });
    }
}

fn names_with_status(files: &[PendingFile], status: FileStatus) -> Vec<String> {
    files
        .iter()
        .filter(|f| f.status == status)
        .map(|f| f.name.clone())
        .collect()
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|err| {
        warn!(error = %err, "failed to serialize event payload");
        "[]".to_string()
    })
}
