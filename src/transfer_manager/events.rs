//! 对外事件。宿主只把各字段当作不透明的 JSON 字符串读取。

use super::recover_lock;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadStatus {
    #[default]
    None,
    InProgress,
    Completed,
    Failed,
}

#[derive(Clone, Debug, PartialEq)]
pub enum OutputEvent {
    /// 累积批次（或绑定记录时本次调用）的文件描述。
    FilesChanged { files_json: String },
    ExistingFilesChanged { existing_files_json: String },
    UploadCompleted { upload_results_json: String },
    UploadStatusChanged(UploadStatus),
}

/// 宿主层使用的扁平结构，每次只填充一个字段。
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputPayload {
    #[serde(rename = "filesJSON", skip_serializing_if = "Option::is_none")]
    pub files_json: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_files: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_results: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_status: Option<UploadStatus>,
}

impl OutputEvent {
    pub fn to_payload(&self) -> OutputPayload {
        match self {
            OutputEvent::FilesChanged { files_json } => OutputPayload {
                files_json: Some(files_json.clone()),
                ..OutputPayload::default()
            },
            OutputEvent::ExistingFilesChanged {
                existing_files_json,
            } => OutputPayload {
                existing_files: Some(existing_files_json.clone()),
                ..OutputPayload::default()
            },
            OutputEvent::UploadCompleted {
                upload_results_json,
            } => OutputPayload {
                upload_results: Some(upload_results_json.clone()),
                ..OutputPayload::default()
            },
            OutputEvent::UploadStatusChanged(status) => OutputPayload {
                upload_status: Some(*status),
                ..OutputPayload::default()
            },
        }
    }
}

/// 订阅者列表；发送失败（接收端已关闭）的订阅者会被剔除。
#[derive(Default)]
pub(crate) struct EventBus {
    subscribers: Mutex<Vec<UnboundedSender<OutputEvent>>>,
}

impl EventBus {
    pub fn subscribe(&self) -> UnboundedReceiver<OutputEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        recover_lock(&self.subscribers).push(tx);
        rx
    }

    pub fn emit(&self, event: OutputEvent) {
        let mut subs = recover_lock(&self.subscribers);
        subs.retain(|sender| sender.send(event.clone()).is_ok());
    }
}
