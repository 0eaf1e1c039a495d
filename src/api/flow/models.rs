use serde::{Deserialize, Serialize};

/// 远程存储中已确认存在的文件。每次成功列举后整体替换。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistingRemoteFile {
    pub name: String,
    pub size: u64,
    pub url: Option<String>,
    pub last_modified: Option<String>,
}

/// 单个文件的上传请求。
#[derive(Clone, Debug)]
pub struct UploadRequest {
    pub file_name: String,
    pub content: Vec<u8>,
    pub content_type: String,
}

/// 上传 flow 的成功回执。
///
/// `file_name` 总是请求中发送的本地名称，它是状态表的键；
/// flow 回显的名称（可能带路径或被改写）单独保存在 `remote_name`。
#[derive(Clone, Debug, PartialEq)]
pub struct UploadReceipt {
    pub file_name: String,
    pub remote_name: Option<String>,
    pub url: Option<String>,
    pub flow_run_id: Option<String>,
}

/// 删除 flow 的成功回执。
#[derive(Clone, Debug, PartialEq)]
pub struct DeleteResult {
    pub file_name: String,
    pub flow_run_id: Option<String>,
}

/// 下载 flow 返回并解码后的文件内容。
#[derive(Clone, Debug, PartialEq)]
pub struct DownloadedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// 一次批量处理中单个文件的结果，对外以 JSON 形式上报。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub file_name: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow_run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadResult {
    /// `file_name` 取本地名称，不使用回执中的名称。
    pub fn succeeded(file_name: &str, receipt: UploadReceipt) -> Self {
        Self {
            file_name: file_name.to_string(),
            success: true,
            remote_name: receipt.remote_name,
            url: receipt.url,
            flow_run_id: receipt.flow_run_id,
            error: None,
        }
    }

    pub fn failed(file_name: &str, error: String) -> Self {
        Self {
            file_name: file_name.to_string(),
            success: false,
            remote_name: None,
            url: None,
            flow_run_id: None,
            error: Some(error),
        }
    }
}
