use super::{
    client::post_json,
    models::{UploadReceipt, UploadRequest},
};
use crate::config::FlowEndpoints;
use crate::error::{TransferError, TransferResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Serialize;
use tracing::debug;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadBody<'a> {
    file_name: &'a str,
    file_content: String,
    container_path: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    folder_name: Option<&'a str>,
    file_size: u64,
    content_type: &'a str,
}

/// 通过上传 flow 提交单个文件，内容以 base64 放在 JSON 中。
/// - 非 2xx 直接视为失败。
/// - 2xx 但 `success=false` 也是失败，使用 flow 返回的错误信息。
pub async fn upload_file(
    endpoints: &FlowEndpoints,
    request: UploadRequest,
) -> TransferResult<UploadReceipt> {
    let file_name = request.file_name.as_str();
    if file_name.trim().is_empty() {
        return Err(TransferError::RemoteCallFailed(
            "file name cannot be empty".to_string(),
        ));
    }

    let body = UploadBody {
        file_name,
        file_content: STANDARD.encode(&request.content),
        container_path: &endpoints.container_path,
        folder_name: endpoints.folder_path.as_deref(),
        file_size: request.content.len() as u64,
        content_type: &request.content_type,
    };
    debug!(file = %file_name, bytes = body.file_size, "posting file to upload flow");

    let reply = post_json(endpoints, &endpoints.upload, &body, "upload").await?;
    if !reply.status.is_success() {
        return Err(TransferError::RemoteCallFailed(reply.error_message("upload")));
    }
    if reply.body.is_none() {
        return Err(TransferError::RemoteCallFailed(
            "failed to parse upload response".to_string(),
        ));
    }
    if reply.success_flag() == Some(false) {
        return Err(TransferError::RemoteCallFailed(reply.error_message("upload")));
    }

    Ok(UploadReceipt {
        file_name: file_name.to_string(),
        remote_name: reply.str_field("fileName"),
        url: reply.str_field("url"),
        flow_run_id: reply.str_field("flowRunId"),
    })
}
