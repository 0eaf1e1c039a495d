use super::{client::post_json, models::DeleteResult};
use crate::config::FlowEndpoints;
use crate::error::{TransferError, TransferResult};
use serde::Serialize;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteBody<'a> {
    file_name: &'a str,
    container_path: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    folder_name: Option<&'a str>,
}

/// 删除远程文件，只有 `success=true` 才算成功。
pub async fn delete_file(endpoints: &FlowEndpoints, file_name: &str) -> TransferResult<DeleteResult> {
    if file_name.trim().is_empty() {
        return Err(TransferError::RemoteCallFailed(
            "file name is required".to_string(),
        ));
    }

    let body = DeleteBody {
        file_name,
        container_path: &endpoints.container_path,
        folder_name: endpoints.folder_path.as_deref(),
    };
    let reply = post_json(endpoints, &endpoints.delete, &body, "delete").await?;
    if reply.success_flag() != Some(true) {
        return Err(TransferError::RemoteCallFailed(reply.error_message("delete")));
    }

    Ok(DeleteResult {
        file_name: reply
            .str_field("fileName")
            .unwrap_or_else(|| file_name.to_string()),
        flow_run_id: reply.str_field("flowRunId"),
    })
}
