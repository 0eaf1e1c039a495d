use super::{client::post_json, models::ExistingRemoteFile};
use crate::config::FlowEndpoints;
use crate::error::{TransferError, TransferResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListBody<'a> {
    container_path: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    folder_name: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListEntryDto {
    name: String,
    #[serde(default, deserialize_with = "lenient_size")]
    size: u64,
    url: Option<String>,
    last_modified: Option<String>,
}

impl From<ListEntryDto> for ExistingRemoteFile {
    fn from(value: ListEntryDto) -> Self {
        ExistingRemoteFile {
            name: value.name,
            size: value.size,
            url: value.url.filter(|u| !u.trim().is_empty()),
            last_modified: value.last_modified,
        }
    }
}

/// 列举目标目录下的远程文件。
///
/// 以下两种情况视为成功：`success=true`；或响应中带有合法的 `files` 数组
/// （不论 `success` 与 HTTP 状态码，空数组同样算成功）。其余组合均为错误。
pub async fn list_files(endpoints: &FlowEndpoints) -> TransferResult<Vec<ExistingRemoteFile>> {
    let body = ListBody {
        container_path: &endpoints.container_path,
        folder_name: endpoints.folder_path.as_deref(),
    };
    let reply = post_json(endpoints, &endpoints.list, &body, "list").await?;

    let files = reply
        .body
        .as_ref()
        .and_then(|v| v.get("files"))
        .and_then(Value::as_array);
    if let Some(entries) = files {
        if !reply.status.is_success() {
            debug!(status = %reply.status, "list flow returned files despite HTTP error");
        }
        return Ok(parse_entries(entries));
    }

    if reply.success_flag() == Some(true) {
        return Ok(Vec::new());
    }
    if reply.body.is_none() && reply.status.is_success() {
        return Err(TransferError::RemoteCallFailed(
            "failed to parse list response".to_string(),
        ));
    }
    Err(TransferError::RemoteCallFailed(reply.error_message("list")))
}

fn parse_entries(entries: &[Value]) -> Vec<ExistingRemoteFile> {
    entries
        .iter()
        .filter_map(|entry| match ListEntryDto::deserialize(entry) {
            Ok(dto) => Some(ExistingRemoteFile::from(dto)),
            Err(err) => {
                warn!(error = %err, "skipping malformed list entry");
                None
            }
        })
        .collect()
}

/// 有的 flow 把 size 序列化成字符串。
fn lenient_size<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().map(|f| f.max(0.0) as u64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}
