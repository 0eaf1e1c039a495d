use super::{client::post_json, models::DownloadedFile};
use crate::config::FlowEndpoints;
use crate::error::{TransferError, TransferResult};
use crate::validation::detect_content_type;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DownloadBody<'a> {
    storage_account_name: &'a str,
    file_path: String,
    file_name: &'a str,
}

/// 通过下载 flow 取回文件内容。
///
/// flow 有两种文档化的返回形态：内容在顶层，或包在 `body` 里一层。
/// 其余形态一律视为错误，并附带实际结构的诊断信息。
pub async fn download_file(
    endpoints: &FlowEndpoints,
    file_name: &str,
) -> TransferResult<DownloadedFile> {
    let url = endpoints.download.as_ref().ok_or_else(|| {
        TransferError::ConfigurationMissing("download endpoint url is required".to_string())
    })?;
    if file_name.trim().is_empty() {
        return Err(TransferError::RemoteCallFailed(
            "file name is required".to_string(),
        ));
    }

    let file_path = match endpoints.folder_path.as_deref() {
        Some(folder) => format!("{folder}/{file_name}"),
        None => file_name.to_string(),
    };
    debug!(file = %file_name, path = %file_path, "requesting file from download flow");
    let body = DownloadBody {
        storage_account_name: &endpoints.container_path,
        file_path,
        file_name,
    };
    let reply = post_json(endpoints, url, &body, "download").await?;
    if !reply.status.is_success() {
        return Err(TransferError::RemoteCallFailed(reply.error_message("download")));
    }
    let value = reply.body.ok_or_else(|| {
        TransferError::RemoteCallFailed("failed to parse download response".to_string())
    })?;

    extract_download(&value, file_name)
}

fn extract_download(value: &Value, requested_name: &str) -> TransferResult<DownloadedFile> {
    let payload = locate_payload(value)
        .ok_or_else(|| TransferError::UnexpectedResponseShape(describe_shape(value)))?;
    let encoded = payload
        .get("fileContent")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let bytes = STANDARD.decode(encoded.trim()).map_err(|e| {
        TransferError::UnexpectedResponseShape(format!("fileContent is not valid base64: {e}"))
    })?;

    let top = value.as_object();
    let field = |key: &str| {
        payload
            .get(key)
            .or_else(|| top.and_then(|t| t.get(key)))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let file_name = field("fileName").unwrap_or_else(|| requested_name.to_string());
    let content_type =
        field("contentType").unwrap_or_else(|| detect_content_type(&file_name).to_string());

    Ok(DownloadedFile {
        file_name,
        content_type,
        bytes,
    })
}

fn locate_payload(value: &Value) -> Option<&Map<String, Value>> {
    let top = value.as_object()?;
    if top.get("fileContent").is_some_and(Value::is_string) {
        return Some(top);
    }
    let body = top.get("body")?.as_object()?;
    if body.get("fileContent").is_some_and(Value::is_string) {
        Some(body)
    } else {
        None
    }
}

fn describe_shape(value: &Value) -> String {
    let Some(top) = value.as_object() else {
        return format!("expected a JSON object, got {}", json_kind(value));
    };
    let keys = |map: &Map<String, Value>| map.keys().cloned().collect::<Vec<_>>().join(", ");
    let mut message = format!(
        "missing fileContent at top level or under body; top-level keys [{}]",
        keys(top)
    );
    match top.get("body") {
        Some(Value::Object(body)) => {
            message.push_str(&format!("; body keys [{}]", keys(body)));
        }
        Some(other) => message.push_str(&format!("; body is {}", json_kind(other))),
        None => {}
    }
    message
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// 把下载内容写入目标目录。已存在同名文件时追加序号，不覆盖。
pub async fn save_downloaded_file(dir: &Path, file: &DownloadedFile) -> TransferResult<PathBuf> {
    tokio::fs::create_dir_all(dir).await.map_err(|e| {
        TransferError::Storage(format!(
            "failed to create download directory {}: {e}",
            dir.to_string_lossy()
        ))
    })?;

    let destination = unique_destination(dir, &sanitize_file_name(&file.file_name)).await;
    tokio::fs::write(&destination, &file.bytes)
        .await
        .map_err(|e| {
            TransferError::Storage(format!(
                "failed to write {}: {e}",
                destination.to_string_lossy()
            ))
        })?;
    debug!(
        bytes = file.bytes.len(),
        path = %destination.to_string_lossy(),
        "downloaded file saved"
    );
    Ok(destination)
}

async fn unique_destination(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
        return candidate;
    }
    let (stem, ext) = match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (file_name, None),
    };
    let mut index = 1u32;
    loop {
        let name = match ext {
            Some(ext) => format!("{stem} ({index}).{ext}"),
            None => format!("{stem} ({index})"),
        };
        let candidate = dir.join(name);
        if !tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
            return candidate;
        }
        index += 1;
    }
}

fn sanitize_file_name(raw: &str) -> String {
    let trimmed = raw.trim();
    let fallback = "download.bin";
    let candidate = if trimmed.is_empty() {
        fallback
    } else {
        trimmed
    };

    let sanitized: String = candidate
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect();

    let final_name = sanitized.trim();
    if final_name.is_empty() || final_name == "." || final_name == ".." {
        fallback.to_string()
    } else {
        final_name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_at_top_level() {
        let value = json!({"fileContent": "aGVsbG8=", "contentType": "text/plain", "fileName": "a.txt"});
        let file = extract_download(&value, "a.txt").unwrap();
        assert_eq!(file.bytes, b"hello");
        assert_eq!(file.content_type, "text/plain");
    }

    #[test]
    fn payload_nested_under_body() {
        let value = json!({"body": {"fileContent": "aGVsbG8="}, "contentType": "application/pdf"});
        let file = extract_download(&value, "doc.pdf").unwrap();
        assert_eq!(file.bytes, b"hello");
        assert_eq!(file.file_name, "doc.pdf");
        assert_eq!(file.content_type, "application/pdf");
    }

    #[test]
    fn missing_content_type_is_detected_from_name() {
        let value = json!({"fileContent": ""});
        let file = extract_download(&value, "photo.png").unwrap();
        assert!(file.bytes.is_empty());
        assert_eq!(file.content_type, "image/png");
    }

    #[test]
    fn unexpected_shape_reports_structure() {
        let value = json!({"status": "ok", "body": {"content": "x"}});
        let err = extract_download(&value, "a").unwrap_err();
        match err {
            TransferError::UnexpectedResponseShape(msg) => {
                assert!(msg.contains("top-level keys [body, status]"), "{msg}");
                assert!(msg.contains("body keys [content]"), "{msg}");
            }
            other => panic!("unexpected error {other:?}"),
        }

        let err = extract_download(&json!([1, 2]), "a").unwrap_err();
        assert_eq!(
            err,
            TransferError::UnexpectedResponseShape("expected a JSON object, got an array".into())
        );
    }

    #[test]
    fn invalid_base64_is_a_shape_error() {
        let value = json!({"fileContent": "@@not base64@@"});
        assert!(matches!(
            extract_download(&value, "a"),
            Err(TransferError::UnexpectedResponseShape(_))
        ));
    }

    #[test]
    fn sanitizes_path_characters() {
        assert_eq!(sanitize_file_name("a/b:c?.pdf"), "a_b_c_.pdf");
        assert_eq!(sanitize_file_name("  "), "download.bin");
        assert_eq!(sanitize_file_name(".."), "download.bin");
    }

    #[tokio::test]
    async fn save_does_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let file = DownloadedFile {
            file_name: "report.pdf".into(),
            content_type: "application/pdf".into(),
            bytes: b"one".to_vec(),
        };
        let first = save_downloaded_file(dir.path(), &file).await.unwrap();
        let second = save_downloaded_file(dir.path(), &file).await.unwrap();
        assert_eq!(first.file_name().unwrap(), "report.pdf");
        assert_eq!(second.file_name().unwrap(), "report (1).pdf");
    }
}
