use crate::config::FlowEndpoints;
use crate::error::{TransferError, TransferResult};
use reqwest::{redirect::Policy, Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// 构建一个带有统一超时与重定向策略的 HTTP 客户端。
/// 所有 flow 调用都复用该函数，避免重复配置。
pub(crate) fn build_client(timeout: Duration) -> TransferResult<Client> {
    Client::builder()
        .timeout(timeout)
        .redirect(Policy::limited(10))
        .build()
        .map_err(|e| TransferError::RemoteCallFailed(format!("failed to build HTTP client: {e}")))
}

/// flow 返回的原始响应：状态码 + 尝试解析后的 JSON。
pub(crate) struct FlowReply {
    pub status: StatusCode,
    pub body: Option<Value>,
}

impl FlowReply {
    /// 仅当 `success` 字段显式为 true。
    pub fn success_flag(&self) -> Option<bool> {
        self.body
            .as_ref()
            .and_then(|v| v.get("success"))
            .and_then(Value::as_bool)
    }

    pub fn str_field(&self, key: &str) -> Option<String> {
        self.body
            .as_ref()
            .and_then(|v| v.get(key))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// flow 报告的错误信息（`error` 或 `message`），没有时退化为状态描述。
    pub fn error_message(&self, action: &str) -> String {
        let reported = self.body.as_ref().and_then(|v| {
            v.get("error")
                .or_else(|| v.get("message"))
                .and_then(|e| match e {
                    Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
                    Value::Object(obj) => obj
                        .get("message")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    _ => None,
                })
        });
        reported.unwrap_or_else(|| {
            if self.status.is_success() {
                format!("{action} flow reported failure")
            } else {
                format!("{action} flow returned HTTP {}", self.status)
            }
        })
    }
}

/// 统一的 POST JSON 调用：超时与一般网络错误分开上报。
pub(crate) async fn post_json<T: Serialize>(
    endpoints: &FlowEndpoints,
    url: &Url,
    body: &T,
    action: &str,
) -> TransferResult<FlowReply> {
    let timeout_secs = endpoints.timeout.as_secs();
    let client = build_client(endpoints.timeout)?;
    let response = client
        .post(url.clone())
        .header("Accept", "application/json")
        .json(body)
        .send()
        .await
        .map_err(|e| TransferError::from_reqwest(e, action, timeout_secs))?;

    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| TransferError::from_reqwest(e, action, timeout_secs))?;
    let body = if text.trim().is_empty() {
        None
    } else {
        serde_json::from_str::<Value>(&text).ok()
    };
    Ok(FlowReply { status, body })
}
