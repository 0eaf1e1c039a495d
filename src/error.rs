//! 统一的错误分类，供编排器、远程调用与设置层共享。

/// 文件传输过程中可能出现的全部错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    /// 类型或大小校验未通过；不会触发任何网络请求。
    #[error("{0}")]
    ValidationRejected(String),

    /// 远程模式的前置配置缺失，调用方应回退到本地模式。
    #[error("configuration missing: {0}")]
    ConfigurationMissing(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// 非 2xx、`success=false` 或无法解析的响应体。
    #[error("{0}")]
    RemoteCallFailed(String),

    #[error("request timed out after {0} seconds")]
    RemoteCallTimedOut(u64),

    #[error("unexpected response shape: {0}")]
    UnexpectedResponseShape(String),

    #[error("failed to read local file {name}: {reason}")]
    LocalReadFailed { name: String, reason: String },

    #[error("storage error: {0}")]
    Storage(String),
}

impl TransferError {
    /// 把 reqwest 错误映射为超时或一般失败，两者不能混用。
    pub(crate) fn from_reqwest(err: reqwest::Error, action: &str, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            TransferError::RemoteCallTimedOut(timeout_secs)
        } else {
            TransferError::RemoteCallFailed(format!("failed to {action}: {err}"))
        }
    }
}

pub type TransferResult<T> = Result<T, TransferError>;
