//! 宿主绑定进来的配置：远程 flow 端点、容器/目录、策略初值与展示选项。
//! 宿主以 camelCase JSON 传入，这里负责校验并转换为强类型结构。

use crate::error::{TransferError, TransferResult};
use crate::validation::parse_allowed_types;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// 远程 flow 冷启动较慢，默认给足时间。
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const BYTES_PER_MB: u64 = 1024 * 1024;

/// 宿主层绑定的原始配置。字段缺失时使用默认值，校验延后到使用时进行。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BoundConfig {
    pub upload_flow_url: String,
    pub list_flow_url: String,
    pub delete_flow_url: String,
    pub download_flow_url: String,
    pub container_path: String,
    pub folder_name: Option<String>,
    pub record_id: Option<String>,
    #[serde(rename = "maxTotalFileSizeMB")]
    pub max_total_file_size_mb: f64,
    pub allowed_file_types: String,
    pub timeout_secs: u64,
    pub appearance: Option<RawOption>,
    pub shape: Option<RawOption>,
    pub size: Option<RawOption>,
}

impl Default for BoundConfig {
    fn default() -> Self {
        Self {
            upload_flow_url: String::new(),
            list_flow_url: String::new(),
            delete_flow_url: String::new(),
            download_flow_url: String::new(),
            container_path: String::new(),
            folder_name: None,
            record_id: None,
            max_total_file_size_mb: 0.0,
            allowed_file_types: String::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            appearance: None,
            shape: None,
            size: None,
        }
    }
}

impl BoundConfig {
    pub fn from_json(raw: &str) -> TransferResult<Self> {
        serde_json::from_str(raw)
            .map_err(|e| TransferError::InvalidConfiguration(format!("bound config: {e}")))
    }

    /// 已绑定且非空白的记录标识。
    pub fn record_identity(&self) -> Option<&str> {
        self.record_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// 绑定配置对应的策略，作为本地覆盖的基线。
    pub fn policy(&self) -> Policy {
        Policy::from_megabytes(self.max_total_file_size_mb, &self.allowed_file_types)
    }

    /// 目录名与记录标识用 `/` 拼接，两者都可以缺省。
    pub fn folder_path(&self) -> Option<String> {
        join_folder_path(self.folder_name.as_deref(), self.record_identity())
    }

    pub fn timeout(&self) -> Duration {
        if self.timeout_secs == 0 {
            Duration::from_secs(DEFAULT_TIMEOUT_SECS)
        } else {
            Duration::from_secs(self.timeout_secs)
        }
    }

    /// 构造远程调用所需的端点集合；下载端点可以缺省（查看时回退到直链）。
    pub fn flow_endpoints(&self) -> TransferResult<FlowEndpoints> {
        let upload = required_url("upload", &self.upload_flow_url)?;
        let list = required_url("list", &self.list_flow_url)?;
        let delete = required_url("delete", &self.delete_flow_url)?;
        let download = optional_url("download", &self.download_flow_url)?;

        let container_path = self.container_path.trim();
        if container_path.is_empty() {
            return Err(TransferError::ConfigurationMissing(
                "container path is required".to_string(),
            ));
        }
        if let Some(raw) = self.record_id.as_deref() {
            if raw.trim().is_empty() {
                return Err(TransferError::ConfigurationMissing(
                    "record identity is bound but empty".to_string(),
                ));
            }
        }

        Ok(FlowEndpoints {
            upload,
            list,
            delete,
            download,
            container_path: container_path.to_string(),
            folder_path: self.folder_path(),
            timeout: self.timeout(),
        })
    }

    /// 四个端点、容器以及（若绑定）记录标识都齐备时才启用远程模式。
    pub fn is_cloud_flow_configured(&self) -> bool {
        matches!(self.flow_endpoints(), Ok(endpoints) if endpoints.download.is_some())
    }

    pub fn display_options(&self) -> TransferResult<DisplayOptions> {
        Ok(DisplayOptions {
            appearance: parse_option(self.appearance.as_ref(), "appearance")?,
            shape: parse_option(self.shape.as_ref(), "shape")?,
            size: parse_option(self.size.as_ref(), "size")?,
        })
    }
}

/// 已校验的远程端点集合。
#[derive(Clone, Debug, PartialEq)]
pub struct FlowEndpoints {
    pub upload: Url,
    pub list: Url,
    pub delete: Url,
    pub download: Option<Url>,
    pub container_path: String,
    pub folder_path: Option<String>,
    pub timeout: Duration,
}

fn required_url(label: &str, raw: &str) -> TransferResult<Url> {
    optional_url(label, raw)?.ok_or_else(|| {
        TransferError::ConfigurationMissing(format!("{label} endpoint url is required"))
    })
}

fn optional_url(label: &str, raw: &str) -> TransferResult<Option<Url>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    Url::parse(trimmed)
        .map(Some)
        .map_err(|e| TransferError::ConfigurationMissing(format!("{label} endpoint url: {e}")))
}

pub(crate) fn join_folder_path(folder: Option<&str>, record: Option<&str>) -> Option<String> {
    let parts: Vec<&str> = [folder, record]
        .into_iter()
        .flatten()
        .map(|part| part.trim().trim_matches('/'))
        .filter(|part| !part.is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// 生效中的上传策略。
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Policy {
    /// 0 表示不限制。
    pub max_total_size_bytes: u64,
    /// 已归一化（小写、去空、去通配）的类型模式；为空表示全部允许。
    pub allowed_type_patterns: Vec<String>,
}

impl Policy {
    pub fn from_megabytes(max_mb: f64, allowed_types: &str) -> Self {
        Self {
            max_total_size_bytes: megabytes_to_bytes(max_mb),
            allowed_type_patterns: parse_allowed_types(allowed_types),
        }
    }

    pub fn max_total_size_mb(&self) -> f64 {
        self.max_total_size_bytes as f64 / BYTES_PER_MB as f64
    }

    /// 持久化与对外展示用的分号分隔形式。
    pub fn allowed_types_string(&self) -> String {
        self.allowed_type_patterns.join(";")
    }
}

fn megabytes_to_bytes(mb: f64) -> u64 {
    if !mb.is_finite() || mb <= 0.0 {
        return 0;
    }
    (mb * BYTES_PER_MB as f64).round() as u64
}

/// 宿主传入的枚举原始值：可能是序号，也可能是名称。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawOption {
    Index(i64),
    Name(String),
}

/// 展示层可接受取值的统一映射。`ALL` 的顺序即宿主使用的序号。
pub trait DisplayOption: Copy + Default + 'static {
    const ALL: &'static [Self];

    fn display_value(self) -> &'static str;

    fn from_raw(raw: &RawOption) -> Option<Self> {
        match raw {
            RawOption::Index(index) => usize::try_from(*index)
                .ok()
                .and_then(|i| Self::ALL.get(i).copied()),
            RawOption::Name(name) => {
                let name = name.trim();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|option| option.display_value().eq_ignore_ascii_case(name))
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ButtonAppearance {
    #[default]
    Primary,
    Secondary,
    Outline,
    Subtle,
    Transparent,
}

impl DisplayOption for ButtonAppearance {
    const ALL: &'static [Self] = &[
        Self::Primary,
        Self::Secondary,
        Self::Outline,
        Self::Subtle,
        Self::Transparent,
    ];

    fn display_value(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
            Self::Outline => "outline",
            Self::Subtle => "subtle",
            Self::Transparent => "transparent",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ButtonShape {
    #[default]
    Rounded,
    Circular,
    Square,
}

impl DisplayOption for ButtonShape {
    const ALL: &'static [Self] = &[Self::Rounded, Self::Circular, Self::Square];

    fn display_value(self) -> &'static str {
        match self {
            Self::Rounded => "rounded",
            Self::Circular => "circular",
            Self::Square => "square",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ControlSize {
    Small,
    #[default]
    Medium,
    Large,
}

impl DisplayOption for ControlSize {
    const ALL: &'static [Self] = &[Self::Small, Self::Medium, Self::Large];

    fn display_value(self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DisplayOptions {
    pub appearance: ButtonAppearance,
    pub shape: ButtonShape,
    pub size: ControlSize,
}

fn parse_option<T: DisplayOption>(raw: Option<&RawOption>, label: &str) -> TransferResult<T> {
    match raw {
        None => Ok(T::default()),
        Some(value) => T::from_raw(value).ok_or_else(|| {
            TransferError::InvalidConfiguration(format!("unsupported {label} value: {value:?}"))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> BoundConfig {
        BoundConfig {
            upload_flow_url: "https://flows.example.com/upload".into(),
            list_flow_url: "https://flows.example.com/list".into(),
            delete_flow_url: "https://flows.example.com/delete".into(),
            download_flow_url: "https://flows.example.com/download".into(),
            container_path: "attachments".into(),
            ..BoundConfig::default()
        }
    }

    #[test]
    fn all_endpoints_enable_cloud_flow() {
        assert!(configured().is_cloud_flow_configured());
    }

    #[test]
    fn missing_any_prerequisite_disables_cloud_flow() {
        let mut cfg = configured();
        cfg.delete_flow_url = "  ".into();
        assert!(!cfg.is_cloud_flow_configured());

        let mut cfg = configured();
        cfg.download_flow_url.clear();
        assert!(!cfg.is_cloud_flow_configured());
        assert!(cfg.flow_endpoints().is_ok());

        let mut cfg = configured();
        cfg.container_path.clear();
        assert!(matches!(
            cfg.flow_endpoints(),
            Err(TransferError::ConfigurationMissing(_))
        ));

        let mut cfg = configured();
        cfg.record_id = Some(" ".into());
        assert!(!cfg.is_cloud_flow_configured());

        assert!(!BoundConfig::default().is_cloud_flow_configured());
    }

    #[test]
    fn folder_path_joins_optional_parts() {
        assert_eq!(join_folder_path(None, None), None);
        assert_eq!(join_folder_path(Some("cases"), None).as_deref(), Some("cases"));
        assert_eq!(join_folder_path(None, Some("42")).as_deref(), Some("42"));
        assert_eq!(
            join_folder_path(Some("/cases/"), Some("42")).as_deref(),
            Some("cases/42")
        );
        assert_eq!(join_folder_path(Some(""), Some("42")).as_deref(), Some("42"));
    }

    #[test]
    fn parses_host_json() {
        let cfg = BoundConfig::from_json(
            r#"{"uploadFlowUrl":"https://a/u","maxTotalFileSizeMB":10,"allowedFileTypes":".pdf;.docx","recordId":"7","appearance":2,"shape":"square"}"#,
        )
        .unwrap();
        assert_eq!(cfg.upload_flow_url, "https://a/u");
        assert_eq!(cfg.record_identity(), Some("7"));
        assert_eq!(cfg.timeout_secs, DEFAULT_TIMEOUT_SECS);
        let policy = cfg.policy();
        assert_eq!(policy.max_total_size_bytes, 10 * BYTES_PER_MB);
        assert_eq!(policy.allowed_type_patterns, vec!["pdf", "docx"]);
        let display = cfg.display_options().unwrap();
        assert_eq!(display.appearance, ButtonAppearance::Outline);
        assert_eq!(display.shape, ButtonShape::Square);
        assert_eq!(display.size, ControlSize::Medium);
    }

    #[test]
    fn invalid_display_value_is_rejected() {
        let cfg = BoundConfig {
            size: Some(RawOption::Index(9)),
            ..BoundConfig::default()
        };
        assert!(matches!(
            cfg.display_options(),
            Err(TransferError::InvalidConfiguration(_))
        ));

        let cfg = BoundConfig {
            appearance: Some(RawOption::Name("sparkly".into())),
            ..BoundConfig::default()
        };
        assert!(cfg.display_options().is_err());
    }

    #[test]
    fn zero_or_negative_limit_means_unlimited() {
        assert_eq!(Policy::from_megabytes(0.0, "").max_total_size_bytes, 0);
        assert_eq!(Policy::from_megabytes(-3.0, "").max_total_size_bytes, 0);
        assert_eq!(Policy::from_megabytes(0.5, "").max_total_size_bytes, 524_288);
    }
}
