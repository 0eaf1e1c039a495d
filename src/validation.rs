//! 文件准入校验：类型白名单 + 累计大小上限。纯函数，不产生副作用。

use crate::config::{Policy, BYTES_PER_MB};
use crate::error::{TransferError, TransferResult};

/// 待校验文件的最小描述。
#[derive(Clone, Copy, Debug)]
pub struct FileCandidate<'a> {
    pub name: &'a str,
    pub size: u64,
    pub mime_type: &'a str,
}

/// 校验结果；拒绝是正常结果，不是错误。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub is_valid: bool,
    pub error: Option<String>,
}

impl ValidationOutcome {
    pub fn accepted() -> Self {
        Self {
            is_valid: true,
            error: None,
        }
    }

    pub fn rejected(reason: String) -> Self {
        Self {
            is_valid: false,
            error: Some(reason),
        }
    }

    pub fn into_result(self) -> TransferResult<()> {
        match (self.is_valid, self.error) {
            (true, _) => Ok(()),
            (false, reason) => Err(TransferError::ValidationRejected(
                reason.unwrap_or_else(|| "file rejected".to_string()),
            )),
        }
    }
}

/// 校验单个文件。
///
/// `running_total` 为候选文件之前已占用的字节数：有效且未失败的待上传文件、
/// 远程已有文件以及本批次中先前已接受的文件之和。
pub fn validate_file(
    candidate: &FileCandidate<'_>,
    running_total: u64,
    policy: &Policy,
) -> ValidationOutcome {
    if !is_type_allowed(
        candidate.name,
        candidate.mime_type,
        &policy.allowed_type_patterns,
    ) {
        return ValidationOutcome::rejected(format!(
            "File type not allowed for \"{}\". Allowed types: {}",
            candidate.name,
            describe_patterns(&policy.allowed_type_patterns)
        ));
    }

    let limit = policy.max_total_size_bytes;
    if limit > 0 {
        let total = running_total.saturating_add(candidate.size);
        if total > limit {
            return ValidationOutcome::rejected(format!(
                "File \"{}\" ({}) would exceed the maximum total size of {} ({} already selected)",
                candidate.name,
                format_megabytes(candidate.size),
                format_megabytes(limit),
                format_megabytes(running_total)
            ));
        }
    }

    ValidationOutcome::accepted()
}

/// 拆分白名单字符串：支持 `;` 与 `,`，统一小写，去掉空项与通配符。
/// 扩展名会去掉前导 `.`（以及 `*.`），MIME 模式原样保留。
pub fn parse_allowed_types(raw: &str) -> Vec<String> {
    raw.split([';', ','])
        .map(|part| part.trim().to_lowercase())
        .filter(|part| !part.is_empty() && !is_bare_wildcard(part))
        .map(|part| {
            if part.contains('/') {
                part
            } else {
                part.trim_start_matches('*')
                    .trim_start_matches('.')
                    .to_string()
            }
        })
        .filter(|part| !part.is_empty())
        .collect()
}

fn is_bare_wildcard(pattern: &str) -> bool {
    matches!(pattern, "*" | "*.*" | ".*" | "*/*")
}

pub fn is_type_allowed(name: &str, mime_type: &str, patterns: &[String]) -> bool {
    if patterns.is_empty() {
        return true;
    }
    let extension = file_extension(name);
    let mime = mime_type.trim().to_lowercase();

    patterns.iter().any(|pattern| {
        if pattern.contains('/') {
            match pattern.strip_suffix('*') {
                Some(prefix) => !prefix.is_empty() && mime.starts_with(prefix),
                None => mime == *pattern,
            }
        } else {
            extension.as_deref() == Some(pattern.as_str())
        }
    })
}

/// 最后一个 `.` 之后的小写后缀；没有 `.` 时返回 None。
pub fn file_extension(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_lowercase())
    }
}

pub fn format_megabytes(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / BYTES_PER_MB as f64)
}

fn describe_patterns(patterns: &[String]) -> String {
    patterns
        .iter()
        .map(|p| {
            if p.contains('/') {
                p.clone()
            } else {
                format!(".{p}")
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// 根据扩展名推断 MIME 类型，未知类型回退为 octet-stream。
pub fn detect_content_type(name: &str) -> &'static str {
    match file_extension(name).as_deref() {
        Some("pdf") => "application/pdf",
        Some("doc") => "application/msword",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("xls") => "application/vnd.ms-excel",
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Some("ppt") => "application/vnd.ms-powerpoint",
        Some("pptx") => {
            "application/vnd.openxmlformats-officedocument.presentationml.presentation"
        }
        Some("txt") => "text/plain",
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("zip") => "application/zip",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("mp3") => "audio/mpeg",
        Some("mp4") => "video/mp4",
        _ => "application/octet-stream",
    }
}
