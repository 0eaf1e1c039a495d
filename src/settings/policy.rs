//! 管理员策略覆盖：绑定配置与本地持久化覆盖的合并。
//!
//! - 启动时若持久化的覆盖可解析且两个字段齐全，则覆盖生效；否则使用绑定配置。
//! - 只有生效策略与绑定配置不同时才报告为已覆盖。
//! - 绑定配置在外部发生变化时总是胜出，并写回作为新的覆盖基线。
//! - 每次修改都会立即持久化。

use super::SettingsStore;
use crate::config::Policy;
use crate::error::TransferResult;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

pub const POLICY_OVERRIDE_KEY: &str = "file_upload_admin_config";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PolicyRecord {
    #[serde(rename = "maxTotalFileSizeMB")]
    max_total_file_size_mb: Option<f64>,
    allowed_file_types: Option<String>,
}

impl PolicyRecord {
    fn from_policy(policy: &Policy) -> Self {
        Self {
            max_total_file_size_mb: Some(policy.max_total_size_mb()),
            allowed_file_types: Some(policy.allowed_types_string()),
        }
    }

    /// 两个字段都存在才视为结构有效。
    fn into_policy(self) -> Option<Policy> {
        match (self.max_total_file_size_mb, self.allowed_file_types) {
            (Some(mb), Some(types)) => Some(Policy::from_megabytes(mb, &types)),
            _ => None,
        }
    }
}

pub struct PolicyResolver {
    store: Arc<dyn SettingsStore>,
    bound: Policy,
    active: Policy,
    overridden: bool,
}

impl PolicyResolver {
    pub fn load(store: Arc<dyn SettingsStore>, bound: Policy) -> Self {
        let persisted = match store.get(POLICY_OVERRIDE_KEY) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "failed to read policy override; using bound policy");
                None
            }
        };
        let override_policy = persisted.and_then(|raw| {
            match serde_json::from_str::<PolicyRecord>(&raw) {
                Ok(record) => record.into_policy(),
                Err(err) => {
                    warn!(error = %err, "ignoring unparsable policy override");
                    None
                }
            }
        });

        match override_policy {
            Some(policy) => {
                debug!(?policy, "policy override loaded");
                let overridden = policy != bound;
                Self {
                    store,
                    bound,
                    active: policy,
                    overridden,
                }
            }
            None => Self {
                store,
                active: bound.clone(),
                bound,
                overridden: false,
            },
        }
    }

    pub fn active(&self) -> &Policy {
        &self.active
    }

    /// 生效策略是否与绑定配置不同。
    ///
    /// 写回的基线与绑定配置相同，不算覆盖，重启前后结果一致。
    pub fn is_overridden(&self) -> bool {
        self.overridden
    }

    pub fn on_bound_changed(&mut self, bound: Policy) -> TransferResult<()> {
        self.active = bound.clone();
        self.bound = bound;
        self.overridden = false;
        self.persist()
    }

    pub fn set_override(&mut self, policy: Policy) -> TransferResult<()> {
        self.overridden = policy != self.bound;
        self.active = policy;
        self.persist()
    }

    pub fn set_max_total_size_mb(&mut self, max_mb: f64) -> TransferResult<()> {
        let policy = Policy::from_megabytes(max_mb, &self.active.allowed_types_string());
        self.set_override(policy)
    }

    pub fn set_allowed_types(&mut self, raw: &str) -> TransferResult<()> {
        let policy = Policy::from_megabytes(self.active.max_total_size_mb(), raw);
        self.set_override(policy)
    }

    fn persist(&self) -> TransferResult<()> {
        let record = PolicyRecord::from_policy(&self.active);
        let value = serde_json::to_string(&record)
            .map_err(|e| crate::error::TransferError::Storage(e.to_string()))?;
        self.store
            .set(POLICY_OVERRIDE_KEY, &value)
            .inspect_err(|err| warn!(error = %err, "failed to persist policy override"))
    }
}
