//! 附件上传编排：准入校验、逐文件状态、远程 flow 调用、合成进度与对账。

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod settings;
pub mod transfer_manager;
pub mod validation;

pub use config::{BoundConfig, FlowEndpoints, Policy};
pub use error::{TransferError, TransferResult};
pub use logging::init_logging;
pub use transfer_manager::{
    LocalFile, OutputEvent, PendingFile, TransferManager, TransferSnapshot, UploadStatus,
    ViewOutcome,
};
