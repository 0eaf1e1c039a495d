//! 附件传输：本地状态表、合成进度、批次累积与对外事件，由 `TransferManager` 统一编排。

pub mod batch;
pub mod core;
pub mod events;
pub mod progress;
pub mod state;

pub use self::core::{TransferManager, TransferSnapshot, ViewOutcome};
pub use batch::{CumulativeBatch, FileDescriptor};
pub use events::{OutputEvent, OutputPayload, UploadStatus};
pub use progress::{ProgressEstimator, DEFAULT_TICK_INTERVAL, PROGRESS_CAP};
pub use state::{FileSource, FileStateStore, FileStatus, FileUpdate, LocalFile, PendingFile};

use std::sync::{Mutex, MutexGuard};

/// 锁中毒时继续使用内部数据，状态表的每次修改都是完整的单步操作。
pub(crate) fn recover_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poison) => poison.into_inner(),
    }
}
