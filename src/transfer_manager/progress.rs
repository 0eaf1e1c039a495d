//! 合成进度：flow 不回报真实进度，只能在请求未返回期间按固定间隔随机推进。
//!
//! 每个上传中的文件对应一个独立任务，句柄按文件名保存，结果一到立即取消；
//! 整体销毁时统一取消全部任务。

use super::{recover_lock, state::FileStateStore};
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::trace;
use uuid::Uuid;

/// 合成进度的上限，真实结果到达前不会超过该值。
pub const PROGRESS_CAP: u8 = 90;
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(500);
const MIN_INCREMENT: u8 = 5;
const MAX_INCREMENT: u8 = 15;

struct ProgressTask {
    generation: Uuid,
    handle: JoinHandle<()>,
}

pub struct ProgressEstimator {
    state: Arc<Mutex<FileStateStore>>,
    tasks: Arc<Mutex<HashMap<String, ProgressTask>>>,
    disposed: Arc<AtomicBool>,
    interval: Duration,
}

impl ProgressEstimator {
    pub fn new(state: Arc<Mutex<FileStateStore>>, interval: Duration) -> Self {
        Self {
            state,
            tasks: Arc::new(Mutex::new(HashMap::new())),
            disposed: Arc::new(AtomicBool::new(false)),
            interval,
        }
    }

    /// 为文件启动进度任务；同名旧任务会先被取消。必须在 tokio 运行时中调用。
    pub fn start(&self, name: &str) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        let generation = Uuid::new_v4();
        let handle = tokio::spawn(tick_loop(
            name.to_string(),
            generation,
            self.interval,
            Arc::clone(&self.state),
            Arc::clone(&self.tasks),
            Arc::clone(&self.disposed),
        ));

        let mut tasks = recover_lock(&self.tasks);
        if let Some(previous) = tasks.insert(name.to_string(), ProgressTask { generation, handle })
        {
            previous.handle.abort();
        }
    }

    /// 真实结果已知，停止该文件的进度任务。
    pub fn finish(&self, name: &str) {
        let mut tasks = recover_lock(&self.tasks);
        if let Some(task) = tasks.remove(name) {
            task.handle.abort();
        }
    }

    /// 取消全部任务，之后的 start 与残留 tick 都是空操作。
    pub fn shutdown(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        let mut tasks = recover_lock(&self.tasks);
        for (_, task) in tasks.drain() {
            task.handle.abort();
        }
    }

    pub fn active_count(&self) -> usize {
        recover_lock(&self.tasks).len()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl Drop for ProgressEstimator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn tick_loop(
    name: String,
    generation: Uuid,
    interval: Duration,
    state: Arc<Mutex<FileStateStore>>,
    tasks: Arc<Mutex<HashMap<String, ProgressTask>>>,
    disposed: Arc<AtomicBool>,
) {
    loop {
        tokio::time::sleep(interval).await;
        if disposed.load(Ordering::SeqCst) {
            break;
        }
        let current = recover_lock(&tasks)
            .get(&name)
            .map(|task| task.generation == generation)
            .unwrap_or(false);
        if !current {
            break;
        }

        let increment = rand::thread_rng().gen_range(MIN_INCREMENT..=MAX_INCREMENT);
        let still_uploading = recover_lock(&state).bump_progress(&name, increment, PROGRESS_CAP);
        if !still_uploading {
            trace!(file = %name, "progress tick after terminal state; stopping");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Policy;
    use crate::transfer_manager::state::{FileStatus, FileUpdate, LocalFile};

    fn uploading_store(name: &str) -> Arc<Mutex<FileStateStore>> {
        let mut store = FileStateStore::new();
        store.add_files(vec![LocalFile::from_bytes(name, vec![1, 2, 3])], &Policy::default());
        store.update_status(name, FileUpdate::status(FileStatus::Uploading));
        Arc::new(Mutex::new(store))
    }

    fn progress_of(state: &Arc<Mutex<FileStateStore>>, name: &str) -> u8 {
        recover_lock(state).get(name).unwrap().progress
    }

    #[tokio::test(start_paused = true)]
    async fn progress_rises_but_stays_below_cap() {
        let state = uploading_store("a.pdf");
        let estimator = ProgressEstimator::new(state.clone(), Duration::from_millis(100));
        estimator.start("a.pdf");

        let mut last = 0;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let now = progress_of(&state, "a.pdf");
            assert!(now >= last);
            assert!(now < 95);
            last = now;
        }
        assert_eq!(last, PROGRESS_CAP);
        estimator.finish("a.pdf");
        assert_eq!(estimator.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn finished_file_is_not_touched_again() {
        let state = uploading_store("a.pdf");
        let estimator = ProgressEstimator::new(state.clone(), Duration::from_millis(100));
        estimator.start("a.pdf");
        tokio::time::sleep(Duration::from_millis(350)).await;

        estimator.finish("a.pdf");
        recover_lock(&state).update_status(
            "a.pdf",
            FileUpdate::status(FileStatus::Completed).progress(100),
        );
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(progress_of(&state, "a.pdf"), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_state_stops_stray_tick() {
        let state = uploading_store("a.pdf");
        let estimator = ProgressEstimator::new(state.clone(), Duration::from_millis(100));
        estimator.start("a.pdf");

        // 不调用 finish，仅把文件置为失败：tick 必须是空操作。
        recover_lock(&state).update_status(
            "a.pdf",
            FileUpdate::status(FileStatus::Failed).progress(0),
        );
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(progress_of(&state, "a.pdf"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_everything() {
        let state = uploading_store("a.pdf");
        let estimator = ProgressEstimator::new(state.clone(), Duration::from_millis(100));
        estimator.start("a.pdf");
        estimator.shutdown();
        assert_eq!(estimator.active_count(), 0);
        assert!(estimator.is_disposed());

        estimator.start("a.pdf");
        assert_eq!(estimator.active_count(), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(progress_of(&state, "a.pdf"), 0);
    }
}
