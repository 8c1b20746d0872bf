//! 单次下载的进度/状态记录。
//!
//! `DownloadSession` 只由持有它的下载流程修改；调用方通过 `SessionView` 只读轮询。

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum DownloadStatus {
    #[default]
    Idle,
    InProgress,
    Complete,
    Failed,
}

impl DownloadStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, DownloadStatus::Complete | DownloadStatus::Failed)
    }

    fn as_u8(self) -> u8 {
        match self {
            DownloadStatus::Idle => 0,
            DownloadStatus::InProgress => 1,
            DownloadStatus::Complete => 2,
            DownloadStatus::Failed => 3,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => DownloadStatus::InProgress,
            2 => DownloadStatus::Complete,
            3 => DownloadStatus::Failed,
            _ => DownloadStatus::Idle,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SessionSnapshot {
    pub total_bytes: Option<u64>,
    pub transferred_bytes: u64,
    pub status: DownloadStatus,
}

impl SessionSnapshot {
    /// 0.0 ~ 1.0；大小未知时返回 None。
    pub fn fraction(&self) -> Option<f64> {
        match self.total_bytes {
            Some(0) => Some(1.0),
            Some(total) => Some(self.transferred_bytes as f64 / total as f64),
            None => None,
        }
    }
}

#[derive(Debug, Default)]
struct SessionState {
    total: Mutex<Option<u64>>,
    transferred: AtomicU64,
    status: AtomicU8,
}

impl SessionState {
    fn snapshot(&self) -> SessionSnapshot {
        // 先读状态再读计数：看到 Complete 时计数一定已经是最终值。
        let status = DownloadStatus::from_u8(self.status.load(Ordering::Acquire));
        let transferred = self.transferred.load(Ordering::Acquire);
        let total = self.total.lock().map(|g| *g).unwrap_or(None);
        SessionSnapshot {
            total_bytes: total,
            transferred_bytes: transferred,
            status,
        }
    }
}

#[derive(Debug, Default)]
pub struct DownloadSession {
    state: Arc<SessionState>,
}

impl DownloadSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            state: Arc::clone(&self.state),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.snapshot()
    }

    fn status(&self) -> DownloadStatus {
        DownloadStatus::from_u8(self.state.status.load(Ordering::Acquire))
    }

    pub(super) fn set_total(&self, total: u64) {
        if self.status().is_terminal() {
            return;
        }
        if let Ok(mut guard) = self.state.total.lock() {
            *guard = Some(total);
        }
    }

    pub(super) fn begin(&self) {
        if self.status() == DownloadStatus::Idle {
            self.state.transferred.store(0, Ordering::Release);
            self.state
                .status
                .store(DownloadStatus::InProgress.as_u8(), Ordering::Release);
        }
    }

    pub(super) fn advance(&self, bytes: u64) {
        if self.status() != DownloadStatus::InProgress {
            return;
        }
        self.state.transferred.fetch_add(bytes, Ordering::AcqRel);
    }

    pub(super) fn complete(&self) {
        self.finish(DownloadStatus::Complete);
    }

    pub(super) fn fail(&self) {
        self.finish(DownloadStatus::Failed);
    }

    /// 下载线程异常退出时调用：未结束的会话直接记为失败。
    pub(super) fn abort(&self) {
        let _ = self
            .state
            .status
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                (!DownloadStatus::from_u8(v).is_terminal()).then_some(DownloadStatus::Failed.as_u8())
            });
    }

    fn finish(&self, terminal: DownloadStatus) {
        let _ = self.state.status.compare_exchange(
            DownloadStatus::InProgress.as_u8(),
            terminal.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

/// 下载会话的只读视图，可跨线程轮询。
#[derive(Debug, Clone)]
pub struct SessionView {
    state: Arc<SessionState>,
}

impl SessionView {
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.snapshot()
    }

    pub fn transferred_bytes(&self) -> u64 {
        self.state.transferred.load(Ordering::Acquire)
    }

    pub fn total_bytes(&self) -> Option<u64> {
        self.state.total.lock().map(|g| *g).unwrap_or(None)
    }

    pub fn status(&self) -> DownloadStatus {
        DownloadStatus::from_u8(self.state.status.load(Ordering::Acquire))
    }
}
