//! 章节完成状态上报。
//!
//! 上报接口以参数形式传入协调器；并发模式下会被多个工作线程同时调用，实现方需自行保证线程安全。

use tracing::info;

use super::error::FetchError;
use super::models::{ChapterContent, ChapterLocation};

pub trait StatusSink: Send + Sync {
    fn report(&self, message: &str);
}

impl<F> StatusSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn report(&self, message: &str) {
        self(message)
    }
}

/// 直接写入日志的上报实现。
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl StatusSink for LogSink {
    fn report(&self, message: &str) {
        info!(target: "harvest", "{message}");
    }
}

pub(crate) fn success_message(content: &ChapterContent) -> String {
    format!("已下载：{}", content.name())
}

pub(crate) fn failure_message(location: &ChapterLocation, error: &FetchError) -> String {
    format!("下载失败：{}（{}）", location.address(), error)
}
