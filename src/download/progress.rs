//! CLI 进度条：章节计数条与图片字节条。

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::debug;

use crate::harvest::StatusSink;

pub struct VolumeProgress {
    mp: MultiProgress,
}

impl VolumeProgress {
    /// `visible` 为 false 时所有进度条都不绘制（测试、非终端输出）。
    pub fn new(visible: bool) -> Self {
        let target = if visible {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        };
        Self {
            mp: MultiProgress::with_draw_target(target),
        }
    }

    pub fn hidden() -> Self {
        Self::new(false)
    }

    pub fn chapter_bar(&self, total: usize) -> ChapterBar {
        let style = ProgressStyle::with_template(
            "{prefix} [{elapsed_precise}] {wide_bar} {pos}/{len} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");
        let bar = self.mp.add(ProgressBar::new(total as u64));
        bar.set_style(style);
        bar.set_prefix("章节下载");
        ChapterBar { bar }
    }

    /// 单个图片的字节进度条；总大小稍后由 `set_length` 补上。
    pub fn asset_bar(&self, file_name: &str) -> ProgressBar {
        let style = ProgressStyle::with_template(
            "{prefix} {bar:30} {bytes}/{total_bytes} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");
        let bar = self.mp.add(ProgressBar::new(0));
        bar.set_style(style);
        bar.set_prefix("图片下载");
        bar.set_message(file_name.to_string());
        bar
    }
}

/// 把章节完成消息接到进度条上。
pub struct ChapterBar {
    bar: ProgressBar,
}

impl ChapterBar {
    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl StatusSink for ChapterBar {
    fn report(&self, message: &str) {
        debug!(target: "harvest", "{message}");
        self.bar.set_message(message.to_string());
        self.bar.inc(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn chapter_bar_counts_reports_from_many_threads() {
        let progress = VolumeProgress::hidden();
        let bar = progress.chapter_bar(40);
        thread::scope(|s| {
            for t in 0..4 {
                let bar = &bar;
                s.spawn(move || {
                    for i in 0..10 {
                        bar.report(&format!("已下载：{t}-{i}"));
                    }
                });
            }
        });
        assert_eq!(bar.position(), 40);
        bar.finish();
    }
}
