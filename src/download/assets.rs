//! 封面与插图下载到 `{save_dir}/images/`。单张失败不影响整卷。

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use std::thread;
use std::time::Duration;

use indicatif::ProgressBar;
use tracing::{debug, info, warn};

use super::progress::VolumeProgress;
use crate::base_system::context::Config;
use crate::book_parser::assets::AssetJob;
use crate::media::{DownloadError, DownloadHandle, FileSink, HttpResource};

const POLL_INTERVAL_MS: u64 = 50;

#[derive(Debug, Default)]
pub struct AssetReport {
    /// 引用 → `images/` 下的文件名
    pub files: HashMap<String, String>,
    pub failed: Vec<(String, DownloadError)>,
}

struct Running<'a> {
    job: &'a AssetJob,
    handle: DownloadHandle,
    bar: ProgressBar,
}

pub fn download_assets(
    config: &Config,
    jobs: &[AssetJob],
    images_dir: &Path,
    progress: &VolumeProgress,
) -> Result<AssetReport, DownloadError> {
    let downloader = config.segment_downloader()?;
    let mut report = AssetReport::default();
    if jobs.is_empty() {
        return Ok(report);
    }
    if let Err(source) = fs::create_dir_all(images_dir) {
        warn!(target: "media", dir = %images_dir.display(), "创建图片目录失败：{source}");
        for job in jobs {
            report.failed.push((
                job.reference.clone(),
                DownloadError::Transfer {
                    transferred: 0,
                    source: io::Error::new(source.kind(), source.to_string()),
                },
            ));
        }
        return Ok(report);
    }

    let batch = match config.max_workers {
        0 => jobs.len(),
        n => n,
    };
    info!(target: "media", count = jobs.len(), "开始下载图片");

    for chunk in jobs.chunks(batch) {
        let mut running = Vec::with_capacity(chunk.len());
        for job in chunk {
            let target = images_dir.join(&job.file_name);
            if fs::metadata(&target).map(|m| m.len() > 0).unwrap_or(false) {
                debug!(target: "media", file = %job.file_name, "图片已存在，跳过");
                report.files.insert(job.reference.clone(), job.file_name.clone());
                continue;
            }

            let resource =
                match HttpResource::new(&job.url, config.request_timeout(), &config.user_agent) {
                    Ok(r) => r,
                    Err(err) => {
                        warn!(target: "media", url = %job.url, "图片地址不可用：{err}");
                        report.failed.push((job.reference.clone(), err));
                        continue;
                    }
                };
            match downloader.start(Box::new(resource), Box::new(FileSink::new(target))) {
                Ok(handle) => running.push(Running {
                    job,
                    handle,
                    bar: progress.asset_bar(&job.file_name),
                }),
                Err(source) => report.failed.push((
                    job.reference.clone(),
                    DownloadError::Transfer {
                        transferred: 0,
                        source,
                    },
                )),
            }
        }

        poll_until_finished(&running);

        for Running { job, handle, bar } in running {
            match handle.join() {
                Ok(snapshot) => {
                    bar.finish_and_clear();
                    debug!(target: "media", file = %job.file_name, bytes = snapshot.transferred_bytes, "图片下载完成");
                    report.files.insert(job.reference.clone(), job.file_name.clone());
                }
                Err(err) => {
                    bar.abandon_with_message(format!("{} 失败", job.file_name));
                    warn!(target: "media", url = %job.url, "图片下载失败：{err}");
                    report.failed.push((job.reference.clone(), err));
                }
            }
        }
    }

    info!(
        target: "media",
        ok = report.files.len(),
        failed = report.failed.len(),
        "图片下载结束"
    );
    Ok(report)
}

fn poll_until_finished(running: &[Running<'_>]) {
    loop {
        let mut all_done = true;
        for item in running {
            let snap = item.handle.session().snapshot();
            if let Some(total) = snap.total_bytes {
                item.bar.set_length(total);
            }
            item.bar.set_position(snap.transferred_bytes);
            all_done &= item.handle.is_finished();
        }
        if all_done {
            return;
        }
        thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
    }
}
