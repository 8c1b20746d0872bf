//! 整卷下载主流程：抓取章节 → 下载图片 → 写出 Markdown。

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use super::assets::download_assets;
use super::progress::VolumeProgress;
use crate::base_system::context::Config;
use crate::book_parser::assets::plan_assets;
use crate::book_parser::manifest::VolumeManifest;
use crate::book_parser::markdown_generator::{output_path, render_markdown, write_markdown};
use crate::book_parser::page_fetcher::PageFetcher;
use crate::harvest::{ChapterFailure, ChapterFetcher, StatusSink, harvest};

#[derive(Debug, Default)]
pub struct VolumeReport {
    pub output: PathBuf,
    pub chapters_ok: usize,
    pub failures: Vec<ChapterFailure>,
    pub assets_ok: usize,
    pub assets_failed: usize,
}

impl VolumeReport {
    /// 有章节但一章都没有成功。
    pub fn all_failed(&self) -> bool {
        self.chapters_ok == 0 && !self.failures.is_empty()
    }
}

pub fn download_volume(
    config: &Config,
    manifest: &VolumeManifest,
    progress: &VolumeProgress,
) -> Result<VolumeReport> {
    let fetcher = PageFetcher::new(config).context("build page fetcher")?;
    download_volume_with(config, manifest, &fetcher, progress)
}

pub fn download_volume_with(
    config: &Config,
    manifest: &VolumeManifest,
    fetcher: &dyn ChapterFetcher,
    progress: &VolumeProgress,
) -> Result<VolumeReport> {
    let book_name = manifest.book_name();
    let locations = manifest.locations();
    info!("开始下载：{} ({} 章)", book_name, locations.len());

    let bar = progress.chapter_bar(locations.len());
    let sink: &dyn StatusSink = &bar;
    let result = harvest(&locations, fetcher, config.harvest_options(), Some(sink))
        .with_context(|| format!("harvest {book_name}"))?;
    bar.finish();

    let save_dir = config.default_save_dir();
    let mut asset_files = HashMap::new();
    let mut assets_failed = 0;
    if config.download_assets {
        let references = manifest
            .cover_url
            .as_deref()
            .into_iter()
            .chain(result.chapters().flat_map(|c| c.asset_refs()));
        let jobs = plan_assets(references, &config.asset_base_url);
        let report = download_assets(config, &jobs, &config.images_dir(), progress)
            .context("download images")?;
        assets_failed = report.failed.len();
        asset_files = report.files;
    }

    let output = output_path(&save_dir, manifest);
    let text = render_markdown(manifest, &result, &asset_files);
    write_markdown(&output, &text).with_context(|| format!("write {}", output.display()))?;
    info!(target: "assemble", path = %output.display(), "已保存：{}", output.display());

    Ok(VolumeReport {
        output,
        chapters_ok: result.successes.len(),
        failures: result.failures,
        assets_ok: asset_files.len(),
        assets_failed,
    })
}
