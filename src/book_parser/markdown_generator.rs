//! 卷的 Markdown 输出（pandoc 标题块格式）。

use std::collections::HashMap;
use std::fmt::Write as _;
use std::io;
use std::path::{Path, PathBuf};

use super::manifest::VolumeManifest;
use crate::base_system::context::safe_fs_name;
use crate::harvest::{ContentUnit, HarvestResult};
use crate::media::{FileSink, WritableSink};

/// 插图相对于 Markdown 文件的存放目录。
pub const IMAGES_DIR: &str = "images";

/// 渲染整卷。
///
/// `asset_files` 记录已下载图片：引用 → 本地文件名。未下载的插图保留原始地址。
/// 抓取失败的章节在原位置留下一行 HTML 注释。
pub fn render_markdown(
    manifest: &VolumeManifest,
    result: &HarvestResult,
    asset_files: &HashMap<String, String>,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "% {}", manifest.book_name());
    let _ = writeln!(out, "% {}", manifest.author.trim());
    if !manifest.illustrator.trim().is_empty() {
        let _ = writeln!(out, "<!-- 插画：{} -->", manifest.illustrator.trim());
    }
    out.push('\n');

    if let Some(cover) = manifest.cover_url.as_deref() {
        let _ = writeln!(out, "![cover]({})\n", image_target(cover, asset_files));
    }
    if !manifest.introduction.trim().is_empty() {
        let _ = writeln!(out, "{}\n", manifest.introduction.trim());
    }

    let failures: HashMap<_, _> = result
        .failures
        .iter()
        .map(|f| (f.ordinal, &f.error))
        .collect();
    let mut ordinals: Vec<_> = result
        .successes
        .keys()
        .copied()
        .chain(failures.keys().copied())
        .collect();
    ordinals.sort_unstable();

    for ordinal in ordinals {
        if let Some(error) = failures.get(&ordinal) {
            let _ = writeln!(out, "<!-- 第 {} 章下载失败：{} -->\n", ordinal + 1, error);
            continue;
        }
        let Some(chapter) = result.successes.get(&ordinal) else {
            continue;
        };
        let _ = writeln!(out, "# {}\n", chapter.name());
        for unit in chapter.units() {
            match unit {
                ContentUnit::Text(line) => {
                    let _ = writeln!(out, "{line}\n");
                }
                ContentUnit::AssetRef(reference) => {
                    let _ = writeln!(
                        out,
                        "![illustration]({})\n",
                        image_target(reference, asset_files)
                    );
                }
            }
        }
    }
    out
}

fn image_target(reference: &str, asset_files: &HashMap<String, String>) -> String {
    match asset_files.get(reference.trim()) {
        Some(file) => format!("{IMAGES_DIR}/{file}"),
        None => reference.trim().to_string(),
    }
}

/// `{dir}/{书名}.md`
pub fn output_path(dir: &Path, manifest: &VolumeManifest) -> PathBuf {
    dir.join(format!("{}.md", safe_fs_name(&manifest.book_name(), "_", 120)))
}

/// 先写 `.mdpart`，再整体替换目标文件。
pub fn write_markdown(path: &Path, text: &str) -> io::Result<()> {
    let mut sink = FileSink::new(path);
    let written = sink
        .write_segment(text.as_bytes())
        .and_then(|()| sink.close());
    if written.is_err() {
        let _ = sink.discard();
    }
    written
}
