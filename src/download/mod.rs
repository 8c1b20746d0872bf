//! 下载流程模块入口。
//!
//! 子模块：
//! - `progress`：章节与图片进度条
//! - `assets`：封面/插图下载
//! - `downloader`：整卷下载主流程编排

pub mod assets;
pub mod downloader;
pub mod progress;

pub use downloader::{VolumeReport, download_volume, download_volume_with};
pub use progress::VolumeProgress;
