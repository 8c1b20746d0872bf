//! 全局配置结构（Config）与默认值。
//!
//! 该模块同时提供生成 `config.yml` 的字段元信息。

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::config::{ConfigSpec, FieldMeta};
use crate::harvest::{HarvestMode, HarvestOptions};
use crate::media::{DEFAULT_SEGMENT_SIZE, DownloadError, SegmentDownloader};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // 抓取配置
    #[serde(default = "default_harvest_mode")]
    pub harvest_mode: String,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_false")]
    pub require_chapters: bool,

    // 网络配置
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    // 媒体配置
    #[serde(default = "default_true")]
    pub download_assets: bool,
    #[serde(default = "default_segment_size")]
    pub segment_size: usize,
    #[serde(default = "default_false")]
    pub cleanup_partial_downloads: bool,
    #[serde(default = "default_asset_base_url")]
    pub asset_base_url: String,
    #[serde(default = "default_illustration_prefix")]
    pub illustration_prefix: String,

    // 路径配置
    #[serde(default)]
    pub save_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            harvest_mode: default_harvest_mode(),
            max_workers: default_max_workers(),
            require_chapters: default_false(),
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
            download_assets: default_true(),
            segment_size: default_segment_size(),
            cleanup_partial_downloads: default_false(),
            asset_base_url: default_asset_base_url(),
            illustration_prefix: default_illustration_prefix(),
            save_path: String::new(),
        }
    }
}

impl ConfigSpec for Config {
    const FILE_NAME: &'static str = "config.yml";

    fn fields() -> &'static [FieldMeta] {
        static FIELDS: [FieldMeta; 11] = [
            FieldMeta {
                name: "harvest_mode",
                description: "章节抓取模式：concurrent（并发）/ sequential（逐章）",
            },
            FieldMeta {
                name: "max_workers",
                description: "并发抓取线程上限（0 表示每章一个线程）",
            },
            FieldMeta {
                name: "require_chapters",
                description: "章节列表为空时是否视为错误",
            },
            FieldMeta {
                name: "request_timeout",
                description: "请求超时时间（秒）",
            },
            FieldMeta {
                name: "user_agent",
                description: "请求使用的 User-Agent",
            },
            FieldMeta {
                name: "download_assets",
                description: "是否下载封面与插图",
            },
            FieldMeta {
                name: "segment_size",
                description: "分段下载的分段大小（字节）",
            },
            FieldMeta {
                name: "cleanup_partial_downloads",
                description: "下载失败时是否删除未完成的文件",
            },
            FieldMeta {
                name: "asset_base_url",
                description: "站内相对路径插图的地址前缀",
            },
            FieldMeta {
                name: "illustration_prefix",
                description: "正文中以此开头的行视为插图引用",
            },
            FieldMeta {
                name: "save_path",
                description: "保存路径（留空为当前目录）",
            },
        ];
        &FIELDS
    }

    fn validate(&self) -> Result<(), String> {
        if HarvestMode::parse(&self.harvest_mode).is_none() {
            return Err(format!(
                "harvest_mode 必须是 concurrent 或 sequential，当前为 {}",
                self.harvest_mode
            ));
        }
        if self.segment_size == 0 {
            return Err("segment_size 必须大于 0".to_string());
        }
        Ok(())
    }
}

impl Config {
    pub fn default_save_dir(&self) -> PathBuf {
        if self.save_path.trim().is_empty() {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        } else {
            PathBuf::from(&self.save_path)
        }
    }

    pub fn images_dir(&self) -> PathBuf {
        self.default_save_dir().join("images")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout.max(1))
    }

    pub fn harvest_options(&self) -> HarvestOptions {
        HarvestOptions {
            mode: HarvestMode::parse(&self.harvest_mode).unwrap_or_default(),
            max_workers: self.max_workers,
            require_chapters: self.require_chapters,
        }
    }

    pub fn segment_downloader(&self) -> Result<SegmentDownloader, DownloadError> {
        Ok(SegmentDownloader::new(self.segment_size)?.cleanup_partial(self.cleanup_partial_downloads))
    }
}

/// 清理文件名中的非法字符，并限制字节长度。
pub fn safe_fs_name(name: &str, replacement: &str, max_len: usize) -> String {
    let fallback = replacement.chars().next().unwrap_or('_');
    let mut cleaned: String = name
        .trim()
        .chars()
        .map(|ch| match ch {
            ':' => '：',
            '<' => '《',
            '>' => '》',
            '/' | '\\' => '、',
            '|' => '｜',
            '?' => '？',
            '*' => '＊',
            '"' => '“',
            c if (c as u32) < 32 => fallback,
            _ => ch,
        })
        .collect();

    const RESERVED: [&str; 22] = [
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    if RESERVED.contains(&cleaned.trim_end_matches([' ', '.']).to_uppercase().as_str()) {
        cleaned.insert(0, '_');
    }

    if cleaned.len() > max_len {
        // 不能在多字节字符中间截断
        let mut end = max_len;
        while end > 0 && !cleaned.is_char_boundary(end) {
            end -= 1;
        }
        cleaned.truncate(end);
    }

    // 截断后末尾仍可能留下空格或点
    let kept = cleaned.trim_end_matches([' ', '.']).len();
    cleaned.truncate(kept);
    if cleaned.is_empty() {
        cleaned.push_str("unnamed");
    }
    cleaned
}

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}

fn default_harvest_mode() -> String {
    "concurrent".to_string()
}

fn default_max_workers() -> usize {
    8
}

fn default_request_timeout() -> u64 {
    15
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120 Safari/537.36".to_string()
}

fn default_segment_size() -> usize {
    DEFAULT_SEGMENT_SIZE
}

fn default_asset_base_url() -> String {
    "http://lknovel.lightnovel.cn".to_string()
}

fn default_illustration_prefix() -> String {
    "/illustration/".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_fs_name_replaces_forbidden_chars() {
        assert_eq!(safe_fs_name("a/b:c?", "_", 120), "a、b：c？");
        assert_eq!(safe_fs_name("  dots...  ", "_", 120), "dots");
        assert_eq!(safe_fs_name("", "_", 120), "unnamed");
        assert_eq!(safe_fs_name("con", "_", 120), "_con");
        assert_eq!(safe_fs_name("tab\there", "_", 120), "tab_here");
    }

    #[test]
    fn safe_fs_name_truncates_on_char_boundary() {
        // 每个汉字 3 字节
        let out = safe_fs_name("文学少女", "_", 7);
        assert_eq!(out, "文学");
    }

    #[test]
    fn safe_fs_name_strips_after_truncation() {
        assert_eq!(safe_fs_name("ab. c", "_", 3), "ab");
        assert_eq!(safe_fs_name("x ....y", "_", 5), "x");
        assert_eq!(safe_fs_name("...", "_", 120), "unnamed");
        assert_eq!(safe_fs_name("nul.", "_", 120), "_nul");
    }

    #[test]
    fn safe_fs_name_swaps_double_quote_for_fullwidth() {
        assert_eq!(safe_fs_name("他说\"好\"", "_", 120), "他说“好“");
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut cfg = Config::default();
        assert!(cfg.validate().is_ok());
        cfg.harvest_mode = "turbo".into();
        assert!(cfg.validate().is_err());
        cfg.harvest_mode = "sequential".into();
        cfg.segment_size = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn harvest_options_follow_config() {
        let cfg = Config {
            harvest_mode: "sequential".into(),
            max_workers: 3,
            require_chapters: true,
            ..Config::default()
        };
        let opts = cfg.harvest_options();
        assert_eq!(opts.mode, HarvestMode::Sequential);
        assert_eq!(opts.max_workers, 3);
        assert!(opts.require_chapters);
    }
}
