//! 卷信息清单：书名、作者、简介、封面与章节地址列表。

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::harvest::ChapterLocation;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeManifest {
    pub volume_name: String,
    #[serde(default)]
    pub volume_number: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub illustrator: String,
    #[serde(default)]
    pub introduction: String,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub chapters: Vec<String>,
}

impl VolumeManifest {
    /// 按扩展名读取清单：`.json` 走 JSON，其余按 YAML 解析。
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read manifest {}", path.display()))?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let parsed = if is_json {
            Self::parse_json(&raw)
        } else {
            Self::parse(&raw)
        };
        parsed.with_context(|| format!("parse manifest {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        serde_yaml::from_str::<VolumeManifest>(raw)?.validated()
    }

    pub fn parse_json(raw: &str) -> Result<Self> {
        serde_json::from_str::<VolumeManifest>(raw)?.validated()
    }

    fn validated(self) -> Result<Self> {
        if self.volume_name.trim().is_empty() {
            return Err(anyhow!("volume_name 不能为空"));
        }
        Ok(self)
    }

    /// `卷名 卷号`，卷号为空时只返回卷名。
    pub fn book_name(&self) -> String {
        format!("{} {}", self.volume_name.trim(), self.volume_number.trim())
            .trim()
            .to_string()
    }

    pub fn locations(&self) -> Vec<ChapterLocation> {
        ChapterLocation::enumerate(
            self.chapters
                .iter()
                .map(|c| c.trim())
                .filter(|c| !c.is_empty())
                .map(str::to_string),
        )
    }
}
