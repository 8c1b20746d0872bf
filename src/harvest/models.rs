//! 章节抓取相关的数据模型定义。
//!
//! 包含章节地址、章节内容、抓取模式以及抓取结果（成功表 + 失败列表）。

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::FetchError;

/// 章节在卷内的序号。只要求唯一且可排序，不要求连续。
pub type Ordinal = usize;

/// 一个待抓取的章节地址（通常是 URL）及其在卷内的原始位置。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChapterLocation {
    ordinal: Ordinal,
    address: String,
}

impl ChapterLocation {
    pub fn new(ordinal: Ordinal, address: impl Into<String>) -> Self {
        Self {
            ordinal,
            address: address.into(),
        }
    }

    pub fn ordinal(&self) -> Ordinal {
        self.ordinal
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// 按出现顺序为一组地址编号（0 起）。
    pub fn enumerate<I, S>(addresses: I) -> Vec<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        addresses
            .into_iter()
            .enumerate()
            .map(|(idx, addr)| Self::new(idx, addr))
            .collect()
    }
}

impl fmt::Display for ChapterLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.ordinal, self.address)
    }
}

/// 章节正文中的一个单元：文字段落或插图引用。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentUnit {
    Text(String),
    AssetRef(String),
}

impl ContentUnit {
    pub fn as_asset_ref(&self) -> Option<&str> {
        match self {
            ContentUnit::AssetRef(r) => Some(r.as_str()),
            ContentUnit::Text(_) => None,
        }
    }
}

/// 一章抓取成功后的内容。创建后不再修改。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterContent {
    ordinal: Ordinal,
    name: String,
    units: Vec<ContentUnit>,
}

impl ChapterContent {
    pub fn new(ordinal: Ordinal, name: impl Into<String>, units: Vec<ContentUnit>) -> Self {
        Self {
            ordinal,
            name: name.into(),
            units,
        }
    }

    pub fn ordinal(&self) -> Ordinal {
        self.ordinal
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn units(&self) -> &[ContentUnit] {
        &self.units
    }

    pub fn asset_refs(&self) -> impl Iterator<Item = &str> {
        self.units.iter().filter_map(ContentUnit::as_asset_ref)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HarvestMode {
    Sequential,
    #[default]
    Concurrent,
}

impl HarvestMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sequential" | "serial" => Some(Self::Sequential),
            "concurrent" | "parallel" => Some(Self::Concurrent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HarvestOptions {
    pub mode: HarvestMode,
    /// 并发模式下的工作线程上限；0 表示每章一个线程。
    pub max_workers: usize,
    /// 为 true 时，空的章节列表视为错误。
    pub require_chapters: bool,
}

/// 单章失败记录。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterFailure {
    pub ordinal: Ordinal,
    pub error: FetchError,
}

/// 一次抓取的完整结果：每个输入序号恰好出现在成功表或失败列表之一。
#[derive(Debug, Clone, Default)]
pub struct HarvestResult {
    pub successes: BTreeMap<Ordinal, ChapterContent>,
    pub failures: Vec<ChapterFailure>,
}

impl HarvestResult {
    pub fn total(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// 按序号顺序遍历成功章节。
    pub fn chapters(&self) -> impl Iterator<Item = &ChapterContent> {
        self.successes.values()
    }

    pub(crate) fn record(&mut self, ordinal: Ordinal, outcome: Result<ChapterContent, FetchError>) {
        match outcome {
            Ok(content) => {
                self.successes.insert(ordinal, content);
            }
            Err(error) => self.failures.push(ChapterFailure { ordinal, error }),
        }
    }

    pub(crate) fn finish(mut self) -> Self {
        self.failures.sort_by_key(|f| f.ordinal);
        self
    }
}
