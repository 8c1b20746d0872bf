//! 章节抓取模块入口。
//!
//! 子模块：
//! - `models`      ：数据模型（ChapterLocation / ChapterContent / HarvestResult 等）
//! - `error`       ：单章错误与结构性错误
//! - `progress`    ：章节完成状态上报接口
//! - `coordinator` ：并发/顺序抓取协调

pub mod coordinator;
pub mod error;
pub mod models;
pub mod progress;

pub use coordinator::{ChapterFetcher, harvest};
pub use error::{FetchError, HarvestError};
pub use models::{
    ChapterContent, ChapterFailure, ChapterLocation, ContentUnit, HarvestMode, HarvestOptions,
    HarvestResult, Ordinal,
};
pub use progress::{LogSink, StatusSink};
