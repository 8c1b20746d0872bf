//! 二进制资源（封面/插图）分段下载。
//!
//! 子模块：
//! - `session`           ：下载会话状态与只读视图
//! - `resource`          ：远程资源接口与 HTTP 实现
//! - `sink`              ：写入目标（文件 / 内存）
//! - `segment_downloader`：分段下载主流程

pub mod error;
pub mod resource;
pub mod segment_downloader;
pub mod session;
pub mod sink;

pub use error::DownloadError;
pub use resource::{HttpResource, ResourceHandle};
pub use segment_downloader::{DEFAULT_SEGMENT_SIZE, DownloadHandle, SegmentDownloader};
pub use session::{DownloadSession, DownloadStatus, SessionSnapshot, SessionView};
pub use sink::{FileSink, MemorySink, WritableSink};
