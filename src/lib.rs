//! 轻小说整卷下载器。
//!
//! 代码结构（读代码入口）：
//! - `base_system`：配置 / 日志等基础设施
//! - `harvest`：章节并发/顺序抓取协调，单章失败相互隔离
//! - `media`：封面与插图的分段下载（可轮询进度）
//! - `book_parser`：卷清单、页面解析、Markdown 输出
//! - `download`：整卷下载流程编排与进度条

pub mod base_system;
pub mod book_parser;
pub mod download;
pub mod harvest;
pub mod media;
