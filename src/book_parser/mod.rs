//! 卷清单、章节页面解析与 Markdown 输出。

pub mod assets;
pub mod manifest;
pub mod markdown_generator;
pub mod page_fetcher;
