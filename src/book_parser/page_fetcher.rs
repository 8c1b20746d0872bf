//! 章节页面抓取与正文拆分。
//!
//! 页面既可以是纯文本（首个非空行为标题），也可以是简单 HTML（首个 h1~h3 为标题，
//! `<img>` 转为插图引用）。以配置的插图前缀开头的行同样视为插图引用。

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, ACCEPT_ENCODING, CONNECTION, HeaderMap, HeaderValue, USER_AGENT};
use tracing::debug;

use crate::base_system::context::Config;
use crate::harvest::{ChapterContent, ChapterFetcher, ChapterLocation, ContentUnit, FetchError, Ordinal};

static CHAPTER_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(第[^章]{1,12}章)\s*(.*)$").expect("compile CHAPTER_PREFIX"));
static HTML_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| {
        Regex::new(
            r"(?is)<!--.*?-->|<head\b.*?</head\s*>|<script\b.*?</script\s*>|<style\b.*?</style\s*>|<[^>]+>|[^<]+",
        )
            .expect("compile HTML_TOKEN")
    });
static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<h[1-3]\b[^>]*>(.*?)</h[1-3]\s*>").expect("compile HEADING"));
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]+>").expect("compile TAG"));
static DATA_COVER_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)\bdata-cover\s*=\s*['"]([^'"]*)['"]"#).expect("compile DATA_COVER_ATTR")
});
static SRC_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)(?:^|[\s<])src\s*=\s*['"]([^'"]*)['"]"#).expect("compile SRC_ATTR")
});

pub struct PageFetcher {
    client: Client,
    illustration_prefix: String,
}

impl PageFetcher {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        Self::with_timeout(config.request_timeout(), &config.user_agent, &config.illustration_prefix)
    }

    pub fn with_timeout(
        timeout: Duration,
        user_agent: &str,
        illustration_prefix: &str,
    ) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,text/plain;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent).unwrap_or(HeaderValue::from_static("Mozilla/5.0")),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            illustration_prefix: illustration_prefix.to_string(),
        })
    }
}

impl ChapterFetcher for PageFetcher {
    fn fetch(&self, location: &ChapterLocation) -> Result<ChapterContent, FetchError> {
        let resp = self
            .client
            .get(location.address())
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| FetchError::with_cause("request failed", e))?;
        let body = resp
            .text()
            .map_err(|e| FetchError::with_cause("read body failed", e))?;
        debug!(target: "harvest", address = location.address(), bytes = body.len(), "页面已获取");
        parse_page(location.ordinal(), &body, &self.illustration_prefix)
    }
}

/// 把页面文本拆成章节内容。页面中没有任何可用文字或插图时返回错误。
pub fn parse_page(
    ordinal: Ordinal,
    body: &str,
    illustration_prefix: &str,
) -> Result<ChapterContent, FetchError> {
    let is_html = body.contains('<') && TAG.is_match(body);
    let (heading, units) = if is_html {
        (html_title(body), html_units(body))
    } else {
        (None, text_units(body))
    };

    let mut units: Vec<ContentUnit> = units
        .into_iter()
        .map(|unit| match unit {
            ContentUnit::Text(line)
                if !illustration_prefix.is_empty() && line.starts_with(illustration_prefix) =>
            {
                ContentUnit::AssetRef(line)
            }
            other => other,
        })
        .collect();

    // HTML 页：标题来自首个 h1~h3，正文中去掉与之重复的段落；纯文本页：首个文字行即标题。
    let title = match heading {
        Some(t) => {
            if let Some(pos) = units
                .iter()
                .position(|u| matches!(u, ContentUnit::Text(line) if *line == t))
            {
                units.remove(pos);
            }
            t
        }
        None => match units.first() {
            Some(ContentUnit::Text(t)) => {
                let t = t.clone();
                units.remove(0);
                t
            }
            _ => String::new(),
        },
    };

    if title.is_empty() && units.is_empty() {
        return Err(FetchError::new("page has no content"));
    }

    let name = if title.is_empty() {
        format!("第{}章", ordinal + 1)
    } else {
        normalize_chapter_title(&title)
    };
    Ok(ChapterContent::new(ordinal, name, units))
}

/// `第一章标题` → `第一章 标题`。
pub fn normalize_chapter_title(raw: &str) -> String {
    let raw = raw.trim();
    match CHAPTER_PREFIX.captures(raw) {
        Some(caps) => {
            let head = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let rest = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
            if rest.is_empty() {
                head.to_string()
            } else {
                format!("{head} {rest}")
            }
        }
        None => raw.to_string(),
    }
}

fn text_units(body: &str) -> Vec<ContentUnit> {
    body.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| ContentUnit::Text(l.to_string()))
        .collect()
}

fn html_title(body: &str) -> Option<String> {
    let caps = HEADING.captures(body)?;
    let inner = caps.get(1)?.as_str();
    let text = collapse_ws(&unescape_basic_entities(&TAG.replace_all(inner, "")));
    (!text.is_empty()).then_some(text)
}

fn html_units(body: &str) -> Vec<ContentUnit> {
    let mut units = Vec::new();
    let mut line = String::new();

    fn flush(line: &mut String, units: &mut Vec<ContentUnit>) {
        let text = collapse_ws(line);
        if !text.is_empty() {
            units.push(ContentUnit::Text(text));
        }
        line.clear();
    }

    for tok in HTML_TOKEN.find_iter(body).map(|m| m.as_str()) {
        if !tok.starts_with('<') {
            line.push_str(&unescape_basic_entities(tok));
            continue;
        }
        let lower = tok.to_ascii_lowercase();
        if lower.starts_with("<img") {
            flush(&mut line, &mut units);
            if let Some(src) = attr(tok, &DATA_COVER_ATTR).or_else(|| attr(tok, &SRC_ATTR)) {
                units.push(ContentUnit::AssetRef(src));
            }
        } else if is_line_break(&lower) {
            flush(&mut line, &mut units);
        }
    }
    flush(&mut line, &mut units);
    units
}

fn is_line_break(lower_tag: &str) -> bool {
    const BLOCKS: [&str; 10] = ["p", "div", "li", "h1", "h2", "h3", "h4", "h5", "h6", "tr"];
    let name = lower_tag
        .trim_start_matches('<')
        .trim_start_matches('/')
        .split(|c: char| c.is_whitespace() || c == '>' || c == '/')
        .next()
        .unwrap_or_default();
    name == "br" || BLOCKS.contains(&name)
}

fn attr(tag: &str, re: &Regex) -> Option<String> {
    let value = re.captures(tag)?.get(1)?.as_str().trim();
    (!value.is_empty()).then(|| unescape_basic_entities(value))
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn unescape_basic_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
