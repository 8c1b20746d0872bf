//! 远程字节资源：HEAD 探测大小 + GET 顺序读取。

use std::io::{self, Read};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, ACCEPT_ENCODING, CONNECTION, CONTENT_LENGTH, HeaderMap, HeaderValue, USER_AGENT};
use tracing::debug;

use super::error::DownloadError;

pub trait ResourceHandle: Send + Sync {
    fn address(&self) -> &str;

    /// 仅请求元数据，返回资源总字节数。
    fn probe_len(&self) -> Result<u64, DownloadError>;

    fn open(&self) -> io::Result<Box<dyn Read + Send>>;
}

/// 只接受 http/https 地址；其他协议在发出任何请求前拒绝。
pub fn check_scheme(address: &str) -> Result<(), DownloadError> {
    let scheme = address
        .split_once("://")
        .map(|(scheme, _)| scheme.to_ascii_lowercase());
    match scheme.as_deref() {
        Some("http") | Some("https") => Ok(()),
        _ => Err(DownloadError::UnsupportedScheme {
            address: address.to_string(),
        }),
    }
}

#[derive(Clone)]
pub struct HttpResource {
    client: Client,
    url: String,
}

impl HttpResource {
    pub fn new(url: &str, timeout: Duration, user_agent: &str) -> Result<Self, DownloadError> {
        check_scheme(url)?;

        // reqwest 未启用 gzip 解码，要求 identity 编码以保证 Content-Length 与实际字节一致。
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent).unwrap_or(HeaderValue::from_static("Mozilla/5.0")),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| DownloadError::size_unavailable(url, e.to_string()))?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub fn with_client(client: Client, url: &str) -> Result<Self, DownloadError> {
        check_scheme(url)?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

impl ResourceHandle for HttpResource {
    fn address(&self) -> &str {
        &self.url
    }

    fn probe_len(&self) -> Result<u64, DownloadError> {
        check_scheme(&self.url)?;
        let resp = self
            .client
            .head(&self.url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| DownloadError::size_unavailable(&self.url, e.to_string()))?;

        let len = resp
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .ok_or_else(|| DownloadError::size_unavailable(&self.url, "missing Content-Length"))?;
        debug!(target: "media", url = %self.url, len, "探测资源大小");
        Ok(len)
    }

    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(io::Error::other)?;
        Ok(Box::new(resp))
    }
}
