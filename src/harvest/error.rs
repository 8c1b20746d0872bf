use std::fmt;

use thiserror::Error;

use super::models::Ordinal;

/// 单章抓取失败。只描述错误本身，不携带控制流含义。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    message: String,
    cause: Option<String>,
}

impl FetchError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(message: impl Into<String>, cause: impl fmt::Display) -> Self {
        Self {
            message: message.into(),
            cause: Some(cause.to_string()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&str> {
        self.cause.as_deref()
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{}: {}", self.message, cause),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for FetchError {}

/// 整体抓取失败（结构性错误），在任何请求发出之前返回。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HarvestError {
    #[error("malformed input: duplicate chapter ordinal {ordinal}")]
    MalformedInput { ordinal: Ordinal },
    #[error("no chapter locations to harvest")]
    EmptyInput,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_cause_when_present() {
        assert_eq!(FetchError::new("boom").to_string(), "boom");
        assert_eq!(
            FetchError::with_cause("request failed", "status 503").to_string(),
            "request failed: status 503"
        );
    }
}
