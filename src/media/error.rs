use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("unsupported scheme: {address} (only http/https is supported)")]
    UnsupportedScheme { address: String },
    #[error("size unavailable for {address}: {reason}")]
    SizeUnavailable { address: String, reason: String },
    #[error("segment size must be positive")]
    InvalidChunkSize,
    #[error("transfer failed after {transferred} bytes: {source}")]
    Transfer {
        transferred: u64,
        #[source]
        source: io::Error,
    },
}

impl DownloadError {
    pub(crate) fn size_unavailable(address: &str, reason: impl Into<String>) -> Self {
        DownloadError::SizeUnavailable {
            address: address.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_transfer(&self) -> bool {
        matches!(self, DownloadError::Transfer { .. })
    }
}
