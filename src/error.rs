/// Error taxonomy
///
/// Only `DecodeError` (and `FormError` wrapping it) ever reaches a user-visible action.
/// `RemoteError` is converted into outcomes or fallbacks, and `CacheWriteError` never
/// leaves the cache store.

use thiserror::Error;

/// Bad image input. Fatal to the one thumbnail operation that hit it.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to decode image: {0}")]
    Image(#[from] image::ImageError),
    #[error("image decoding task failed: {0}")]
    Join(String),
}

/// Failures talking to the remote document store.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote endpoint not configured")]
    NotConfigured,
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RemoteError::Timeout
        } else if let Some(status) = err.status() {
            RemoteError::Status(status.as_u16())
        } else if err.is_decode() {
            RemoteError::Malformed(err.to_string())
        } else {
            RemoteError::Transport(err.to_string())
        }
    }
}

/// Cache slot write failures. Absorbed by `CacheStore::save`.
#[derive(Debug, Error)]
pub enum CacheWriteError {
    #[error("quota exceeded: payload of {needed} bytes, quota {quota} bytes")]
    QuotaExceeded { needed: usize, quota: usize },
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<rusqlite::Error> for CacheWriteError {
    fn from(err: rusqlite::Error) -> Self {
        CacheWriteError::Storage(err.to_string())
    }
}

/// Errors while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    ReadFailed(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseFailed(#[from] serde_json::Error),
    #[error("invalid config at {path}: {message}")]
    InvalidField { path: String, message: String },
}

/// Errors that block the save-form action.
#[derive(Debug, Error)]
pub enum FormError {
    #[error("select a valid primary photo")]
    MissingCover,
    #[error("select a valid primary photo: {0}")]
    Decode(#[from] DecodeError),
}
