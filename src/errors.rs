use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to read facilities from {}: {reason}", .path.display())]
    Input { path: PathBuf, reason: String },
    #[error("geocode cache at {} is unreadable: {reason}", .path.display())]
    Persistence { path: PathBuf, reason: String },
    #[error("failed to write {}: {source}", .path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Config(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl AppError {
    pub(crate) fn output(path: impl Into<PathBuf>, source: io::Error) -> Self {
        AppError::Output {
            path: path.into(),
            source,
        }
    }
}

/// Failure of a single geocoding lookup. Never fatal to a run.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("rate limited by provider")]
    RateLimited,
    #[error("provider returned HTTP {0}")]
    Status(u16),
    #[error("malformed provider response: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else if let Some(status) = err.status() {
            if status.as_u16() == 429 {
                ProviderError::RateLimited
            } else {
                ProviderError::Status(status.as_u16())
            }
        } else if err.is_decode() {
            ProviderError::Parse(err.to_string())
        } else {
            ProviderError::Network(err.to_string())
        }
    }
}
