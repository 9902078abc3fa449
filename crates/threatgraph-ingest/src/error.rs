//! Ingestion error types

use threatgraph_store::StoreError;

/// Feed operation result type
pub type FeedResult<T> = Result<T, FeedError>;

/// Remote feed error types
#[derive(thiserror::Error, Debug)]
pub enum FeedError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
}

impl FeedError {
    /// Bad credentials or an unreachable service end the run
    pub fn is_fatal(&self) -> bool {
        match self {
            FeedError::AuthError(_) | FeedError::ConfigError(_) => true,
            FeedError::HttpError(e) => e.is_connect(),
            _ => false,
        }
    }
}

/// Ingestion result type
pub type IngestResult<T> = Result<T, IngestError>;

/// Ingestion error types
#[derive(thiserror::Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid input format: {0}")]
    Format(String),
}

impl IngestError {
    pub fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        IngestError::Io {
            path: path.display().to_string(),
            source,
        }
    }

    pub fn is_fatal(&self) -> bool {
        match self {
            IngestError::Store(e) => e.is_fatal(),
            IngestError::Feed(e) => e.is_fatal(),
            _ => true,
        }
    }
}
