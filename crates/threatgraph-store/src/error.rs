//! Store error types

use threatgraph_core::NodeKey;

/// Store operation result type
pub type StoreResult<T> = Result<T, StoreError>;

/// Store error types
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Threat group not found: {0}")]
    MissingGroup(String),

    #[error("Node not found: {0}")]
    MissingNode(NodeKey),

    #[error("Query error: {code} - {message}")]
    Query { code: String, message: String },

    #[error("Unexpected response: {0}")]
    Response(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// Fatal errors end the run; everything else is skipped per item.
    pub fn is_fatal(&self) -> bool {
        match self {
            StoreError::Connection(_) | StoreError::Authentication(_) => true,
            StoreError::Http(e) => e.is_connect() || e.is_timeout(),
            StoreError::Sql(e) => matches!(
                e,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
            ),
            _ => false,
        }
    }
}
