// Error types for fetching, store access and whole-run orchestration.

use thiserror::Error;

/// Failure while fetching one page of ShinyBoard data.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("page limit of {0} reached")]
    PageLimit(usize),
}

/// Failure while reading or writing the remote shiny database.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("store returned HTTP {0}")]
    Status(u16),

    #[error("store rejected the update: {0}")]
    Rejected(String),

    #[error("invalid store URL: {0}")]
    InvalidUrl(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that end a sync run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("store changed since it was fetched (expected {expected}, found {actual}); rerun the merge")]
    StoreChanged { expected: String, actual: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("credential prompt failed: {0}")]
    Prompt(String),
}

pub type SyncResult<T> = Result<T, SyncError>;
