//! Crate-wide error types

use thiserror::Error;

/// Errors produced by the console client and its background tasks.
///
/// Fetch wrappers return these typed failures instead of swallowing them, so
/// each caller decides whether to log, surface, or ignore a failed poll.
#[derive(Error, Debug)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("status server error: {0}")]
    Server(String),

    #[error("event stream closed")]
    StreamClosed,
}

impl Error {
    /// True for network/transport failures and non-2xx responses, the class
    /// of errors that leaves previously displayed state intact.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Status { .. })
    }
}

/// Result type for console operations
pub type Result<T> = std::result::Result<T, Error>;
