//! Error types for grabber-core

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid repository: {0}")]
    InvalidRepository(String),

    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Errors that must abort a whole enumeration instead of degrading one record.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Authentication(_) | Error::RateLimited { .. })
    }

    /// Provider hint for when the caller may retry, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
