use thiserror::Error;

#[derive(Error, Debug)]
pub enum PostwatchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Source already registered: {0}")]
    DuplicateSource(String),

    #[error("Post already stored: {0}")]
    DuplicatePost(String),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl<T> From<std::sync::PoisonError<T>> for PostwatchError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        PostwatchError::LockPoisoned(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PostwatchError>;
