use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Money errors
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid currency code: {0}")]
    InvalidCurrency(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown connection type: {0}")]
    UnknownConnectionType(String),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
