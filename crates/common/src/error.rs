use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The exchange answered with an error payload or data we cannot use.
    #[error("Exchange API error: {0}")]
    Exchange(String),

    /// Request never got a usable response.
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown trading policy '{0}'")]
    UnknownPolicy(String),

    /// An all-in order would have a zero amount.
    #[error("No available {currency} balance to trade")]
    InsufficientBalance { currency: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
