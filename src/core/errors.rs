use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Decode error: {0}")]
    DecodeError(String),

    #[error("API error: {code} - {message}")]
    ApiError { code: i32, message: String },

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::core::config::ConfigError),
}

impl ExchangeError {
    /// True for failures reaching the remote endpoint
    pub fn is_network(&self) -> bool {
        matches!(self, Self::NetworkError(_))
    }

    /// True when the response arrived but did not have the expected shape
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::DecodeError(_))
    }
}
