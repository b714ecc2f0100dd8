// Errors raised while loading Islet configuration

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration key not found: {0}")]
    KeyNotFound(String),

    /// A source (file, `.env`) could not be read.
    #[error("Failed to load {source_name}: {message}")]
    LoadError {
        source_name: String,
        message: String,
    },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// A value was read but is not acceptable for `key`.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Environment variable error: {0}")]
    EnvError(#[from] std::env::VarError),
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn load(source_name: impl std::fmt::Display, message: impl std::fmt::Display) -> Self {
        ConfigError::LoadError {
            source_name: source_name.to_string(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
