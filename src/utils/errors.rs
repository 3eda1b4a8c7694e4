// src/utils/errors.rs
//! Infrastructure errors for the host process
//!
//! These cover failures of the host itself (configuration, I/O, state
//! machine misuse). Failures the hosted program should see travel as
//! [`crate::exception::ExceptionRecord`] instead.

use thiserror::Error;

/// Host-side error
#[derive(Debug, Error)]
pub enum HostError {
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("invalid session state: {0}")]
    InvalidState(String),

    #[error("observability setup failed: {0}")]
    ObservabilityError(String),

    #[error("catalog error: {0}")]
    CatalogError(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for HostError {
    fn from(err: config::ConfigError) -> Self {
        HostError::ConfigError(err.to_string())
    }
}

impl From<serde_yaml::Error> for HostError {
    fn from(err: serde_yaml::Error) -> Self {
        HostError::CatalogError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HostError>;
