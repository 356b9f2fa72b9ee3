// src/error.rs
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Failures talking to the chat platform.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{method} returned {status}: {body}")]
    Status {
        method: &'static str,
        status: u16,
        body: String,
    },

    #[error("{method} rejected: {description}")]
    Rejected {
        method: &'static str,
        description: String,
    },
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Intake(String),

    #[error("liveness server error: {0}")]
    Liveness(String),
}
