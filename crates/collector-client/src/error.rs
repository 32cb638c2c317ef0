//! Collector client errors

use thiserror::Error;

/// Errors that can occur when delivering an event to the collector
#[derive(Debug, Error)]
pub enum CollectorError {
    /// Transport failure (connect, timeout, TLS, ...)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Collector answered with a status of 400 or above
    #[error("Collector rejected event: {status} - {body}")]
    Rejected {
        status: u16,
        body: String,
    },

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Client could not be constructed from the given settings
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CollectorError {
    /// Status code returned by the collector, if the request got that far.
    pub fn status(&self) -> Option<u16> {
        match self {
            CollectorError::Rejected { status, .. } => Some(*status),
            CollectorError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
