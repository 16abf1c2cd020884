//! Error types for the host monitoring agent

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or running the agent.
///
/// Per-target probe failures are deliberately absent: they are outcomes
/// ([`crate::domain::PingOutcome`], [`crate::domain::HttpOutcome`]) recorded
/// as metrics, never propagated.
#[derive(Error, Debug)]
pub enum Error {
    /// A resource entry or setting is malformed
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A metric family was registered twice with a different schema
    #[error("Metric family {name} already registered with labels {expected:?}, got {found:?}")]
    SchemaConflict {
        name: String,
        expected: Vec<String>,
        found: Vec<String>,
    },

    /// Prometheus registry error
    #[error("Prometheus registry error: {0}")]
    Prometheus(#[from] prometheus::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings file parse error
    #[error("Failed to parse settings file: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// HTTP client construction error
    #[error("HTTP client error: {0}")]
    HttpClient(#[source] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build an `InvalidConfiguration` error from anything displayable.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Error::InvalidConfiguration(msg.into())
    }
}
