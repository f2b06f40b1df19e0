//! Error types for the deployhook daemon

use std::time::Duration;

use thiserror::Error;

/// Main error type for the daemon
#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for DaemonError {
    fn from(err: anyhow::Error) -> Self {
        DaemonError::Internal(err.to_string())
    }
}

/// Reasons a webhook delivery is rejected before any deployment work starts
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    #[error("Event wrong")]
    EventTypeInvalid,

    #[error("Content too long")]
    PayloadTooLarge,

    #[error("User agent fail")]
    AgentInvalid,

    #[error("Wrong content")]
    SignatureInvalid,

    #[error("Payload malformed")]
    PayloadMalformed,
}

/// Version/build tag extraction failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("Version not found in message: {0}")]
    VersionNotFound(String),

    #[error("Build not found in message: {0}")]
    BuildNotFound(String),
}

/// A payload that should deploy but cannot be turned into a request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    #[error(transparent)]
    Extract(#[from] ExtractError),
}

/// Failure of a single external command
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{label} timed out after {timeout:?}")]
    Timeout { label: String, timeout: Duration },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Pipeline stage failures
///
/// Every variant except `NotDeployable` aborts the run and is reported to admins.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Application is not deployable: {0}")]
    NotDeployable(String),

    #[error("Prepare error: {0}")]
    PrepareError(String),

    #[error("Build error: {0}")]
    BuildError(String),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("Test error: {0}")]
    TestError(String),

    #[error("Run error: {0}")]
    RunError(String),

    #[error("Command timed out during {stage}: {message}")]
    CommandTimeout { stage: String, message: String },
}

impl PipelineError {
    /// Whether admins should hear about this failure
    pub fn is_reportable(&self) -> bool {
        !matches!(self, PipelineError::NotDeployable(_))
    }
}
