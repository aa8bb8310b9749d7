//! Error types for the controller.
//!
//! Defines custom error types with classification for retry behavior.

use std::time::Duration;
use thiserror::Error;

/// Error type for controller operations
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Validation error in resource spec or environment
    #[error("Validation error: {0}")]
    Validation(String),

    /// A sub-resource could not be provisioned or released
    #[error("Provisioning error: {0}")]
    Provisioning(String),

    /// Status or finalizer write failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Parent cluster identity could not be resolved
    #[error("Cluster info error: {0}")]
    ClusterInfo(String),

    /// An admin command failed
    #[error("{program} failed: {message}")]
    Command { program: String, message: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The reconciliation deadline expired
    #[error("reconciliation timed out after {0:?}")]
    Timeout(Duration),

    /// An error annotated with the step it came from
    #[error("{phase}: {source}")]
    Phase {
        phase: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap this error with the name of the step that produced it.
    pub fn in_phase(self, phase: impl Into<String>) -> Self {
        Error::Phase {
            phase: phase.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, with all phase annotations stripped.
    pub fn root(&self) -> &Error {
        match self {
            Error::Phase { source, .. } => source.root(),
            other => other,
        }
    }

    /// Name of the outermost step the error passed through, if any.
    pub fn step(&self) -> Option<&str> {
        match self {
            Error::Phase { phase, .. } => Some(phase),
            _ => None,
        }
    }

    /// Check if this error indicates a not-found condition
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Error::Kube(kube::Error::Api(e)) if e.code == 404)
    }

    /// Check if this error is a spec or environment validation failure
    pub fn is_validation(&self) -> bool {
        matches!(self.root(), Error::Validation(_))
    }

    /// Check if this error should be retried
    pub fn is_retryable(&self) -> bool {
        match self.root() {
            Error::Kube(e) => {
                // Retry on network errors, rate limiting, conflicts and server errors
                matches!(
                    e,
                    kube::Error::Api(api_err)
                        if api_err.code >= 500 || api_err.code == 429 || api_err.code == 409
                ) || matches!(e, kube::Error::Service(_))
            }
            Error::Provisioning(_)
            | Error::Persistence(_)
            | Error::ClusterInfo(_)
            | Error::Command { .. }
            | Error::Timeout(_) => true,
            Error::Validation(_) | Error::Serialization(_) => false,
            // root() never returns a Phase
            Error::Phase { .. } => false,
        }
    }

    /// Get the recommended requeue duration for this error
    pub fn requeue_after(&self) -> Duration {
        if self.is_retryable() {
            Duration::from_secs(30)
        } else {
            Duration::from_secs(300)
        }
    }
}

/// Attach a step name to the error of a `Result`.
pub trait PhaseExt<T> {
    /// Wrap the error, if any, with `phase`.
    fn phase(self, phase: &str) -> Result<T>;
}

impl<T> PhaseExt<T> for Result<T> {
    fn phase(self, phase: &str) -> Result<T> {
        self.map_err(|e| e.in_phase(phase))
    }
}

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, Error>;
