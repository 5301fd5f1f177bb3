//! Error types for the FreeNAS NFS provisioner
//!
//! Provides structured error types for the appliance client, the resource
//! model, configuration resolution, and the provisioning engine.

use thiserror::Error;

/// Unified error type for the provisioner
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Appliance Errors
    // =========================================================================
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Remote API error (status {status}): {message}")]
    Remote { status: u16, message: String },

    /// A fetch found no matching remote resource. This is an expected
    /// control-flow signal for adopt-vs-create and already-deleted
    /// decisions, not a failure of the remote call itself.
    #[error("Resource not found: {kind} \"{name}\"")]
    NotFound { kind: &'static str, name: String },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Capacity parse error: {0}")]
    CapacityParse(String),

    // =========================================================================
    // Kubernetes Errors
    // =========================================================================
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Action to take on error during reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Requeue with backoff
    RequeueWithBackoff,
    /// Don't requeue, wait for changes
    NoRequeue,
}

impl Error {
    /// Determine what action the controller should take for this error.
    ///
    /// The engine itself never retries; this classification only drives the
    /// external reconcile loop's requeue decision.
    pub fn action(&self) -> ErrorAction {
        match self {
            // Bad parameters or malformed input won't fix themselves
            Error::Config(_) | Error::CapacityParse(_) | Error::JsonParse(_) => {
                ErrorAction::NoRequeue
            }

            // Everything else may be transient on the appliance or API side
            _ => ErrorAction::RequeueWithBackoff,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::NoRequeue)
    }

    /// Status code of the remote response, when the appliance answered at all
    pub fn remote_status(&self) -> Option<u16> {
        match self {
            Error::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Check for the not-found control-flow signal
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

/// Result type alias for the provisioner
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_actions() {
        let err = Error::Config("bad parameter".into());
        assert_eq!(err.action(), ErrorAction::NoRequeue);
        assert!(!err.is_retryable());

        let err = Error::Remote {
            status: 500,
            message: "internal server error".into(),
        };
        assert_eq!(err.action(), ErrorAction::RequeueWithBackoff);
        assert!(err.is_retryable());

        let err = Error::CapacityParse("8Zi".into());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_remote_status() {
        let err = Error::Remote {
            status: 404,
            message: "not here".into(),
        };
        assert_eq!(err.remote_status(), Some(404));

        let err = Error::Config("no secret".into());
        assert_eq!(err.remote_status(), None);
    }

    #[test]
    fn test_not_found_is_distinct() {
        let err = Error::NotFound {
            kind: "dataset",
            name: "tank/default/data".into(),
        };
        assert!(err.is_not_found());
        assert_eq!(err.remote_status(), None);
    }
}
