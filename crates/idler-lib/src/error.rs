//! Error taxonomy for the idler
//!
//! None of these escape an evaluation pass: evaluators and actuators log
//! them and fold them into a verdict or an actuation status.

use crate::models::ResourceKind;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdlerError {
    /// The API server refused or failed a list call
    #[error("failed to list {kind} resources in namespace {namespace}: {message}")]
    Listing {
        kind: ResourceKind,
        namespace: String,
        message: String,
    },

    /// Exec into a pod could not be started or returned an error
    #[error("failed to exec into pod {pod}: {message}")]
    ProbeExec { pod: String, message: String },

    /// Transport, HTTP status or decoding failure of a traffic query
    #[error("metrics query failed: {0}")]
    Query(String),

    /// The traffic query outlived its own deadline
    #[error("metrics query timed out after {0:?}")]
    QueryTimeout(Duration),

    /// A merge patch was rejected
    #[error("failed to patch {kind} {name}: {message}")]
    Patch {
        kind: ResourceKind,
        name: String,
        message: String,
    },

    #[error("invalid label selector: {0}")]
    Selector(String),

    /// Settings that cannot be acted on, reported at startup
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl IdlerError {
    /// Wrap a client error from listing `kind` in `namespace`
    pub fn listing(kind: ResourceKind, namespace: &str, err: impl std::fmt::Display) -> Self {
        IdlerError::Listing {
            kind,
            namespace: namespace.to_string(),
            message: err.to_string(),
        }
    }

    /// Wrap a client error from patching the named resource
    pub fn patch(kind: ResourceKind, name: &str, err: impl std::fmt::Display) -> Self {
        IdlerError::Patch {
            kind,
            name: name.to_string(),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, IdlerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_error_names_kind_and_namespace() {
        let err = IdlerError::listing(ResourceKind::Ingress, "project-main", "forbidden");

        assert_eq!(
            err.to_string(),
            "failed to list ingress resources in namespace project-main: forbidden"
        );
    }

    #[test]
    fn test_patch_error_keeps_client_message() {
        let err = IdlerError::patch(ResourceKind::Deployment, "nginx", "conflict");

        assert!(matches!(
            &err,
            IdlerError::Patch { kind: ResourceKind::Deployment, name, message }
                if name == "nginx" && message == "conflict"
        ));
        assert_eq!(err.to_string(), "failed to patch deployment nginx: conflict");
    }

    #[test]
    fn test_query_timeout_reports_deadline() {
        let err = IdlerError::QueryTimeout(Duration::from_secs(10));

        assert_eq!(err.to_string(), "metrics query timed out after 10s");
    }
}
