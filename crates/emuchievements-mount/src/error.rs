//! Mount system error types.

use thiserror::Error;

use crate::manager::Phase;

/// Faults raised by a host capability (patch primitive, router, object graph).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("host object {object} has no method {method}")]
    MissingMethod { object: String, method: String },

    #[error("host object {object} has no property {property}")]
    MissingProperty { object: String, property: String },

    #[error("unsupported patch target: {0}")]
    UnsupportedTarget(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("route already registered: {0}")]
    RouteExists(String),

    #[error("host rejected the call: {0}")]
    Rejected(String),
}

#[derive(Error, Debug)]
pub enum MountError {
    #[error("locator miss: no host module matched {0}")]
    LocatorMiss(String),

    #[error("patch application failed on {target}.{method}: {reason}")]
    PatchApplication {
        target: String,
        method: String,
        reason: String,
    },

    #[error("invalid state: cannot {operation} while {phase}")]
    InvalidState {
        operation: &'static str,
        phase: Phase,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("host error: {0}")]
    Host(#[from] HostError),

    #[error("panicked: {0}")]
    Panicked(String),

    #[error("event handler failed: {0}")]
    Handler(String),

    #[error("collaborator error: {0}")]
    Collaborator(String),

    #[error("activation aborted at mount #{index} ({label}): {source}")]
    ActivationAborted {
        index: usize,
        label: String,
        #[source]
        source: Box<MountError>,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MountError {
    /// True for failures that only disable the mount they came from.
    pub fn is_contained(&self) -> bool {
        !matches!(
            self,
            MountError::InvalidState { .. } | MountError::ActivationAborted { .. }
        )
    }
}
