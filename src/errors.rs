// Copyright (c) 2025 - Cowboy AI, Inc.
//! Error types for hub operations
//!
//! Aggregate invariant violations use the gRPC-style classification
//! (`InvalidArgument`, `FailedPrecondition`, ...) so callers can decide
//! whether to surface them to the command issuer. Transport variants wrap
//! failures of NATS, HTTP and encoding layers.

use thiserror::Error;

/// Errors that can occur in hub operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    /// Request or command is malformed
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation rejected because of the current aggregate state
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    /// Entity does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Entity already exists
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Caller is not authenticated
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Caller is not allowed to access the entity
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Operation was canceled (shutdown or context cancellation)
    #[error("canceled: {0}")]
    Canceled(String),

    /// Collaborator is temporarily unavailable
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Optimistic concurrency check failed while saving events
    #[error("concurrency conflict: expected version {expected}, got {actual}")]
    ConcurrencyConflict { expected: u64, actual: u64 },

    /// Internal failure, e.g. an event that cannot be decoded during replay
    #[error("internal: {0}")]
    Internal(String),

    /// NATS transport error
    #[error("NATS error: {0}")]
    Nats(String),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Timeout error
    #[error("operation timed out: {0}")]
    Timeout(String),
}

/// Result type for hub operations
pub type HubResult<T> = Result<T, HubError>;

impl HubError {
    /// HTTP status code used when the error reaches the subscription API.
    pub fn http_status(&self) -> u16 {
        match self {
            HubError::InvalidArgument(_) | HubError::Serialization(_) => 400,
            HubError::Unauthenticated(_) => 401,
            HubError::PermissionDenied(_) => 403,
            HubError::NotFound(_) => 404,
            HubError::AlreadyExists(_) | HubError::ConcurrencyConflict { .. } => 409,
            HubError::FailedPrecondition(_) => 412,
            HubError::Canceled(_) => 499,
            HubError::Unavailable(_) | HubError::Nats(_) => 503,
            HubError::Timeout(_) => 504,
            _ => 500,
        }
    }

    /// Errors of the live event stream that heal through reconnection.
    pub fn is_transient_transport(&self) -> bool {
        match self {
            HubError::Canceled(_) => true,
            other => other.to_string().contains("transport is closing"),
        }
    }

    /// The source refused the subscriber's credentials; retrying with the
    /// same record cannot succeed.
    pub fn is_permanent_refusal(&self) -> bool {
        matches!(self, HubError::Unauthenticated(_) | HubError::PermissionDenied(_))
    }
}

impl From<serde_json::Error> for HubError {
    fn from(err: serde_json::Error) -> Self {
        HubError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for HubError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            HubError::Timeout(err.to_string())
        } else {
            HubError::Http(err.to_string())
        }
    }
}

impl From<async_nats::Error> for HubError {
    fn from(err: async_nats::Error) -> Self {
        HubError::Nats(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(HubError::InvalidArgument("x".into()).http_status(), 400);
        assert_eq!(HubError::NotFound("x".into()).http_status(), 404);
        assert_eq!(HubError::Internal("x".into()).http_status(), 500);
    }

    #[test]
    fn test_transient_transport_classification() {
        assert!(HubError::Canceled("shutdown".into()).is_transient_transport());
        assert!(HubError::Unavailable("rpc error: transport is closing".into())
            .is_transient_transport());
        assert!(!HubError::Unauthenticated("token expired".into()).is_transient_transport());
        assert!(HubError::Unauthenticated("token expired".into()).is_permanent_refusal());
        assert!(HubError::PermissionDenied("not the owner".into()).is_permanent_refusal());
        assert!(!HubError::Unavailable("directory down".into()).is_permanent_refusal());
    }
}
