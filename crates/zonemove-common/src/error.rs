//! Error types for zone migration operations.
//!
//! This module defines the error types used throughout the zonemove crates.
//! All errors implement `std::error::Error` via `thiserror`.

use std::io;
use thiserror::Error;

/// Result type alias for zone migration operations.
pub type MigrateResult<T> = Result<T, MigrateError>;

/// Errors that can occur while talking to the control plane or assembling
/// the replacement VM.
#[derive(Debug, Error)]
pub enum MigrateError {
    /// Credential acquisition or subscription selection failed.
    #[error("Authentication failed: {message}")]
    Auth {
        /// Error message.
        message: String,
    },

    /// The request never produced an HTTP response.
    #[error("HTTP transport error during {operation}: {message}")]
    Http {
        /// The operation that failed (e.g., "get_vm", "create_snapshot").
        operation: String,
        /// Error message.
        message: String,
    },

    /// The control plane rejected the request.
    #[error("{operation} failed with status {status} ({code}): {message}")]
    Api {
        /// The operation that failed.
        operation: String,
        /// HTTP status code.
        status: u16,
        /// Provider error code (e.g., "ConflictingUserInput").
        code: String,
        /// Provider error message.
        message: String,
    },

    /// A named resource does not exist.
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// Resource kind (e.g., "virtual machine", "disk").
        kind: String,
        /// Resource name.
        name: String,
    },

    /// A resource with the same name already exists.
    #[error("{kind} '{name}' already exists")]
    Conflict {
        /// Resource kind.
        kind: String,
        /// Resource name.
        name: String,
    },

    /// Configuration validation error.
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// A resource id did not have the expected shape.
    #[error("Invalid resource id '{id}': {message}")]
    InvalidResourceId {
        /// The offending id.
        id: String,
        /// Error message.
        message: String,
    },

    /// A long-running operation finished in a non-success state.
    #[error("Operation {operation} ended with status {status}: {message}")]
    OperationFailed {
        /// The operation that was being awaited.
        operation: String,
        /// Terminal status reported by the control plane.
        status: String,
        /// Error message.
        message: String,
    },

    /// A long-running operation did not finish in time.
    #[error("Operation {operation} did not complete within {seconds}s")]
    OperationTimeout {
        /// The operation that was being awaited.
        operation: String,
        /// The timeout that elapsed.
        seconds: u64,
    },

    /// Local IO failure.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Internal error (unexpected state).
    #[error("Internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl MigrateError {
    /// Creates an authentication error.
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Creates a transport error.
    pub fn http(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Http {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Creates a conflict error.
    pub fn conflict(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Conflict {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid resource id error.
    pub fn invalid_resource_id(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidResourceId {
            id: id.into(),
            message: message.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if the error means the resource is absent.
    pub fn is_not_found(&self) -> bool {
        match self {
            MigrateError::NotFound { .. } => true,
            MigrateError::Api { status, .. } => *status == 404,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MigrateError::not_found("disk", "osdisk");
        assert_eq!(err.to_string(), "disk 'osdisk' not found");
    }

    #[test]
    fn test_api_error_display() {
        let err = MigrateError::Api {
            operation: "create_snapshot".to_string(),
            status: 409,
            code: "Conflict".to_string(),
            message: "snapshot exists".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "create_snapshot failed with status 409 (Conflict): snapshot exists"
        );
    }

    #[test]
    fn test_timeout_display() {
        let err = MigrateError::OperationTimeout {
            operation: "create_disk".to_string(),
            seconds: 3600,
        };
        assert!(err.to_string().contains("3600s"));
    }

    #[test]
    fn test_is_not_found() {
        assert!(MigrateError::not_found("virtual machine", "MyVM").is_not_found());
        assert!(MigrateError::Api {
            operation: "get_disk".to_string(),
            status: 404,
            code: "ResourceNotFound".to_string(),
            message: String::new(),
        }
        .is_not_found());
        assert!(!MigrateError::internal("bug").is_not_found());
        assert!(!MigrateError::conflict("disk", "d").is_not_found());
    }
}
