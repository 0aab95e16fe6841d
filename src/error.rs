// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/safefall-rs

//! Error taxonomy shared by every subsystem
//!
//! No variant is fatal to the process. Each one is scoped to the user action
//! that produced it and is surfaced to that user as a transient notice.

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, SafeFallError>;

#[derive(Debug, Error)]
pub enum SafeFallError {
    /// Location or motion permission was refused. Recoverable by an explicit re-request.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Location could not be determined even though permission holds.
    #[error("location unavailable: {0}")]
    LocationUnavailable(String),

    /// A create or update was rejected by the store.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// A change subscription broke; the dependent view stays stale.
    #[error("subscription failure: {0}")]
    Subscription(String),

    /// Input rejected before it reached the store.
    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// Row-level policy rejected the caller.
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("cannot apply {input} while {from}")]
    InvalidTransition { from: String, input: String },

    #[error("authentication failed: {0}")]
    Auth(String),
}

impl SafeFallError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Message suitable for a transient user-facing notice
    pub fn user_message(&self) -> String {
        match self {
            Self::PermissionDenied(_) => {
                "Enable location access in your browser settings for accurate emergency tracking."
                    .to_string()
            }
            Self::Validation { message, .. } => message.clone(),
            Self::Persistence(_) => "Something went wrong while saving. Please try again.".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<rusqlite::Error> for SafeFallError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_errors_become_persistence_failures() {
        let err: SafeFallError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, SafeFallError::Persistence(_)));
    }

    #[test]
    fn test_validation_message_is_shown_verbatim() {
        let err = SafeFallError::validation("phone", "Phone number is required");
        assert_eq!(err.user_message(), "Phone number is required");
        assert_eq!(err.to_string(), "invalid phone: Phone number is required");
    }
}
