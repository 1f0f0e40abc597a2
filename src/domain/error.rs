//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use thiserror::Error;

/// Business rule violations and lookup failures, independent of the web and
/// persistence layers. Expected outcomes live here; genuinely unexpected
/// conditions (storage down, corrupt rows) go through `AppError` instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A business invariant would be violated (occupied manager slot,
    /// promotion without a department, unreachable state).
    #[error("{0}")]
    InvalidOperation(String),

    /// Referenced entity does not exist.
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    /// Valid identity, insufficient role or non-ownership.
    #[error("Access denied: {0}")]
    Denied(String),

    /// Unique field collision.
    #[error("{resource} already exists with {field}: {value}")]
    Duplicate {
        resource: &'static str,
        field: &'static str,
        value: String,
    },
}

impl DomainError {
    pub fn invalid_operation(reason: impl Into<String>) -> Self {
        Self::InvalidOperation(reason.into())
    }

    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self::Denied(reason.into())
    }

    pub fn duplicate(
        resource: &'static str,
        field: &'static str,
        value: impl Into<String>,
    ) -> Self {
        Self::Duplicate {
            resource,
            field,
            value: value.into(),
        }
    }

    /// Check if this is a client error (caller's fault, no retry).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidOperation(_) | Self::Denied(_) | Self::Duplicate { .. }
        )
    }
}
