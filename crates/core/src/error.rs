//! Domain error model.

use thiserror::Error;

use crate::document::DocumentType;
use crate::id::{ProductId, WarehouseId};

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures. Storage
/// failures (timeouts, backend errors) belong to the infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed input (missing product, negative quantity, same warehouse, ...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A referenced snapshot, document, warehouse or product does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A decrease would drive the on-hand quantity negative.
    #[error(
        "insufficient stock for product {product} in warehouse {warehouse}: available {available}, requested {requested}"
    )]
    InsufficientStock {
        product: ProductId,
        warehouse: WarehouseId,
        available: i64,
        requested: i64,
    },

    /// A workflow operation was attempted from a status that does not allow it.
    #[error("cannot {action} {document} in status '{from}'")]
    InvalidStateTransition {
        document: DocumentType,
        from: &'static str,
        action: &'static str,
    },

    /// Concurrent modification detected (stale status, duplicate key).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn invalid_transition(
        document: DocumentType,
        from: &'static str,
        action: &'static str,
    ) -> Self {
        Self::InvalidStateTransition {
            document,
            from,
            action,
        }
    }
}
