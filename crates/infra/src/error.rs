//! Error type returned by the coordinator and the workflow services.
//!
//! Domain failures and storage failures are flattened into one taxonomy so
//! callers can decide on retries without matching on two enums.

use thiserror::Error;

use stockflow_core::{DocumentType, DomainError, ProductId, WarehouseId};

use crate::store::StoreError;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(
        "insufficient stock for product {product} in warehouse {warehouse}: available {available}, requested {requested}"
    )]
    InsufficientStock {
        product: ProductId,
        warehouse: WarehouseId,
        available: i64,
        requested: i64,
    },

    #[error("cannot {action} {document} in status '{from}'")]
    InvalidStateTransition {
        document: DocumentType,
        from: String,
        action: String,
    },

    /// Concurrent modification detected by the store.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("timed out: {0}")]
    Timeout(String),

    /// Non-retryable storage failure.
    #[error("storage failure: {0}")]
    Store(String),
}

impl ServiceError {
    /// Whether the same call may succeed if retried (after caller-side
    /// correction for insufficient stock).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::InsufficientStock { .. } | ServiceError::Conflict(_) | ServiceError::Timeout(_)
        )
    }
}

impl From<DomainError> for ServiceError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => ServiceError::Validation(msg),
            DomainError::NotFound(msg) => ServiceError::NotFound(msg),
            DomainError::InsufficientStock {
                product,
                warehouse,
                available,
                requested,
            } => ServiceError::InsufficientStock {
                product,
                warehouse,
                available,
                requested,
            },
            DomainError::InvalidStateTransition {
                document,
                from,
                action,
            } => ServiceError::InvalidStateTransition {
                document,
                from: from.to_string(),
                action: action.to_string(),
            },
            DomainError::Conflict(msg) => ServiceError::Conflict(msg),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) => ServiceError::Conflict(msg),
            StoreError::Timeout(msg) => ServiceError::Timeout(msg),
            StoreError::NotFound(msg) => ServiceError::NotFound(msg),
            StoreError::Serialization(msg) | StoreError::Backend(msg) => ServiceError::Store(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability_follows_error_kind() {
        assert!(ServiceError::from(StoreError::Conflict("stale".into())).is_retryable());
        assert!(ServiceError::from(StoreError::Timeout("lock".into())).is_retryable());
        assert!(!ServiceError::from(StoreError::Backend("down".into())).is_retryable());
        assert!(!ServiceError::from(DomainError::validation("bad")).is_retryable());

        let insufficient = DomainError::InsufficientStock {
            product: ProductId::new(),
            warehouse: WarehouseId::new(),
            available: 1,
            requested: 2,
        };
        assert!(ServiceError::from(insufficient).is_retryable());
    }

    #[test]
    fn invalid_transition_keeps_its_message() {
        let err = ServiceError::from(DomainError::invalid_transition(
            DocumentType::Adjustment,
            "Draft",
            "approve",
        ));
        assert_eq!(err.to_string(), "cannot approve Adjustment in status 'Draft'");
    }
}
