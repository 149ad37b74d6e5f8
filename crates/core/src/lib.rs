//! `stockflow-core` - domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod document;
pub mod error;
pub mod id;

pub use document::{CodeSeries, DocumentType, WorkflowDocument, WorkflowStatus};
pub use error::{DomainError, DomainResult};
pub use id::{AdjustmentId, LedgerEntryId, ProductId, ReturnId, TransferId, UserId, WarehouseId};
