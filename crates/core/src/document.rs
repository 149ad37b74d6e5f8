//! Workflow document primitives shared by the adjustment, transfer and return
//! modules.

use core::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};

/// Kind of document a ledger entry points back to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentType {
    Adjustment,
    Transfer,
    Return,
    PurchaseOrder,
    SalesOrder,
    /// Direct movement with no originating workflow (e.g. opening balance).
    Manual,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Adjustment => "Adjustment",
            DocumentType::Transfer => "Transfer",
            DocumentType::Return => "Return",
            DocumentType::PurchaseOrder => "PurchaseOrder",
            DocumentType::SalesOrder => "SalesOrder",
            DocumentType::Manual => "Manual",
        }
    }
}

impl core::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Adjustment" => Ok(DocumentType::Adjustment),
            "Transfer" => Ok(DocumentType::Transfer),
            "Return" => Ok(DocumentType::Return),
            "PurchaseOrder" => Ok(DocumentType::PurchaseOrder),
            "SalesOrder" => Ok(DocumentType::SalesOrder),
            "Manual" => Ok(DocumentType::Manual),
            other => Err(DomainError::validation(format!(
                "unknown document type '{other}'"
            ))),
        }
    }
}

/// Human-readable identifier series (`ADJ-00001`, `TR-00001`, ...).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CodeSeries {
    Adjustment,
    Transfer,
    Return,
    InventoryTransaction,
}

impl CodeSeries {
    pub fn prefix(&self) -> &'static str {
        match self {
            CodeSeries::Adjustment => "ADJ",
            CodeSeries::Transfer => "TR",
            CodeSeries::Return => "RET",
            CodeSeries::InventoryTransaction => "IT",
        }
    }

    /// Format a sequence value as `PREFIX-NNNNN` (zero-padded to five digits).
    pub fn format(&self, sequence: u64) -> String {
        format!("{}-{:05}", self.prefix(), sequence)
    }
}

/// Status of a workflow document.
pub trait WorkflowStatus: Copy + Eq + core::fmt::Debug + Send + Sync {
    /// Stable, human-readable label (persisted alongside the document).
    fn label(&self) -> &'static str;

    /// Terminal documents are immutable apart from audit fields.
    fn is_terminal(&self) -> bool;

    /// Deletion is only allowed before any stock has moved.
    fn is_deletable(&self) -> bool;

    /// Guard a transition: the current status must be one of `allowed`.
    fn ensure_one_of(
        self,
        allowed: &[Self],
        document: DocumentType,
        action: &'static str,
    ) -> DomainResult<()> {
        if allowed.contains(&self) {
            Ok(())
        } else {
            Err(DomainError::invalid_transition(document, self.label(), action))
        }
    }
}

/// A persisted, approval-gated document driving stock movements.
pub trait WorkflowDocument:
    Clone + core::fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    type Status: WorkflowStatus;

    const DOCUMENT_TYPE: DocumentType;

    fn document_id(&self) -> Uuid;

    fn code(&self) -> &str;

    fn status(&self) -> Self::Status;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_zero_padded_to_five_digits() {
        assert_eq!(CodeSeries::Adjustment.format(1), "ADJ-00001");
        assert_eq!(CodeSeries::Transfer.format(42), "TR-00042");
        assert_eq!(CodeSeries::Return.format(99_999), "RET-99999");
        assert_eq!(CodeSeries::InventoryTransaction.format(123_456), "IT-123456");
    }

    #[test]
    fn document_type_parses_its_own_label() {
        for ty in [
            DocumentType::Adjustment,
            DocumentType::Transfer,
            DocumentType::Return,
            DocumentType::PurchaseOrder,
            DocumentType::SalesOrder,
            DocumentType::Manual,
        ] {
            assert_eq!(ty.as_str().parse::<DocumentType>().unwrap(), ty);
        }
        assert!("Invoice".parse::<DocumentType>().is_err());
    }
}
