use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockflow_core::{DocumentType, DomainError, DomainResult, LedgerEntryId, ProductId, UserId, WarehouseId};

use crate::snapshot::StockKey;

/// Required sign of a movement's quantity change.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SignRule {
    Positive,
    Negative,
    Either,
}

/// Static rules attached to each movement type.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MovementRule {
    pub sign: SignRule,
    /// Whether a positive change may create the snapshot lazily.
    pub creates_snapshot: bool,
    /// Transfer legs must carry both warehouses of the route.
    pub transfer_leg: bool,
}

/// Kind of stock-affecting event recorded in the ledger.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementType {
    Purchase,
    Sale,
    Adjustment,
    #[serde(rename = "Transfer Out")]
    TransferOut,
    #[serde(rename = "Transfer In")]
    TransferIn,
    Return,
    Damaged,
    Expired,
    Initial,
}

// Indexed by `MovementType as usize`; keep in declaration order.
const MOVEMENT_RULES: [MovementRule; 9] = [
    // Purchase
    MovementRule { sign: SignRule::Positive, creates_snapshot: true, transfer_leg: false },
    // Sale
    MovementRule { sign: SignRule::Negative, creates_snapshot: false, transfer_leg: false },
    // Adjustment
    MovementRule { sign: SignRule::Either, creates_snapshot: true, transfer_leg: false },
    // TransferOut
    MovementRule { sign: SignRule::Negative, creates_snapshot: false, transfer_leg: true },
    // TransferIn
    MovementRule { sign: SignRule::Positive, creates_snapshot: true, transfer_leg: true },
    // Return (restocking requires an existing snapshot)
    MovementRule { sign: SignRule::Either, creates_snapshot: false, transfer_leg: false },
    // Damaged
    MovementRule { sign: SignRule::Negative, creates_snapshot: false, transfer_leg: false },
    // Expired
    MovementRule { sign: SignRule::Negative, creates_snapshot: false, transfer_leg: false },
    // Initial
    MovementRule { sign: SignRule::Positive, creates_snapshot: true, transfer_leg: false },
];

impl MovementType {
    pub const ALL: [MovementType; 9] = [
        MovementType::Purchase,
        MovementType::Sale,
        MovementType::Adjustment,
        MovementType::TransferOut,
        MovementType::TransferIn,
        MovementType::Return,
        MovementType::Damaged,
        MovementType::Expired,
        MovementType::Initial,
    ];

    pub fn rule(self) -> MovementRule {
        MOVEMENT_RULES[self as usize]
    }

    pub fn label(&self) -> &'static str {
        match self {
            MovementType::Purchase => "Purchase",
            MovementType::Sale => "Sale",
            MovementType::Adjustment => "Adjustment",
            MovementType::TransferOut => "Transfer Out",
            MovementType::TransferIn => "Transfer In",
            MovementType::Return => "Return",
            MovementType::Damaged => "Damaged",
            MovementType::Expired => "Expired",
            MovementType::Initial => "Initial",
        }
    }

    /// Check a quantity change against this type's sign rule.
    pub fn validate_change(self, quantity_change: i64) -> DomainResult<()> {
        if quantity_change == 0 {
            return Err(DomainError::validation("quantity change cannot be zero"));
        }
        if quantity_change == i64::MIN {
            return Err(DomainError::validation("quantity change out of range"));
        }
        match self.rule().sign {
            SignRule::Positive if quantity_change < 0 => Err(DomainError::validation(format!(
                "{} requires a positive quantity change",
                self.label()
            ))),
            SignRule::Negative if quantity_change > 0 => Err(DomainError::validation(format!(
                "{} requires a negative quantity change",
                self.label()
            ))),
            _ => Ok(()),
        }
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for MovementType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MovementType::ALL
            .into_iter()
            .find(|t| t.label() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown movement type '{s}'")))
    }
}

/// Pointer from a ledger entry back to the document that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentReference {
    pub document_type: DocumentType,
    pub document_id: Uuid,
    pub document_code: String,
}

impl DocumentReference {
    pub fn new(document_type: DocumentType, document_id: Uuid, document_code: impl Into<String>) -> Self {
        Self {
            document_type,
            document_id,
            document_code: document_code.into(),
        }
    }
}

/// Immutable record of a single quantity change and its cause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    /// Human-readable code (`IT-00001`).
    pub code: String,
    pub movement_type: MovementType,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity_before: i64,
    pub quantity_change: i64,
    pub quantity_after: i64,
    pub reference: DocumentReference,
    pub from_warehouse: Option<WarehouseId>,
    pub to_warehouse: Option<WarehouseId>,
    pub performed_by: UserId,
    pub recorded_at: DateTime<Utc>,
    pub notes: Option<String>,
}

impl LedgerEntry {
    pub fn key(&self) -> StockKey {
        StockKey::new(self.product_id, self.warehouse_id)
    }

    /// Record-keeping entry that did not move stock.
    pub fn is_audit_only(&self) -> bool {
        self.quantity_change == 0
    }
}
