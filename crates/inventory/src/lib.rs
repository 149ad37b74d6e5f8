//! Inventory movement domain module.
//!
//! This crate contains the stock snapshot, the append-only ledger entry and
//! the movement rules, implemented purely as deterministic domain logic (no IO,
//! no storage).

pub mod ledger;
pub mod movement;
pub mod snapshot;

pub use ledger::{DocumentReference, LedgerEntry, MovementRule, MovementType, SignRule};
pub use movement::{plan_audit_entry, plan_movement, EntryStamp, MovementRequest, PlannedMovement};
pub use snapshot::{compute_stock_status, StockKey, StockSnapshot, StockStatus, StockThresholds};
