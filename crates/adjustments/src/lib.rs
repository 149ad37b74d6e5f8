//! Stock adjustment workflow (physical counts, write-offs, corrections).
//!
//! This crate contains business rules for adjustments, implemented purely as
//! deterministic domain logic (no IO, no storage). The infrastructure layer
//! turns the movement plan of a completed adjustment into ledger entries.

pub mod adjustment;

pub use adjustment::{
    Adjustment, AdjustmentItem, AdjustmentReason, AdjustmentStatus, NewAdjustment,
};
