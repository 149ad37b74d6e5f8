//! Inter-warehouse transfer workflow.
//!
//! This crate contains business rules for transfers (approval, shipment and
//! partial receipt), implemented purely as deterministic domain logic (no IO,
//! no storage).

pub mod transfer;

pub use transfer::{
    NewTransfer, Receipt, ReceiptLine, Transfer, TransferItem, TransferStatus, TransportInfo,
};
