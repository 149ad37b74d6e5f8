//! Transactional storage boundary for snapshots, the ledger and workflow
//! documents.
//!
//! The movement coordinator and workflow services only talk to these traits,
//! so the same code runs against the in-memory store (tests/dev) and Postgres.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::{InMemoryInventoryStore, InMemoryTx};
pub use postgres::{PostgresInventoryStore, PostgresTx};
pub use r#trait::{InventoryStore, StoreError, StoreTx, StoredDocument};
