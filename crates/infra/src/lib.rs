//! Infrastructure layer: storage, the movement coordinator and the workflow
//! services built on it.

pub mod config;
pub mod coordinator;
pub mod directory;
pub mod engine;
pub mod error;
pub mod sequence;
pub mod services;
pub mod store;


pub use config::{ConfigError, InventoryConfig};
pub use coordinator::{MovementCoordinator, MovementOutcome};
pub use directory::{Directory, InMemoryDirectory};
pub use engine::InventoryEngine;
pub use error::{ServiceError, ServiceResult};
pub use sequence::{CodeAllocator, StoreSequenceAllocator};
pub use services::{AdjustmentService, ReturnService, TransferService, WorkflowOutcome};
pub use store::{
    InMemoryInventoryStore, InventoryStore, PostgresInventoryStore, StoreError, StoreTx,
    StoredDocument,
};
