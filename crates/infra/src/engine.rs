//! Wiring: one coordinator shared by the three workflow services.

use std::sync::Arc;

use crate::config::InventoryConfig;
use crate::coordinator::MovementCoordinator;
use crate::directory::Directory;
use crate::sequence::{CodeAllocator, StoreSequenceAllocator};
use crate::services::{AdjustmentService, ReturnService, TransferService};
use crate::store::{InMemoryInventoryStore, InventoryStore};

pub struct InventoryEngine<S: InventoryStore> {
    coordinator: Arc<MovementCoordinator<S>>,
    adjustments: AdjustmentService<S>,
    transfers: TransferService<S>,
    returns: ReturnService<S>,
}

impl<S: InventoryStore + Clone> InventoryEngine<S> {
    /// Build an engine whose codes come from the store's own counters.
    pub fn new(store: S, directory: Arc<dyn Directory>, config: &InventoryConfig) -> Self {
        let codes: Arc<dyn CodeAllocator> = Arc::new(StoreSequenceAllocator::new(store.clone()));
        Self::with_code_allocator(store, directory, codes, config)
    }
}

impl<S: InventoryStore> InventoryEngine<S> {
    pub fn with_code_allocator(
        store: S,
        directory: Arc<dyn Directory>,
        codes: Arc<dyn CodeAllocator>,
        config: &InventoryConfig,
    ) -> Self {
        let coordinator = Arc::new(MovementCoordinator::new(
            store,
            codes,
            directory,
            config.default_thresholds,
        ));
        Self {
            adjustments: AdjustmentService::new(Arc::clone(&coordinator)),
            transfers: TransferService::new(Arc::clone(&coordinator)),
            returns: ReturnService::new(Arc::clone(&coordinator)),
            coordinator,
        }
    }

    pub fn coordinator(&self) -> &MovementCoordinator<S> {
        &self.coordinator
    }

    pub fn adjustments(&self) -> &AdjustmentService<S> {
        &self.adjustments
    }

    pub fn transfers(&self) -> &TransferService<S> {
        &self.transfers
    }

    pub fn returns(&self) -> &ReturnService<S> {
        &self.returns
    }
}

impl InventoryEngine<InMemoryInventoryStore> {
    pub fn in_memory(directory: Arc<dyn Directory>, config: &InventoryConfig) -> Self {
        Self::new(InMemoryInventoryStore::with_lock_timeout(config.tx_timeout), directory, config)
    }
}

impl<S: InventoryStore> Clone for InventoryEngine<S> {
    fn clone(&self) -> Self {
        Self {
            coordinator: Arc::clone(&self.coordinator),
            adjustments: self.adjustments.clone(),
            transfers: self.transfers.clone(),
            returns: self.returns.clone(),
        }
    }
}
