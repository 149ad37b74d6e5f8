//! Human-readable code allocation (`ADJ-00001`, `IT-00042`, ...).

use async_trait::async_trait;

use stockflow_core::CodeSeries;

use crate::error::ServiceResult;
use crate::store::InventoryStore;

/// Monotonic code allocator, one counter per series.
#[async_trait]
pub trait CodeAllocator: Send + Sync {
    async fn next_code(&self, series: CodeSeries) -> ServiceResult<String>;
}

/// Allocator backed by the store's counter table.
///
/// Each call runs in its own short transaction, so it must be called before
/// (never inside) a movement transaction.
#[derive(Debug, Clone)]
pub struct StoreSequenceAllocator<S> {
    store: S,
}

impl<S> StoreSequenceAllocator<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: InventoryStore> CodeAllocator for StoreSequenceAllocator<S> {
    async fn next_code(&self, series: CodeSeries) -> ServiceResult<String> {
        let value = self.store.next_sequence(series.prefix()).await?;
        Ok(series.format(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryInventoryStore;

    #[tokio::test]
    async fn series_are_independent_and_zero_padded() {
        let allocator = StoreSequenceAllocator::new(InMemoryInventoryStore::new());
        assert_eq!(allocator.next_code(CodeSeries::Transfer).await.unwrap(), "TR-00001");
        assert_eq!(allocator.next_code(CodeSeries::Transfer).await.unwrap(), "TR-00002");
        assert_eq!(allocator.next_code(CodeSeries::Adjustment).await.unwrap(), "ADJ-00001");
        assert_eq!(allocator.next_code(CodeSeries::InventoryTransaction).await.unwrap(), "IT-00001");
    }
}
