use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use stockflow_core::{DocumentType, WarehouseId, WorkflowDocument, WorkflowStatus};
use stockflow_inventory::{LedgerEntry, StockKey, StockSnapshot};

/// Storage operation error.
///
/// These are **infrastructure errors** (contention, timeouts, corrupt rows) as
/// opposed to domain errors (validation, insufficient stock).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Concurrent modification: stale status, duplicate key, serialization
    /// failure or deadlock. Safe to retry.
    #[error("write conflict: {0}")]
    Conflict(String),

    /// Lock wait or statement exceeded the configured bound. Safe to retry.
    #[error("transaction timed out: {0}")]
    Timeout(String),

    #[error("record not found: {0}")]
    NotFound(String),

    /// A stored row or document body could not be decoded.
    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// A workflow document as persisted: typed header columns plus a JSON body.
///
/// The status is duplicated out of the body so conditional updates can be
/// expressed without decoding it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub document_type: DocumentType,
    pub id: Uuid,
    pub code: String,
    pub status: String,
    pub body: JsonValue,
}

impl StoredDocument {
    pub fn from_typed<D: WorkflowDocument>(document: &D) -> Result<Self, StoreError> {
        let body = serde_json::to_value(document).map_err(|e| {
            StoreError::Serialization(format!("{} body serialization failed: {e}", D::DOCUMENT_TYPE))
        })?;
        Ok(Self {
            document_type: D::DOCUMENT_TYPE,
            id: document.document_id(),
            code: document.code().to_string(),
            status: document.status().label().to_string(),
            body,
        })
    }

    pub fn into_typed<D: WorkflowDocument>(self) -> Result<D, StoreError> {
        if self.document_type != D::DOCUMENT_TYPE {
            return Err(StoreError::Serialization(format!(
                "document {} is a {}, expected {}",
                self.id,
                self.document_type,
                D::DOCUMENT_TYPE
            )));
        }
        serde_json::from_value(self.body).map_err(|e| {
            StoreError::Serialization(format!("{} {} body decode failed: {e}", self.document_type, self.id))
        })
    }
}

/// Inventory storage with explicit transactions.
///
/// Read methods outside a transaction see committed state only. Anything that
/// needs a read-check-write sequence goes through [`InventoryStore::begin`].
#[async_trait]
pub trait InventoryStore: Send + Sync + 'static {
    type Tx: StoreTx + 'static;

    /// Open a transaction. Implementations bound how long this may wait.
    async fn begin(&self) -> Result<Self::Tx, StoreError>;

    async fn snapshot(&self, key: StockKey) -> Result<Option<StockSnapshot>, StoreError>;

    async fn snapshots_for_warehouse(
        &self,
        warehouse_id: WarehouseId,
    ) -> Result<Vec<StockSnapshot>, StoreError>;

    /// Ledger entries for one key, oldest first.
    async fn ledger_for(&self, key: StockKey) -> Result<Vec<LedgerEntry>, StoreError>;

    /// Ledger entries referencing one workflow document, oldest first.
    async fn ledger_for_document(
        &self,
        document_type: DocumentType,
        document_id: Uuid,
    ) -> Result<Vec<LedgerEntry>, StoreError>;

    async fn load_document(
        &self,
        document_type: DocumentType,
        id: Uuid,
    ) -> Result<Option<StoredDocument>, StoreError>;

    /// Atomically increment and return the named counter (first value is 1).
    ///
    /// Runs in its own short transaction; never call it while holding a
    /// [`StoreTx`] from the same store.
    async fn next_sequence(&self, name: &str) -> Result<u64, StoreError>;
}

/// One unit of work. Dropping it without `commit` discards every write.
#[async_trait]
pub trait StoreTx: Send + Sized {
    /// Read a snapshot and lock it for the rest of the transaction.
    async fn snapshot_for_update(&mut self, key: StockKey) -> Result<Option<StockSnapshot>, StoreError>;

    /// Fails with `Conflict` if the key already exists.
    async fn insert_snapshot(&mut self, snapshot: &StockSnapshot) -> Result<(), StoreError>;

    /// Fails with `NotFound` if the key does not exist.
    async fn update_snapshot(&mut self, snapshot: &StockSnapshot) -> Result<(), StoreError>;

    async fn append_ledger(&mut self, entry: &LedgerEntry) -> Result<(), StoreError>;

    async fn load_document_for_update(
        &mut self,
        document_type: DocumentType,
        id: Uuid,
    ) -> Result<Option<StoredDocument>, StoreError>;

    async fn insert_document(&mut self, document: &StoredDocument) -> Result<(), StoreError>;

    /// Overwrite a document only if its stored status still equals
    /// `expected_status`; `Conflict` otherwise.
    async fn update_document(
        &mut self,
        document: &StoredDocument,
        expected_status: &str,
    ) -> Result<(), StoreError>;

    /// Delete a document only if its stored status still equals `expected_status`.
    async fn delete_document(
        &mut self,
        document_type: DocumentType,
        id: Uuid,
        expected_status: &str,
    ) -> Result<(), StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}
