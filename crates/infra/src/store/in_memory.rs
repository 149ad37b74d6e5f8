use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};
use uuid::Uuid;

use stockflow_core::{DocumentType, LedgerEntryId, WarehouseId};
use stockflow_inventory::{LedgerEntry, StockKey, StockSnapshot};

use super::r#trait::{InventoryStore, StoreError, StoreTx, StoredDocument};

type DocumentKey = (DocumentType, Uuid);

#[derive(Debug, Default)]
struct State {
    snapshots: BTreeMap<StockKey, StockSnapshot>,
    ledger: Vec<LedgerEntry>,
    ledger_ids: HashSet<LedgerEntryId>,
    documents: HashMap<DocumentKey, StoredDocument>,
    sequences: HashMap<String, u64>,
}

/// In-memory transactional inventory store.
///
/// Intended for tests/dev. A transaction owns the single write lock for its
/// whole lifetime, so transactions are fully serialized; reads outside a
/// transaction wait for the running one to finish.
#[derive(Debug, Clone)]
pub struct InMemoryInventoryStore {
    state: Arc<RwLock<State>>,
    lock_timeout: Duration,
}

impl Default for InMemoryInventoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(Duration::from_secs(5))
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
            lock_timeout,
        }
    }

    async fn write_guard(&self) -> Result<OwnedRwLockWriteGuard<State>, StoreError> {
        tokio::time::timeout(self.lock_timeout, self.state.clone().write_owned())
            .await
            .map_err(|_| {
                StoreError::Timeout(format!(
                    "waited {}ms for the store lock",
                    self.lock_timeout.as_millis()
                ))
            })
    }

    async fn read<T>(&self, f: impl FnOnce(&State) -> T) -> Result<T, StoreError> {
        let guard = tokio::time::timeout(self.lock_timeout, self.state.read())
            .await
            .map_err(|_| {
                StoreError::Timeout(format!(
                    "waited {}ms for the store lock",
                    self.lock_timeout.as_millis()
                ))
            })?;
        Ok(f(&guard))
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<InMemoryTx, StoreError> {
        let guard = self.write_guard().await?;
        Ok(InMemoryTx {
            guard,
            staged: Staged::default(),
        })
    }

    async fn snapshot(&self, key: StockKey) -> Result<Option<StockSnapshot>, StoreError> {
        self.read(|state| state.snapshots.get(&key).cloned()).await
    }

    async fn snapshots_for_warehouse(
        &self,
        warehouse_id: WarehouseId,
    ) -> Result<Vec<StockSnapshot>, StoreError> {
        self.read(|state| {
            state
                .snapshots
                .values()
                .filter(|s| s.warehouse_id() == warehouse_id)
                .cloned()
                .collect()
        })
        .await
    }

    async fn ledger_for(&self, key: StockKey) -> Result<Vec<LedgerEntry>, StoreError> {
        self.read(|state| state.ledger.iter().filter(|e| e.key() == key).cloned().collect())
            .await
    }

    async fn ledger_for_document(
        &self,
        document_type: DocumentType,
        document_id: Uuid,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        self.read(|state| {
            state
                .ledger
                .iter()
                .filter(|e| {
                    e.reference.document_type == document_type
                        && e.reference.document_id == document_id
                })
                .cloned()
                .collect()
        })
        .await
    }

    async fn load_document(
        &self,
        document_type: DocumentType,
        id: Uuid,
    ) -> Result<Option<StoredDocument>, StoreError> {
        self.read(|state| state.documents.get(&(document_type, id)).cloned())
            .await
    }

    async fn next_sequence(&self, name: &str) -> Result<u64, StoreError> {
        let mut guard = self.write_guard().await?;
        let value = guard.sequences.entry(name.to_string()).or_insert(0);
        *value += 1;
        Ok(*value)
    }
}

/// Writes buffered by an open transaction. `None` marks a deleted document.
#[derive(Debug, Default)]
struct Staged {
    snapshots: BTreeMap<StockKey, StockSnapshot>,
    ledger: Vec<LedgerEntry>,
    ledger_ids: HashSet<LedgerEntryId>,
    documents: HashMap<DocumentKey, Option<StoredDocument>>,
}

/// Open transaction on [`InMemoryInventoryStore`].
pub struct InMemoryTx {
    guard: OwnedRwLockWriteGuard<State>,
    staged: Staged,
}

impl InMemoryTx {
    fn current_snapshot(&self, key: &StockKey) -> Option<&StockSnapshot> {
        self.staged
            .snapshots
            .get(key)
            .or_else(|| self.guard.snapshots.get(key))
    }

    fn current_document(&self, key: &DocumentKey) -> Option<&StoredDocument> {
        match self.staged.documents.get(key) {
            Some(staged) => staged.as_ref(),
            None => self.guard.documents.get(key),
        }
    }

    fn ledger_contains(&self, id: LedgerEntryId) -> bool {
        self.staged.ledger_ids.contains(&id) || self.guard.ledger_ids.contains(&id)
    }

    fn check_status(
        &self,
        key: &DocumentKey,
        expected_status: &str,
    ) -> Result<(), StoreError> {
        let current = self.current_document(key).ok_or_else(|| {
            StoreError::NotFound(format!("{} {}", key.0, key.1))
        })?;
        if current.status != expected_status {
            return Err(StoreError::Conflict(format!(
                "{} {} is '{}', expected '{}'",
                key.0, key.1, current.status, expected_status
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreTx for InMemoryTx {
    async fn snapshot_for_update(&mut self, key: StockKey) -> Result<Option<StockSnapshot>, StoreError> {
        Ok(self.current_snapshot(&key).cloned())
    }

    async fn insert_snapshot(&mut self, snapshot: &StockSnapshot) -> Result<(), StoreError> {
        let key = snapshot.key();
        if self.current_snapshot(&key).is_some() {
            return Err(StoreError::Conflict(format!(
                "snapshot for product {} in warehouse {} already exists",
                key.product_id, key.warehouse_id
            )));
        }
        self.staged.snapshots.insert(key, snapshot.clone());
        Ok(())
    }

    async fn update_snapshot(&mut self, snapshot: &StockSnapshot) -> Result<(), StoreError> {
        let key = snapshot.key();
        if self.current_snapshot(&key).is_none() {
            return Err(StoreError::NotFound(format!(
                "snapshot for product {} in warehouse {}",
                key.product_id, key.warehouse_id
            )));
        }
        self.staged.snapshots.insert(key, snapshot.clone());
        Ok(())
    }

    async fn append_ledger(&mut self, entry: &LedgerEntry) -> Result<(), StoreError> {
        if self.ledger_contains(entry.id) {
            return Err(StoreError::Conflict(format!("ledger entry {} already exists", entry.id)));
        }
        self.staged.ledger_ids.insert(entry.id);
        self.staged.ledger.push(entry.clone());
        Ok(())
    }

    async fn load_document_for_update(
        &mut self,
        document_type: DocumentType,
        id: Uuid,
    ) -> Result<Option<StoredDocument>, StoreError> {
        Ok(self.current_document(&(document_type, id)).cloned())
    }

    async fn insert_document(&mut self, document: &StoredDocument) -> Result<(), StoreError> {
        let key = (document.document_type, document.id);
        if self.current_document(&key).is_some() {
            return Err(StoreError::Conflict(format!(
                "{} {} already exists",
                document.document_type, document.id
            )));
        }
        self.staged.documents.insert(key, Some(document.clone()));
        Ok(())
    }

    async fn update_document(
        &mut self,
        document: &StoredDocument,
        expected_status: &str,
    ) -> Result<(), StoreError> {
        let key = (document.document_type, document.id);
        self.check_status(&key, expected_status)?;
        self.staged.documents.insert(key, Some(document.clone()));
        Ok(())
    }

    async fn delete_document(
        &mut self,
        document_type: DocumentType,
        id: Uuid,
        expected_status: &str,
    ) -> Result<(), StoreError> {
        let key = (document_type, id);
        self.check_status(&key, expected_status)?;
        self.staged.documents.insert(key, None);
        Ok(())
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        let staged = std::mem::take(&mut self.staged);
        let state = &mut *self.guard;
        state.snapshots.extend(staged.snapshots);
        state.ledger.extend(staged.ledger);
        state.ledger_ids.extend(staged.ledger_ids);
        for (key, document) in staged.documents {
            match document {
                Some(document) => {
                    state.documents.insert(key, document);
                }
                None => {
                    state.documents.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stockflow_core::{ProductId, UserId};
    use stockflow_inventory::{plan_movement, DocumentReference, EntryStamp, MovementRequest, MovementType, StockThresholds};

    fn snapshot(quantity: i64) -> StockSnapshot {
        let key = StockKey::new(ProductId::new(), WarehouseId::new());
        StockSnapshot::restore(key, quantity, StockThresholds::new(1, 10).unwrap(), Utc::now())
    }

    #[tokio::test]
    async fn uncommitted_writes_are_discarded() {
        let store = InMemoryInventoryStore::new();
        let snap = snapshot(5);

        let mut tx = store.begin().await.unwrap();
        tx.insert_snapshot(&snap).await.unwrap();
        assert!(tx.snapshot_for_update(snap.key()).await.unwrap().is_some());
        drop(tx);

        assert!(store.snapshot(snap.key()).await.unwrap().is_none());

        let mut tx = store.begin().await.unwrap();
        tx.insert_snapshot(&snap).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.snapshot(snap.key()).await.unwrap(), Some(snap));
    }

    #[tokio::test]
    async fn second_transaction_times_out_while_first_is_open() {
        let store = InMemoryInventoryStore::with_lock_timeout(Duration::from_millis(20));
        let _held = store.begin().await.unwrap();

        let err = store.begin().await.err().unwrap();
        assert!(matches!(err, StoreError::Timeout(_)));
    }

    #[tokio::test]
    async fn conditional_document_update_detects_stale_status() {
        let store = InMemoryInventoryStore::new();
        let doc = StoredDocument {
            document_type: DocumentType::Transfer,
            id: Uuid::now_v7(),
            code: "TR-00001".into(),
            status: "Pending".into(),
            body: serde_json::json!({}),
        };

        let mut tx = store.begin().await.unwrap();
        tx.insert_document(&doc).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let mut next = doc.clone();
        next.status = "Approved".into();
        assert!(matches!(
            tx.update_document(&next, "Draft").await,
            Err(StoreError::Conflict(_))
        ));
        tx.update_document(&next, "Pending").await.unwrap();
        tx.commit().await.unwrap();

        let stored = store.load_document(DocumentType::Transfer, doc.id).await.unwrap().unwrap();
        assert_eq!(stored.status, "Approved");
    }

    #[tokio::test]
    async fn duplicate_ledger_ids_are_rejected_before_and_after_commit() {
        let store = InMemoryInventoryStore::new();
        let snap = snapshot(5);
        let request = MovementRequest::new(
            MovementType::Purchase,
            snap.product_id(),
            snap.warehouse_id(),
            3,
            UserId::new(),
            DocumentReference::new(DocumentType::Manual, Uuid::now_v7(), "MAN-1"),
        );
        let planned = plan_movement(Some(&snap), &request, snap.thresholds(), EntryStamp::new("IT-00001", Utc::now())).unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.append_ledger(&planned.entry).await.unwrap();
        assert!(matches!(tx.append_ledger(&planned.entry).await, Err(StoreError::Conflict(_))));
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(matches!(tx.append_ledger(&planned.entry).await, Err(StoreError::Conflict(_))));
        drop(tx);

        assert_eq!(store.ledger_for(snap.key()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sequences_start_at_one_and_increment() {
        let store = InMemoryInventoryStore::new();
        assert_eq!(store.next_sequence("TR").await.unwrap(), 1);
        assert_eq!(store.next_sequence("TR").await.unwrap(), 2);
        assert_eq!(store.next_sequence("ADJ").await.unwrap(), 1);
    }
}
