//! Movement Coordinator: the only writer of snapshot/ledger pairs.
//!
//! Every movement runs as:
//!
//! ```text
//! validate request (no IO)
//!   ↓
//! check product/warehouse in the directory
//!   ↓
//! allocate ledger code (own short transaction)
//!   ↓
//! begin → lock snapshot → plan → write snapshot + ledger entry → commit
//! ```
//!
//! The insufficiency check happens on the snapshot read inside the
//! transaction, never before it. Workflow services reuse [`MovementCoordinator::apply_in_tx`]
//! so that all movements of one workflow step share a single transaction.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use stockflow_core::{CodeSeries, DocumentType, ProductId, UserId, WarehouseId};
use stockflow_inventory::{
    plan_audit_entry, plan_movement, DocumentReference, EntryStamp, LedgerEntry, MovementRequest,
    MovementType, StockKey, StockSnapshot, StockThresholds,
};

use crate::directory::{require_product, require_warehouse, Directory};
use crate::error::{ServiceError, ServiceResult};
use crate::sequence::CodeAllocator;
use crate::store::{InventoryStore, StoreTx};

/// Result of one movement: the snapshot after the change and its ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementOutcome {
    pub snapshot: StockSnapshot,
    pub entry: LedgerEntry,
}

pub struct MovementCoordinator<S: InventoryStore> {
    store: S,
    codes: Arc<dyn CodeAllocator>,
    directory: Arc<dyn Directory>,
    defaults: StockThresholds,
}

impl<S: InventoryStore> MovementCoordinator<S> {
    pub fn new(
        store: S,
        codes: Arc<dyn CodeAllocator>,
        directory: Arc<dyn Directory>,
        defaults: StockThresholds,
    ) -> Self {
        Self {
            store,
            codes,
            directory,
            defaults,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub(crate) fn codes(&self) -> &dyn CodeAllocator {
        self.codes.as_ref()
    }

    pub(crate) fn directory(&self) -> &dyn Directory {
        self.directory.as_ref()
    }

    /// Apply one movement in its own transaction.
    #[instrument(
        skip(self, request),
        fields(
            movement_type = %request.movement_type,
            product_id = %request.product_id,
            warehouse_id = %request.warehouse_id,
            quantity_change = request.quantity_change
        ),
        err
    )]
    pub async fn apply_movement(&self, request: MovementRequest) -> ServiceResult<MovementOutcome> {
        request.validate()?;
        require_product(self.directory(), request.product_id).await?;
        require_warehouse(self.directory(), request.warehouse_id).await?;

        let stamp = self.stamps(1).await?.remove(0);
        let mut tx = self.store.begin().await?;
        debug!("movement transaction opened");
        let result = self.apply_in_tx(&mut tx, &request, stamp).await;
        let outcome = finish(tx, result).await?;

        info!(
            code = %outcome.entry.code,
            quantity_before = outcome.entry.quantity_before,
            quantity_after = outcome.entry.quantity_after,
            stock_status = %outcome.snapshot.stock_status(),
            "movement applied"
        );
        Ok(outcome)
    }

    /// Write a zero-change record-keeping entry in its own transaction.
    #[instrument(
        skip(self, request),
        fields(product_id = %request.product_id, warehouse_id = %request.warehouse_id),
        err
    )]
    pub async fn record_audit_entry(&self, request: MovementRequest) -> ServiceResult<LedgerEntry> {
        request.validate_route()?;
        require_product(self.directory(), request.product_id).await?;
        require_warehouse(self.directory(), request.warehouse_id).await?;

        let stamp = self.stamps(1).await?.remove(0);
        let mut tx = self.store.begin().await?;
        let result = self.record_audit_in_tx(&mut tx, &request, stamp).await;
        let entry = finish(tx, result).await?;
        info!(code = %entry.code, "audit entry recorded");
        Ok(entry)
    }

    /// Plan and write one movement inside a caller-owned transaction.
    pub(crate) async fn apply_in_tx(
        &self,
        tx: &mut S::Tx,
        request: &MovementRequest,
        stamp: EntryStamp,
    ) -> ServiceResult<MovementOutcome> {
        let current = tx.snapshot_for_update(request.key()).await?;
        let planned = plan_movement(current.as_ref(), request, self.defaults, stamp)?;

        if planned.created_snapshot {
            tx.insert_snapshot(&planned.snapshot).await?;
        } else {
            tx.update_snapshot(&planned.snapshot).await?;
        }
        tx.append_ledger(&planned.entry).await?;

        Ok(MovementOutcome {
            snapshot: planned.snapshot,
            entry: planned.entry,
        })
    }

    pub(crate) async fn record_audit_in_tx(
        &self,
        tx: &mut S::Tx,
        request: &MovementRequest,
        stamp: EntryStamp,
    ) -> ServiceResult<LedgerEntry> {
        let current = tx.snapshot_for_update(request.key()).await?;
        let entry = plan_audit_entry(current.as_ref(), request, stamp)?;
        tx.append_ledger(&entry).await?;
        Ok(entry)
    }

    /// Allocate ledger codes up front; this must happen outside any open
    /// transaction on the same store.
    pub(crate) async fn stamps(&self, count: usize) -> ServiceResult<Vec<EntryStamp>> {
        let now = Utc::now();
        let mut stamps = Vec::with_capacity(count);
        for _ in 0..count {
            let code = self.codes.next_code(CodeSeries::InventoryTransaction).await?;
            stamps.push(EntryStamp::new(code, now));
        }
        Ok(stamps)
    }

    /// Change reorder thresholds. Writes no ledger entry; creates an empty
    /// snapshot when the key is new.
    #[instrument(skip(self), fields(product_id = %product_id, warehouse_id = %warehouse_id), err)]
    pub async fn set_thresholds(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        min_stock_level: i64,
        max_stock_level: i64,
    ) -> ServiceResult<StockSnapshot> {
        let thresholds = StockThresholds::new(min_stock_level, max_stock_level)?;
        require_product(self.directory(), product_id).await?;
        require_warehouse(self.directory(), warehouse_id).await?;

        let key = StockKey::new(product_id, warehouse_id);
        let mut tx = self.store.begin().await?;
        let result: ServiceResult<StockSnapshot> = async {
            let now = Utc::now();
            match tx.snapshot_for_update(key).await? {
                Some(current) => {
                    let updated = current.with_thresholds(thresholds, now);
                    tx.update_snapshot(&updated).await?;
                    Ok::<_, ServiceError>(updated)
                }
                None => {
                    let created = StockSnapshot::empty(key, thresholds, now);
                    tx.insert_snapshot(&created).await?;
                    Ok::<_, ServiceError>(created)
                }
            }
        }
        .await;
        let snapshot = finish(tx, result).await?;
        info!(stock_status = %snapshot.stock_status(), "thresholds updated");
        Ok(snapshot)
    }

    pub async fn purchase(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity: i64,
        performed_by: UserId,
        reference: DocumentReference,
        notes: Option<String>,
    ) -> ServiceResult<MovementOutcome> {
        self.signed(MovementType::Purchase, product_id, warehouse_id, positive(quantity)?, performed_by, reference, notes)
            .await
    }

    pub async fn sale(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity: i64,
        performed_by: UserId,
        reference: DocumentReference,
        notes: Option<String>,
    ) -> ServiceResult<MovementOutcome> {
        self.signed(MovementType::Sale, product_id, warehouse_id, -positive(quantity)?, performed_by, reference, notes)
            .await
    }

    /// Signed correction; `quantity_change` may be negative.
    pub async fn adjustment(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity_change: i64,
        performed_by: UserId,
        reference: DocumentReference,
        notes: Option<String>,
    ) -> ServiceResult<MovementOutcome> {
        self.signed(MovementType::Adjustment, product_id, warehouse_id, quantity_change, performed_by, reference, notes)
            .await
    }

    pub async fn transfer_out(
        &self,
        product_id: ProductId,
        from_warehouse: WarehouseId,
        to_warehouse: WarehouseId,
        quantity: i64,
        performed_by: UserId,
        reference: DocumentReference,
    ) -> ServiceResult<MovementOutcome> {
        let request = MovementRequest::new(
            MovementType::TransferOut,
            product_id,
            from_warehouse,
            -positive(quantity)?,
            performed_by,
            reference,
        )
        .with_route(from_warehouse, to_warehouse);
        self.apply_movement(request).await
    }

    pub async fn transfer_in(
        &self,
        product_id: ProductId,
        from_warehouse: WarehouseId,
        to_warehouse: WarehouseId,
        quantity: i64,
        performed_by: UserId,
        reference: DocumentReference,
    ) -> ServiceResult<MovementOutcome> {
        let request = MovementRequest::new(
            MovementType::TransferIn,
            product_id,
            to_warehouse,
            positive(quantity)?,
            performed_by,
            reference,
        )
        .with_route(from_warehouse, to_warehouse);
        self.apply_movement(request).await
    }

    /// Put returned goods back on the shelf. The snapshot must already exist.
    pub async fn return_stock(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity: i64,
        performed_by: UserId,
        reference: DocumentReference,
        notes: Option<String>,
    ) -> ServiceResult<MovementOutcome> {
        self.signed(MovementType::Return, product_id, warehouse_id, positive(quantity)?, performed_by, reference, notes)
            .await
    }

    pub async fn damage(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity: i64,
        performed_by: UserId,
        reference: DocumentReference,
        notes: Option<String>,
    ) -> ServiceResult<MovementOutcome> {
        self.signed(MovementType::Damaged, product_id, warehouse_id, -positive(quantity)?, performed_by, reference, notes)
            .await
    }

    pub async fn expiry(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity: i64,
        performed_by: UserId,
        reference: DocumentReference,
        notes: Option<String>,
    ) -> ServiceResult<MovementOutcome> {
        self.signed(MovementType::Expired, product_id, warehouse_id, -positive(quantity)?, performed_by, reference, notes)
            .await
    }

    /// Opening balance for a key.
    pub async fn initial_stock(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity: i64,
        performed_by: UserId,
        reference: DocumentReference,
    ) -> ServiceResult<MovementOutcome> {
        self.signed(MovementType::Initial, product_id, warehouse_id, positive(quantity)?, performed_by, reference, None)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn signed(
        &self,
        movement_type: MovementType,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity_change: i64,
        performed_by: UserId,
        reference: DocumentReference,
        notes: Option<String>,
    ) -> ServiceResult<MovementOutcome> {
        let request = MovementRequest::new(
            movement_type,
            product_id,
            warehouse_id,
            quantity_change,
            performed_by,
            reference,
        )
        .with_notes(notes);
        self.apply_movement(request).await
    }

    pub async fn snapshot(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> ServiceResult<Option<StockSnapshot>> {
        Ok(self.store.snapshot(StockKey::new(product_id, warehouse_id)).await?)
    }

    pub async fn snapshots_for_warehouse(&self, warehouse_id: WarehouseId) -> ServiceResult<Vec<StockSnapshot>> {
        Ok(self.store.snapshots_for_warehouse(warehouse_id).await?)
    }

    pub async fn ledger_for(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> ServiceResult<Vec<LedgerEntry>> {
        Ok(self.store.ledger_for(StockKey::new(product_id, warehouse_id)).await?)
    }

    pub async fn ledger_for_document(
        &self,
        document_type: DocumentType,
        document_id: Uuid,
    ) -> ServiceResult<Vec<LedgerEntry>> {
        Ok(self.store.ledger_for_document(document_type, document_id).await?)
    }
}

fn positive(quantity: i64) -> ServiceResult<i64> {
    if quantity > 0 {
        Ok(quantity)
    } else {
        Err(ServiceError::Validation(format!(
            "quantity must be positive, got {quantity}"
        )))
    }
}

/// Commit on success, roll back on failure. A failed rollback is logged and
/// the original error returned.
pub(crate) async fn finish<Tx: StoreTx, T>(tx: Tx, result: ServiceResult<T>) -> ServiceResult<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            debug!("transaction committed");
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "rollback failed");
            }
            debug!(error = %err, "transaction rolled back");
            Err(err)
        }
    }
}
