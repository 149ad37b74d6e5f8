use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};

use stockflow_core::{CodeSeries, ProductId, TransferId, UserId, WorkflowDocument, WorkflowStatus};
use stockflow_inventory::LedgerEntry;
use stockflow_transfers::{NewTransfer, ReceiptLine, Transfer, TransportInfo};

use crate::coordinator::{finish, MovementCoordinator};
use crate::directory::{require_product, require_user, require_warehouse};
use crate::error::{ServiceError, ServiceResult};
use crate::services::{delete, insert, load, load_for_update, save, transition, WorkflowOutcome};
use crate::store::InventoryStore;

/// Inter-warehouse transfers with ship and (partial) receive phases.
pub struct TransferService<S: InventoryStore> {
    coordinator: Arc<MovementCoordinator<S>>,
}

impl<S: InventoryStore> TransferService<S> {
    pub fn new(coordinator: Arc<MovementCoordinator<S>>) -> Self {
        Self { coordinator }
    }

    #[instrument(
        skip(self, input),
        fields(from = %input.from_warehouse, to = %input.to_warehouse, items = input.items.len()),
        err
    )]
    pub async fn create(&self, input: NewTransfer) -> ServiceResult<WorkflowOutcome<Transfer>> {
        if input.from_warehouse == input.to_warehouse {
            return Err(ServiceError::Validation(
                "source and destination warehouses must differ".into(),
            ));
        }
        let directory = self.coordinator.directory();
        require_warehouse(directory, input.from_warehouse).await?;
        require_warehouse(directory, input.to_warehouse).await?;
        require_user(directory, input.requested_by).await?;
        for (product_id, _) in &input.items {
            require_product(directory, *product_id).await?;
        }

        let code = self.coordinator.codes().next_code(CodeSeries::Transfer).await?;
        let transfer = Transfer::create(TransferId::new(), code, input, Utc::now())?;
        let transfer = insert(&self.coordinator, transfer).await?;
        Ok(WorkflowOutcome::status_only(transfer))
    }

    pub async fn get(&self, id: TransferId) -> ServiceResult<Transfer> {
        load(&self.coordinator, *id.as_uuid()).await
    }

    #[instrument(skip(self, items), err)]
    pub async fn update_items(
        &self,
        id: TransferId,
        items: Vec<(ProductId, i64)>,
    ) -> ServiceResult<WorkflowOutcome<Transfer>> {
        for (product_id, _) in &items {
            require_product(self.coordinator.directory(), *product_id).await?;
        }
        transition(&self.coordinator, *id.as_uuid(), "update", move |t: &mut Transfer, now| {
            t.update_items(&items, now)
        })
        .await
    }

    #[instrument(skip(self), err)]
    pub async fn submit(&self, id: TransferId) -> ServiceResult<WorkflowOutcome<Transfer>> {
        transition(&self.coordinator, *id.as_uuid(), "submit", |t: &mut Transfer, now| t.submit(now)).await
    }

    #[instrument(skip(self), err)]
    pub async fn approve(&self, id: TransferId, approved_by: UserId) -> ServiceResult<WorkflowOutcome<Transfer>> {
        require_user(self.coordinator.directory(), approved_by).await?;
        transition(&self.coordinator, *id.as_uuid(), "approve", move |t: &mut Transfer, now| {
            t.approve(approved_by, now)
        })
        .await
    }

    #[instrument(skip(self), err)]
    pub async fn revert_to_draft(&self, id: TransferId) -> ServiceResult<WorkflowOutcome<Transfer>> {
        transition(&self.coordinator, *id.as_uuid(), "revert to draft", |t: &mut Transfer, now| {
            t.revert_to_draft(now)
        })
        .await
    }

    #[instrument(skip(self), err)]
    pub async fn cancel(&self, id: TransferId) -> ServiceResult<WorkflowOutcome<Transfer>> {
        transition(&self.coordinator, *id.as_uuid(), "cancel", |t: &mut Transfer, now| t.cancel(now)).await
    }

    /// Move the full ordered quantity out of the source warehouse.
    ///
    /// All items ship or none do: one short item fails the whole call with
    /// `InsufficientStock` and leaves the transfer Approved.
    #[instrument(skip(self, transport_info), err)]
    pub async fn ship(
        &self,
        id: TransferId,
        shipped_by: UserId,
        transport_info: Option<TransportInfo>,
    ) -> ServiceResult<WorkflowOutcome<Transfer>> {
        require_user(self.coordinator.directory(), shipped_by).await?;

        let preview: Transfer = self.get(id).await?;
        let planned = preview.shipment_movements(shipped_by)?.len();
        let mut stamps = self.coordinator.stamps(planned).await?.into_iter();

        let mut tx = self.coordinator.store().begin().await?;
        let result = async {
            let mut transfer: Transfer = load_for_update(&mut tx, *id.as_uuid()).await?;
            let expected = transfer.status().label();

            let mut entries = Vec::new();
            for request in transfer.shipment_movements(shipped_by)? {
                let stamp = stamps
                    .next()
                    .ok_or_else(|| ServiceError::Conflict("transfer changed during shipment".into()))?;
                let outcome = self.coordinator.apply_in_tx(&mut tx, &request, stamp).await?;
                entries.push(outcome.entry);
            }

            transfer.mark_shipped(shipped_by, transport_info, Utc::now())?;
            save(&mut tx, &transfer, expected).await?;
            Ok::<_, ServiceError>(WorkflowOutcome {
                document: transfer,
                entries,
            })
        }
        .await;
        let outcome = finish(tx, result).await?;

        info!(code = outcome.document.code(), movements = outcome.entries.len(), "transfer shipped");
        Ok(outcome)
    }

    /// Record received quantities at the destination.
    ///
    /// `lines` are deltas for this call, not running totals. A call whose
    /// lines are all zero changes nothing.
    #[instrument(skip(self, lines), fields(lines = lines.len()), err)]
    pub async fn receive(
        &self,
        id: TransferId,
        lines: Vec<ReceiptLine>,
        received_by: UserId,
    ) -> ServiceResult<WorkflowOutcome<Transfer>> {
        require_user(self.coordinator.directory(), received_by).await?;

        let preview: Transfer = self.get(id).await?;
        let receipt = preview.plan_receipt(&lines, received_by)?;
        if receipt.is_empty() {
            return Ok(WorkflowOutcome::status_only(preview));
        }
        let mut stamps = self.coordinator.stamps(receipt.movements.len()).await?.into_iter();

        let mut tx = self.coordinator.store().begin().await?;
        let result = async {
            let mut transfer: Transfer = load_for_update(&mut tx, *id.as_uuid()).await?;
            let expected = transfer.status().label();
            let receipt = transfer.plan_receipt(&lines, received_by)?;

            let mut entries = Vec::new();
            for request in &receipt.movements {
                let stamp = stamps
                    .next()
                    .ok_or_else(|| ServiceError::Conflict("transfer changed during receipt".into()))?;
                let outcome = self.coordinator.apply_in_tx(&mut tx, request, stamp).await?;
                entries.push(outcome.entry);
            }

            transfer.apply_receipt(&receipt, received_by, Utc::now())?;
            save(&mut tx, &transfer, expected).await?;
            Ok::<_, ServiceError>(WorkflowOutcome {
                document: transfer,
                entries,
            })
        }
        .await;
        let outcome = finish(tx, result).await?;

        info!(
            code = outcome.document.code(),
            status = outcome.document.status().label(),
            received = outcome.document.total_received(),
            ordered = outcome.document.total_ordered(),
            "transfer receipt recorded"
        );
        Ok(outcome)
    }

    #[instrument(skip(self), err)]
    pub async fn delete(&self, id: TransferId) -> ServiceResult<()> {
        delete(&self.coordinator, *id.as_uuid(), |t: &Transfer| t.ensure_deletable()).await
    }

    /// Ledger entries written by this transfer (both legs).
    pub async fn entries(&self, id: TransferId) -> ServiceResult<Vec<LedgerEntry>> {
        self.coordinator
            .ledger_for_document(Transfer::DOCUMENT_TYPE, *id.as_uuid())
            .await
    }
}

impl<S: InventoryStore> Clone for TransferService<S> {
    fn clone(&self) -> Self {
        Self {
            coordinator: Arc::clone(&self.coordinator),
        }
    }
}
