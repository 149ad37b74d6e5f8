use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use stockflow_adjustments::{Adjustment, AdjustmentItem, NewAdjustment};
use stockflow_core::{AdjustmentId, CodeSeries, UserId, WorkflowDocument, WorkflowStatus};
use stockflow_inventory::LedgerEntry;

use crate::coordinator::{finish, MovementCoordinator};
use crate::directory::{require_product, require_user, require_warehouse};
use crate::error::{ServiceError, ServiceResult};
use crate::services::{delete, insert, load, load_for_update, save, transition, WorkflowOutcome};
use crate::store::InventoryStore;

/// Approval-gated stock corrections.
pub struct AdjustmentService<S: InventoryStore> {
    coordinator: Arc<MovementCoordinator<S>>,
}

impl<S: InventoryStore> AdjustmentService<S> {
    pub fn new(coordinator: Arc<MovementCoordinator<S>>) -> Self {
        Self { coordinator }
    }

    #[instrument(skip(self, input), fields(warehouse_id = %input.warehouse_id, items = input.items.len()), err)]
    pub async fn create(&self, input: NewAdjustment) -> ServiceResult<WorkflowOutcome<Adjustment>> {
        let directory = self.coordinator.directory();
        require_warehouse(directory, input.warehouse_id).await?;
        require_user(directory, input.performed_by).await?;
        for item in &input.items {
            require_product(directory, item.product_id).await?;
        }

        let code = self.coordinator.codes().next_code(CodeSeries::Adjustment).await?;
        let adjustment = Adjustment::create(AdjustmentId::new(), code, input, Utc::now())?;
        let adjustment = insert(&self.coordinator, adjustment).await?;
        Ok(WorkflowOutcome::status_only(adjustment))
    }

    pub async fn get(&self, id: AdjustmentId) -> ServiceResult<Adjustment> {
        load(&self.coordinator, *id.as_uuid()).await
    }

    #[instrument(skip(self, items, description), err)]
    pub async fn update_items(
        &self,
        id: AdjustmentId,
        items: Vec<AdjustmentItem>,
        description: Option<String>,
    ) -> ServiceResult<WorkflowOutcome<Adjustment>> {
        for item in &items {
            require_product(self.coordinator.directory(), item.product_id).await?;
        }
        transition(&self.coordinator, *id.as_uuid(), "update", move |a: &mut Adjustment, now| {
            a.update_items(items, description, now)
        })
        .await
    }

    #[instrument(skip(self), err)]
    pub async fn submit(&self, id: AdjustmentId) -> ServiceResult<WorkflowOutcome<Adjustment>> {
        transition(&self.coordinator, *id.as_uuid(), "submit", |a: &mut Adjustment, now| a.submit(now)).await
    }

    #[instrument(skip(self), err)]
    pub async fn approve(&self, id: AdjustmentId, approved_by: UserId) -> ServiceResult<WorkflowOutcome<Adjustment>> {
        require_user(self.coordinator.directory(), approved_by).await?;
        transition(&self.coordinator, *id.as_uuid(), "approve", move |a: &mut Adjustment, now| {
            a.approve(approved_by, now)
        })
        .await
    }

    #[instrument(skip(self), err)]
    pub async fn reject(&self, id: AdjustmentId, rejected_by: UserId) -> ServiceResult<WorkflowOutcome<Adjustment>> {
        require_user(self.coordinator.directory(), rejected_by).await?;
        transition(&self.coordinator, *id.as_uuid(), "reject", move |a: &mut Adjustment, now| {
            a.reject(rejected_by, now)
        })
        .await
    }

    #[instrument(skip(self), err)]
    pub async fn revert_to_draft(&self, id: AdjustmentId) -> ServiceResult<WorkflowOutcome<Adjustment>> {
        transition(&self.coordinator, *id.as_uuid(), "revert to draft", |a: &mut Adjustment, now| {
            a.revert_to_draft(now)
        })
        .await
    }

    #[instrument(skip(self), err)]
    pub async fn cancel(&self, id: AdjustmentId) -> ServiceResult<WorkflowOutcome<Adjustment>> {
        transition(&self.coordinator, *id.as_uuid(), "cancel", |a: &mut Adjustment, now| a.cancel(now)).await
    }

    /// Apply every counted difference and mark the adjustment Completed, all
    /// in one transaction.
    #[instrument(skip(self), err)]
    pub async fn complete(&self, id: AdjustmentId, performed_by: UserId) -> ServiceResult<WorkflowOutcome<Adjustment>> {
        require_user(self.coordinator.directory(), performed_by).await?;

        // Fails fast on a wrong status before any code is allocated.
        let preview: Adjustment = self.get(id).await?;
        let planned = preview.completion_movements(performed_by)?.len();
        let mut stamps = self.coordinator.stamps(planned).await?.into_iter();

        let mut tx = self.coordinator.store().begin().await?;
        let result = async {
            let mut adjustment: Adjustment = load_for_update(&mut tx, *id.as_uuid()).await?;
            let expected = adjustment.status().label();
            let recorded_before: HashMap<_, _> = adjustment
                .items()
                .iter()
                .map(|i| (i.product_id, i.quantity_before))
                .collect();

            let mut entries = Vec::new();
            for request in adjustment.completion_movements(performed_by)? {
                let stamp = stamps
                    .next()
                    .ok_or_else(|| ServiceError::Conflict("adjustment changed during completion".into()))?;
                let outcome = self.coordinator.apply_in_tx(&mut tx, &request, stamp).await?;
                if recorded_before.get(&request.product_id) != Some(&outcome.entry.quantity_before) {
                    warn!(
                        product_id = %request.product_id,
                        recorded_before = ?recorded_before.get(&request.product_id),
                        actual_before = outcome.entry.quantity_before,
                        "stock changed since the count was recorded"
                    );
                }
                entries.push(outcome.entry);
            }

            adjustment.mark_completed(Utc::now())?;
            save(&mut tx, &adjustment, expected).await?;
            Ok::<_, ServiceError>(WorkflowOutcome {
                document: adjustment,
                entries,
            })
        }
        .await;
        let outcome = finish(tx, result).await?;

        info!(code = outcome.document.code(), movements = outcome.entries.len(), "adjustment completed");
        Ok(outcome)
    }

    #[instrument(skip(self), err)]
    pub async fn delete(&self, id: AdjustmentId) -> ServiceResult<()> {
        delete(&self.coordinator, *id.as_uuid(), |a: &Adjustment| a.ensure_deletable()).await
    }

    /// Ledger entries written by this adjustment.
    pub async fn entries(&self, id: AdjustmentId) -> ServiceResult<Vec<LedgerEntry>> {
        self.coordinator
            .ledger_for_document(Adjustment::DOCUMENT_TYPE, *id.as_uuid())
            .await
    }
}

impl<S: InventoryStore> Clone for AdjustmentService<S> {
    fn clone(&self) -> Self {
        Self {
            coordinator: Arc::clone(&self.coordinator),
        }
    }
}
