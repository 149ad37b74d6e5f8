use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};

use stockflow_core::{CodeSeries, ReturnId, UserId, WorkflowDocument, WorkflowStatus};
use stockflow_inventory::LedgerEntry;
use stockflow_returns::{NewReturn, ProcessStep, Return, ReturnItem};

use crate::coordinator::{finish, MovementCoordinator};
use crate::directory::{require_product, require_user, require_warehouse};
use crate::error::{ServiceError, ServiceResult};
use crate::services::{delete, insert, load, load_for_update, save, transition, WorkflowOutcome};
use crate::store::InventoryStore;

/// Customer and supplier returns.
pub struct ReturnService<S: InventoryStore> {
    coordinator: Arc<MovementCoordinator<S>>,
}

impl<S: InventoryStore> ReturnService<S> {
    pub fn new(coordinator: Arc<MovementCoordinator<S>>) -> Self {
        Self { coordinator }
    }

    #[instrument(skip(self, input), fields(warehouse_id = %input.warehouse_id, items = input.items.len()), err)]
    pub async fn create(&self, input: NewReturn) -> ServiceResult<WorkflowOutcome<Return>> {
        let directory = self.coordinator.directory();
        require_warehouse(directory, input.warehouse_id).await?;
        require_user(directory, input.requested_by).await?;
        for item in &input.items {
            require_product(directory, item.product_id).await?;
        }

        let code = self.coordinator.codes().next_code(CodeSeries::Return).await?;
        let document = Return::create(ReturnId::new(), code, input, Utc::now())?;
        let document = insert(&self.coordinator, document).await?;
        Ok(WorkflowOutcome::status_only(document))
    }

    pub async fn get(&self, id: ReturnId) -> ServiceResult<Return> {
        load(&self.coordinator, *id.as_uuid()).await
    }

    #[instrument(skip(self, items), err)]
    pub async fn update_items(&self, id: ReturnId, items: Vec<ReturnItem>) -> ServiceResult<WorkflowOutcome<Return>> {
        for item in &items {
            require_product(self.coordinator.directory(), item.product_id).await?;
        }
        transition(&self.coordinator, *id.as_uuid(), "update", move |r: &mut Return, now| {
            r.update_items(items, now)
        })
        .await
    }

    #[instrument(skip(self), err)]
    pub async fn submit(&self, id: ReturnId) -> ServiceResult<WorkflowOutcome<Return>> {
        transition(&self.coordinator, *id.as_uuid(), "submit", |r: &mut Return, now| r.submit(now)).await
    }

    #[instrument(skip(self), err)]
    pub async fn approve(&self, id: ReturnId, approved_by: UserId) -> ServiceResult<WorkflowOutcome<Return>> {
        require_user(self.coordinator.directory(), approved_by).await?;
        transition(&self.coordinator, *id.as_uuid(), "approve", move |r: &mut Return, now| {
            r.approve(approved_by, now)
        })
        .await
    }

    #[instrument(skip(self), err)]
    pub async fn cancel(&self, id: ReturnId) -> ServiceResult<WorkflowOutcome<Return>> {
        transition(&self.coordinator, *id.as_uuid(), "cancel", |r: &mut Return, now| r.cancel(now)).await
    }

    /// Restock "Return to Stock" lines and write record-only entries for every
    /// other disposition, then mark the return Completed. One transaction.
    #[instrument(skip(self), err)]
    pub async fn process(&self, id: ReturnId, processed_by: UserId) -> ServiceResult<WorkflowOutcome<Return>> {
        require_user(self.coordinator.directory(), processed_by).await?;

        let preview: Return = self.get(id).await?;
        let planned = preview.process_steps(processed_by)?.len();
        let mut stamps = self.coordinator.stamps(planned).await?.into_iter();

        let mut tx = self.coordinator.store().begin().await?;
        let result = async {
            let mut document: Return = load_for_update(&mut tx, *id.as_uuid()).await?;
            let expected = document.status().label();

            let mut entries = Vec::new();
            for step in document.process_steps(processed_by)? {
                let stamp = stamps
                    .next()
                    .ok_or_else(|| ServiceError::Conflict("return changed during processing".into()))?;
                let entry = match &step {
                    ProcessStep::Restock(request) => {
                        self.coordinator.apply_in_tx(&mut tx, request, stamp).await?.entry
                    }
                    ProcessStep::Record(request) => {
                        self.coordinator.record_audit_in_tx(&mut tx, request, stamp).await?
                    }
                };
                entries.push(entry);
            }

            document.mark_processed(processed_by, Utc::now())?;
            save(&mut tx, &document, expected).await?;
            Ok::<_, ServiceError>(WorkflowOutcome { document, entries })
        }
        .await;
        let outcome = finish(tx, result).await?;

        info!(
            code = outcome.document.code(),
            restocked = outcome.entries.iter().filter(|e| !e.is_audit_only()).count(),
            recorded = outcome.entries.iter().filter(|e| e.is_audit_only()).count(),
            "return processed"
        );
        Ok(outcome)
    }

    #[instrument(skip(self), err)]
    pub async fn delete(&self, id: ReturnId) -> ServiceResult<()> {
        delete(&self.coordinator, *id.as_uuid(), |r: &Return| r.ensure_deletable()).await
    }

    pub async fn entries(&self, id: ReturnId) -> ServiceResult<Vec<LedgerEntry>> {
        self.coordinator
            .ledger_for_document(Return::DOCUMENT_TYPE, *id.as_uuid())
            .await
    }
}

impl<S: InventoryStore> Clone for ReturnService<S> {
    fn clone(&self) -> Self {
        Self {
            coordinator: Arc::clone(&self.coordinator),
        }
    }
}
