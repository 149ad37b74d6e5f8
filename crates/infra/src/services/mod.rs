//! Workflow services: adjustments, transfers and returns.
//!
//! Each operation is one transaction. Stock-affecting steps (complete, ship,
//! receive, process) route every movement through the shared
//! [`MovementCoordinator`](crate::coordinator::MovementCoordinator) inside that
//! transaction, and write the document back conditionally on the status it
//! was loaded with.

pub mod adjustments;
pub mod returns;
pub mod transfers;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use stockflow_core::{DomainResult, WorkflowDocument, WorkflowStatus};
use stockflow_inventory::LedgerEntry;

use crate::coordinator::{finish, MovementCoordinator};
use crate::error::{ServiceError, ServiceResult};
use crate::store::{InventoryStore, StoreTx, StoredDocument};

pub use adjustments::AdjustmentService;
pub use returns::ReturnService;
pub use transfers::TransferService;

/// Result of a workflow call: the document after the call and the ledger
/// entries it produced (empty for status-only transitions).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowOutcome<D> {
    pub document: D,
    pub entries: Vec<LedgerEntry>,
}

impl<D> WorkflowOutcome<D> {
    pub(crate) fn status_only(document: D) -> Self {
        Self {
            document,
            entries: Vec::new(),
        }
    }
}

pub(crate) async fn load<S, D>(coordinator: &MovementCoordinator<S>, id: Uuid) -> ServiceResult<D>
where
    S: InventoryStore,
    D: WorkflowDocument,
{
    let stored = coordinator
        .store()
        .load_document(D::DOCUMENT_TYPE, id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("{} {id}", D::DOCUMENT_TYPE)))?;
    Ok(stored.into_typed()?)
}

pub(crate) async fn load_for_update<Tx, D>(tx: &mut Tx, id: Uuid) -> ServiceResult<D>
where
    Tx: StoreTx,
    D: WorkflowDocument,
{
    let stored = tx
        .load_document_for_update(D::DOCUMENT_TYPE, id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("{} {id}", D::DOCUMENT_TYPE)))?;
    Ok(stored.into_typed()?)
}

/// Write `document` back, conditional on the status it was loaded with.
pub(crate) async fn save<Tx, D>(tx: &mut Tx, document: &D, expected_status: &str) -> ServiceResult<()>
where
    Tx: StoreTx,
    D: WorkflowDocument,
{
    let stored = StoredDocument::from_typed(document)?;
    tx.update_document(&stored, expected_status).await?;
    Ok(())
}

pub(crate) async fn insert<S, D>(coordinator: &MovementCoordinator<S>, document: D) -> ServiceResult<D>
where
    S: InventoryStore,
    D: WorkflowDocument,
{
    let stored = StoredDocument::from_typed(&document)?;
    let mut tx = coordinator.store().begin().await?;
    let result = tx.insert_document(&stored).await.map_err(ServiceError::from);
    finish(tx, result).await?;
    info!(document = %D::DOCUMENT_TYPE, code = document.code(), "document created");
    Ok(document)
}

/// Apply a status-only transition in its own transaction.
pub(crate) async fn transition<S, D, F>(
    coordinator: &MovementCoordinator<S>,
    id: Uuid,
    action: &'static str,
    apply: F,
) -> ServiceResult<WorkflowOutcome<D>>
where
    S: InventoryStore,
    D: WorkflowDocument,
    F: FnOnce(&mut D, DateTime<Utc>) -> DomainResult<()> + Send,
{
    let mut tx = coordinator.store().begin().await?;
    let result = async {
        let mut document: D = load_for_update(&mut tx, id).await?;
        let expected = document.status().label();
        apply(&mut document, Utc::now())?;
        save(&mut tx, &document, expected).await?;
        Ok::<_, ServiceError>(document)
    }
    .await;
    let document = finish(tx, result).await?;
    info!(
        document = %D::DOCUMENT_TYPE,
        code = document.code(),
        action,
        status = document.status().label(),
        "workflow transition committed"
    );
    Ok(WorkflowOutcome::status_only(document))
}

/// Delete a document, conditional on its status still allowing it.
pub(crate) async fn delete<S, D, F>(coordinator: &MovementCoordinator<S>, id: Uuid, ensure: F) -> ServiceResult<()>
where
    S: InventoryStore,
    D: WorkflowDocument,
    F: FnOnce(&D) -> DomainResult<()> + Send,
{
    let mut tx = coordinator.store().begin().await?;
    let result = async {
        let document: D = load_for_update(&mut tx, id).await?;
        ensure(&document)?;
        tx.delete_document(D::DOCUMENT_TYPE, id, document.status().label())
            .await?;
        Ok::<_, ServiceError>(document)
    }
    .await;
    let document = finish(tx, result).await?;
    info!(document = %D::DOCUMENT_TYPE, code = document.code(), "document deleted");
    Ok(())
}
