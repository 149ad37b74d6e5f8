use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockflow_core::{
    DocumentType, DomainError, DomainResult, ProductId, ReturnId, UserId, WarehouseId,
    WorkflowDocument, WorkflowStatus,
};
use stockflow_inventory::{DocumentReference, MovementRequest, MovementType};

/// Return status lifecycle.
///
/// Draft → {Pending, Cancelled}; Pending → {Approved, Cancelled};
/// Approved → Completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReturnStatus {
    Draft,
    Pending,
    Approved,
    Completed,
    Cancelled,
}

impl WorkflowStatus for ReturnStatus {
    fn label(&self) -> &'static str {
        match self {
            ReturnStatus::Draft => "Draft",
            ReturnStatus::Pending => "Pending",
            ReturnStatus::Approved => "Approved",
            ReturnStatus::Completed => "Completed",
            ReturnStatus::Cancelled => "Cancelled",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, ReturnStatus::Completed | ReturnStatus::Cancelled)
    }

    fn is_deletable(&self) -> bool {
        matches!(self, ReturnStatus::Draft | ReturnStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReturnSourceType {
    Customer,
    Supplier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemCondition {
    New,
    Good,
    Damaged,
    Defective,
    Expired,
}

/// What happens to a returned line when the return is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReturnAction {
    #[serde(rename = "Return to Stock")]
    ReturnToStock,
    #[serde(rename = "Return to Supplier")]
    ReturnToSupplier,
    Dispose,
    Repair,
    #[serde(rename = "Pending Inspection")]
    PendingInspection,
}

impl ReturnAction {
    pub fn label(&self) -> &'static str {
        match self {
            ReturnAction::ReturnToStock => "Return to Stock",
            ReturnAction::ReturnToSupplier => "Return to Supplier",
            ReturnAction::Dispose => "Dispose",
            ReturnAction::Repair => "Repair",
            ReturnAction::PendingInspection => "Pending Inspection",
        }
    }

    pub fn restocks(&self) -> bool {
        matches!(self, ReturnAction::ReturnToStock)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnItem {
    pub product_id: ProductId,
    pub quantity: i64,
    pub reason: String,
    pub condition: ItemCondition,
    pub action: ReturnAction,
}

/// Input for creating a return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReturn {
    pub source_type: ReturnSourceType,
    /// Customer or supplier id, owned by the surrounding application.
    pub source_id: Uuid,
    pub warehouse_id: WarehouseId,
    pub items: Vec<ReturnItem>,
    pub requested_by: UserId,
    pub notes: Option<String>,
}

/// One line of work performed by `process`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessStep {
    /// Put the quantity back into stock.
    Restock(MovementRequest),
    /// Zero-change ledger entry recording a non-stock disposition.
    Record(MovementRequest),
}

impl ProcessStep {
    pub fn request(&self) -> &MovementRequest {
        match self {
            ProcessStep::Restock(request) | ProcessStep::Record(request) => request,
        }
    }
}

/// Workflow document: Return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Return {
    id: ReturnId,
    code: String,
    source_type: ReturnSourceType,
    source_id: Uuid,
    warehouse_id: WarehouseId,
    items: Vec<ReturnItem>,
    status: ReturnStatus,
    requested_by: UserId,
    approved_by: Option<UserId>,
    processed_by: Option<UserId>,
    processed_date: Option<DateTime<Utc>>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl WorkflowDocument for Return {
    type Status = ReturnStatus;

    const DOCUMENT_TYPE: DocumentType = DocumentType::Return;

    fn document_id(&self) -> Uuid {
        *self.id.as_uuid()
    }

    fn code(&self) -> &str {
        &self.code
    }

    fn status(&self) -> ReturnStatus {
        self.status
    }
}

impl Return {
    pub fn create(
        id: ReturnId,
        code: impl Into<String>,
        input: NewReturn,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        validate_items(&input.items)?;
        Ok(Self {
            id,
            code: code.into(),
            source_type: input.source_type,
            source_id: input.source_id,
            warehouse_id: input.warehouse_id,
            items: input.items,
            status: ReturnStatus::Draft,
            requested_by: input.requested_by,
            approved_by: None,
            processed_by: None,
            processed_date: None,
            notes: input.notes,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn id(&self) -> ReturnId {
        self.id
    }

    pub fn source_type(&self) -> ReturnSourceType {
        self.source_type
    }

    pub fn source_id(&self) -> Uuid {
        self.source_id
    }

    pub fn warehouse_id(&self) -> WarehouseId {
        self.warehouse_id
    }

    pub fn items(&self) -> &[ReturnItem] {
        &self.items
    }

    pub fn requested_by(&self) -> UserId {
        self.requested_by
    }

    pub fn approved_by(&self) -> Option<UserId> {
        self.approved_by
    }

    pub fn processed_by(&self) -> Option<UserId> {
        self.processed_by
    }

    pub fn processed_date(&self) -> Option<DateTime<Utc>> {
        self.processed_date
    }

    pub fn reference(&self) -> DocumentReference {
        DocumentReference::new(DocumentType::Return, *self.id.as_uuid(), self.code.clone())
    }

    fn ensure(&self, allowed: &[ReturnStatus], action: &'static str) -> DomainResult<()> {
        self.status.ensure_one_of(allowed, DocumentType::Return, action)
    }

    pub fn update_items(&mut self, items: Vec<ReturnItem>, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure(&[ReturnStatus::Draft], "update")?;
        validate_items(&items)?;
        self.items = items;
        self.updated_at = now;
        Ok(())
    }

    pub fn submit(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure(&[ReturnStatus::Draft], "submit")?;
        self.status = ReturnStatus::Pending;
        self.updated_at = now;
        Ok(())
    }

    pub fn approve(&mut self, approved_by: UserId, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure(&[ReturnStatus::Pending], "approve")?;
        self.status = ReturnStatus::Approved;
        self.approved_by = Some(approved_by);
        self.updated_at = now;
        Ok(())
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure(&[ReturnStatus::Draft, ReturnStatus::Pending], "cancel")?;
        self.status = ReturnStatus::Cancelled;
        self.updated_at = now;
        Ok(())
    }

    /// Work to perform when the return is processed, in product order.
    pub fn process_steps(&self, performed_by: UserId) -> DomainResult<Vec<ProcessStep>> {
        self.ensure(&[ReturnStatus::Approved], "process")?;
        let reference = self.reference();
        let mut items: Vec<&ReturnItem> = self.items.iter().collect();
        items.sort_by_key(|i| i.product_id);

        Ok(items
            .into_iter()
            .map(|item| {
                let notes = Some(format!(
                    "{}: {} x{} ({:?})",
                    item.action.label(),
                    item.reason,
                    item.quantity,
                    item.condition
                ));
                let change = if item.action.restocks() { item.quantity } else { 0 };
                let request = MovementRequest::new(
                    MovementType::Return,
                    item.product_id,
                    self.warehouse_id,
                    change,
                    performed_by,
                    reference.clone(),
                )
                .with_notes(notes);
                if item.action.restocks() {
                    ProcessStep::Restock(request)
                } else {
                    ProcessStep::Record(request)
                }
            })
            .collect())
    }

    pub fn mark_processed(&mut self, processed_by: UserId, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure(&[ReturnStatus::Approved], "process")?;
        self.status = ReturnStatus::Completed;
        self.processed_by = Some(processed_by);
        self.processed_date = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn ensure_deletable(&self) -> DomainResult<()> {
        if self.status.is_deletable() {
            Ok(())
        } else {
            Err(DomainError::invalid_transition(
                DocumentType::Return,
                self.status.label(),
                "delete",
            ))
        }
    }
}

fn validate_items(items: &[ReturnItem]) -> DomainResult<()> {
    if items.is_empty() {
        return Err(DomainError::validation("return requires at least one item"));
    }
    let mut seen = HashSet::new();
    for item in items {
        if item.quantity < 1 {
            return Err(DomainError::validation("return quantity must be at least 1"));
        }
        if item.reason.trim().is_empty() {
            return Err(DomainError::validation("return reason is required"));
        }
        if !seen.insert((item.product_id, item.action)) {
            return Err(DomainError::validation(format!(
                "product {} appears more than once with action '{}'",
                item.product_id,
                item.action.label()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn item(product_id: ProductId, quantity: i64, action: ReturnAction) -> ReturnItem {
        ReturnItem {
            product_id,
            quantity,
            reason: "customer changed mind".to_string(),
            condition: ItemCondition::Good,
            action,
        }
    }

    fn new_return(items: Vec<ReturnItem>) -> NewReturn {
        NewReturn {
            source_type: ReturnSourceType::Customer,
            source_id: Uuid::now_v7(),
            warehouse_id: WarehouseId::new(),
            items,
            requested_by: UserId::new(),
            notes: None,
        }
    }

    fn approved(items: Vec<ReturnItem>) -> Return {
        let mut ret = Return::create(ReturnId::new(), "RET-00001", new_return(items), test_time()).unwrap();
        ret.submit(test_time()).unwrap();
        ret.approve(UserId::new(), test_time()).unwrap();
        ret
    }

    #[test]
    fn create_validates_lines() {
        let p = ProductId::new();
        assert!(Return::create(ReturnId::new(), "RET-1", new_return(vec![]), test_time()).is_err());
        assert!(Return::create(ReturnId::new(), "RET-1", new_return(vec![item(p, 0, ReturnAction::Dispose)]), test_time()).is_err());

        let mut blank = item(p, 1, ReturnAction::Dispose);
        blank.reason = "  ".into();
        assert!(Return::create(ReturnId::new(), "RET-1", new_return(vec![blank]), test_time()).is_err());

        let repeated = vec![item(p, 1, ReturnAction::Dispose), item(p, 2, ReturnAction::Dispose)];
        assert!(matches!(
            Return::create(ReturnId::new(), "RET-1", new_return(repeated), test_time()),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn one_product_can_be_split_across_actions() {
        let p = ProductId::new();
        let ret = approved(vec![
            item(p, 3, ReturnAction::ReturnToStock),
            item(p, 2, ReturnAction::Dispose),
        ]);

        let steps = ret.process_steps(UserId::new()).unwrap();
        assert_eq!(steps.len(), 2);
        assert!(steps.iter().all(|s| s.request().product_id == p));
        let restocked: i64 = steps
            .iter()
            .filter_map(|s| match s {
                ProcessStep::Restock(request) => Some(request.quantity_change),
                ProcessStep::Record(_) => None,
            })
            .sum();
        assert_eq!(restocked, 3);
    }

    #[test]
    fn process_splits_restock_from_record_only_lines() {
        let restock = ProductId::new();
        let dispose = ProductId::new();
        let ret = approved(vec![
            item(restock, 4, ReturnAction::ReturnToStock),
            item(dispose, 2, ReturnAction::Dispose),
        ]);

        let steps = ret.process_steps(UserId::new()).unwrap();
        assert_eq!(steps.len(), 2);
        for step in &steps {
            match step {
                ProcessStep::Restock(request) => {
                    assert_eq!(request.product_id, restock);
                    assert_eq!(request.quantity_change, 4);
                }
                ProcessStep::Record(request) => {
                    assert_eq!(request.product_id, dispose);
                    assert_eq!(request.quantity_change, 0);
                }
            }
            assert_eq!(step.request().movement_type, MovementType::Return);
        }
    }

    #[test]
    fn process_requires_approval_and_is_one_shot() {
        let mut ret = Return::create(
            ReturnId::new(),
            "RET-1",
            new_return(vec![item(ProductId::new(), 1, ReturnAction::Repair)]),
            test_time(),
        )
        .unwrap();
        assert!(matches!(
            ret.process_steps(UserId::new()),
            Err(DomainError::InvalidStateTransition { action: "process", .. })
        ));

        ret.submit(test_time()).unwrap();
        ret.approve(UserId::new(), test_time()).unwrap();
        let processor = UserId::new();
        ret.mark_processed(processor, test_time()).unwrap();
        assert_eq!(ret.status(), ReturnStatus::Completed);
        assert_eq!(ret.processed_by(), Some(processor));
        assert!(ret.process_steps(processor).is_err());
    }

    #[test]
    fn only_draft_or_cancelled_returns_are_deletable() {
        let mut ret = Return::create(
            ReturnId::new(),
            "RET-1",
            new_return(vec![item(ProductId::new(), 1, ReturnAction::Dispose)]),
            test_time(),
        )
        .unwrap();
        assert!(ret.ensure_deletable().is_ok());
        ret.submit(test_time()).unwrap();
        assert!(ret.ensure_deletable().is_err());
        ret.cancel(test_time()).unwrap();
        assert!(ret.ensure_deletable().is_ok());
    }

    #[test]
    fn action_labels_match_serialized_form() {
        let json = serde_json::to_string(&ReturnAction::ReturnToStock).unwrap();
        assert_eq!(json, format!("\"{}\"", ReturnAction::ReturnToStock.label()));
    }
}
