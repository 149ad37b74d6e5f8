use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockflow_core::{
    AdjustmentId, DocumentType, DomainError, DomainResult, ProductId, UserId, WarehouseId,
    WorkflowDocument, WorkflowStatus,
};
use stockflow_inventory::{DocumentReference, MovementRequest, MovementType};

/// Adjustment status lifecycle.
///
/// Draft → {Pending Approval, Cancelled}; Pending Approval → {Approved,
/// Rejected, Draft}; Approved → Completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdjustmentStatus {
    Draft,
    #[serde(rename = "Pending Approval")]
    PendingApproval,
    Approved,
    Completed,
    Rejected,
    Cancelled,
}

impl WorkflowStatus for AdjustmentStatus {
    fn label(&self) -> &'static str {
        match self {
            AdjustmentStatus::Draft => "Draft",
            AdjustmentStatus::PendingApproval => "Pending Approval",
            AdjustmentStatus::Approved => "Approved",
            AdjustmentStatus::Completed => "Completed",
            AdjustmentStatus::Rejected => "Rejected",
            AdjustmentStatus::Cancelled => "Cancelled",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(
            self,
            AdjustmentStatus::Completed | AdjustmentStatus::Rejected | AdjustmentStatus::Cancelled
        )
    }

    fn is_deletable(&self) -> bool {
        matches!(
            self,
            AdjustmentStatus::Draft | AdjustmentStatus::PendingApproval | AdjustmentStatus::Cancelled
        )
    }
}

/// Why stock is being corrected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdjustmentReason {
    #[serde(rename = "Physical Count")]
    PhysicalCount,
    Damaged,
    Expired,
    #[serde(rename = "Theft or Loss")]
    TheftOrLoss,
    #[serde(rename = "Data Entry Error")]
    DataEntryError,
    Other,
}

impl AdjustmentReason {
    pub fn label(&self) -> &'static str {
        match self {
            AdjustmentReason::PhysicalCount => "Physical Count",
            AdjustmentReason::Damaged => "Damaged",
            AdjustmentReason::Expired => "Expired",
            AdjustmentReason::TheftOrLoss => "Theft or Loss",
            AdjustmentReason::DataEntryError => "Data Entry Error",
            AdjustmentReason::Other => "Other",
        }
    }
}

/// One counted line: what the system believed versus what is on hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentItem {
    pub product_id: ProductId,
    pub quantity_before: i64,
    pub quantity_after: i64,
}

impl AdjustmentItem {
    pub fn new(product_id: ProductId, quantity_before: i64, quantity_after: i64) -> Self {
        Self {
            product_id,
            quantity_before,
            quantity_after,
        }
    }

    pub fn difference(&self) -> i64 {
        self.quantity_after - self.quantity_before
    }
}

/// Input for creating an adjustment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAdjustment {
    pub warehouse_id: WarehouseId,
    pub reason: AdjustmentReason,
    pub description: Option<String>,
    pub items: Vec<AdjustmentItem>,
    pub performed_by: UserId,
    /// Business date of the count; defaults to creation time.
    pub adjustment_date: Option<DateTime<Utc>>,
}

/// Workflow document: Adjustment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjustment {
    id: AdjustmentId,
    code: String,
    warehouse_id: WarehouseId,
    reason: AdjustmentReason,
    description: Option<String>,
    items: Vec<AdjustmentItem>,
    status: AdjustmentStatus,
    performed_by: UserId,
    approved_by: Option<UserId>,
    rejected_by: Option<UserId>,
    adjustment_date: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl WorkflowDocument for Adjustment {
    type Status = AdjustmentStatus;

    const DOCUMENT_TYPE: DocumentType = DocumentType::Adjustment;

    fn document_id(&self) -> Uuid {
        *self.id.as_uuid()
    }

    fn code(&self) -> &str {
        &self.code
    }

    fn status(&self) -> AdjustmentStatus {
        self.status
    }
}

impl Adjustment {
    /// Validate input and build a Draft adjustment.
    pub fn create(
        id: AdjustmentId,
        code: impl Into<String>,
        input: NewAdjustment,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        validate_items(&input.items)?;
        Ok(Self {
            id,
            code: code.into(),
            warehouse_id: input.warehouse_id,
            reason: input.reason,
            description: input.description,
            items: input.items,
            status: AdjustmentStatus::Draft,
            performed_by: input.performed_by,
            approved_by: None,
            rejected_by: None,
            adjustment_date: input.adjustment_date.unwrap_or(now),
            created_at: now,
            updated_at: now,
            completed_at: None,
        })
    }

    pub fn id(&self) -> AdjustmentId {
        self.id
    }

    pub fn warehouse_id(&self) -> WarehouseId {
        self.warehouse_id
    }

    pub fn reason(&self) -> AdjustmentReason {
        self.reason
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn items(&self) -> &[AdjustmentItem] {
        &self.items
    }

    pub fn performed_by(&self) -> UserId {
        self.performed_by
    }

    pub fn approved_by(&self) -> Option<UserId> {
        self.approved_by
    }

    pub fn rejected_by(&self) -> Option<UserId> {
        self.rejected_by
    }

    pub fn adjustment_date(&self) -> DateTime<Utc> {
        self.adjustment_date
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn reference(&self) -> DocumentReference {
        DocumentReference::new(DocumentType::Adjustment, *self.id.as_uuid(), self.code.clone())
    }

    fn ensure(&self, allowed: &[AdjustmentStatus], action: &'static str) -> DomainResult<()> {
        self.status
            .ensure_one_of(allowed, DocumentType::Adjustment, action)
    }

    /// Replace the counted lines (Draft only).
    pub fn update_items(
        &mut self,
        items: Vec<AdjustmentItem>,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.ensure(&[AdjustmentStatus::Draft], "update")?;
        validate_items(&items)?;
        self.items = items;
        if description.is_some() {
            self.description = description;
        }
        self.updated_at = now;
        Ok(())
    }

    pub fn submit(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure(&[AdjustmentStatus::Draft], "submit")?;
        self.status = AdjustmentStatus::PendingApproval;
        self.updated_at = now;
        Ok(())
    }

    pub fn approve(&mut self, approved_by: UserId, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure(&[AdjustmentStatus::PendingApproval], "approve")?;
        self.status = AdjustmentStatus::Approved;
        self.approved_by = Some(approved_by);
        self.updated_at = now;
        Ok(())
    }

    pub fn reject(&mut self, rejected_by: UserId, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure(&[AdjustmentStatus::PendingApproval], "reject")?;
        self.status = AdjustmentStatus::Rejected;
        self.rejected_by = Some(rejected_by);
        self.updated_at = now;
        Ok(())
    }

    pub fn revert_to_draft(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure(&[AdjustmentStatus::PendingApproval], "revert to draft")?;
        self.status = AdjustmentStatus::Draft;
        self.approved_by = None;
        self.updated_at = now;
        Ok(())
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure(&[AdjustmentStatus::Draft], "cancel")?;
        self.status = AdjustmentStatus::Cancelled;
        self.updated_at = now;
        Ok(())
    }

    /// Movements that completing this adjustment produces, in key order.
    ///
    /// Lines whose count did not change produce no movement.
    pub fn completion_movements(&self, performed_by: UserId) -> DomainResult<Vec<MovementRequest>> {
        self.ensure(&[AdjustmentStatus::Approved], "complete")?;
        let reference = self.reference();
        let mut items: Vec<&AdjustmentItem> =
            self.items.iter().filter(|i| i.difference() != 0).collect();
        items.sort_by_key(|i| i.product_id);

        Ok(items
            .into_iter()
            .map(|item| {
                MovementRequest::new(
                    MovementType::Adjustment,
                    item.product_id,
                    self.warehouse_id,
                    item.difference(),
                    performed_by,
                    reference.clone(),
                )
                .with_notes(Some(format!(
                    "{}: counted {} (was {})",
                    self.reason.label(), item.quantity_after, item.quantity_before
                )))
            })
            .collect())
    }

    pub fn mark_completed(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure(&[AdjustmentStatus::Approved], "complete")?;
        self.status = AdjustmentStatus::Completed;
        self.completed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn ensure_deletable(&self) -> DomainResult<()> {
        if self.status.is_deletable() {
            Ok(())
        } else {
            Err(DomainError::invalid_transition(
                DocumentType::Adjustment,
                self.status.label(),
                "delete",
            ))
        }
    }
}

fn validate_items(items: &[AdjustmentItem]) -> DomainResult<()> {
    if items.is_empty() {
        return Err(DomainError::validation("adjustment requires at least one item"));
    }
    let mut seen = HashSet::new();
    for item in items {
        if item.quantity_before < 0 || item.quantity_after < 0 {
            return Err(DomainError::validation(
                "adjustment quantities cannot be negative",
            ));
        }
        if !seen.insert(item.product_id) {
            return Err(DomainError::validation(format!(
                "product {} appears more than once",
                item.product_id
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

    fn new_adjustment(items: Vec<AdjustmentItem>) -> NewAdjustment {
        NewAdjustment {
            warehouse_id: WarehouseId::new(),
            reason: AdjustmentReason::PhysicalCount,
            description: Some("quarterly count".to_string()),
            items,
            performed_by: UserId::new(),
            adjustment_date: None,
        }
    }

    fn draft(items: Vec<AdjustmentItem>) -> Adjustment {
        Adjustment::create(AdjustmentId::new(), "ADJ-00001", new_adjustment(items), test_time()).unwrap()
    }

    fn approved(items: Vec<AdjustmentItem>) -> Adjustment {
        let mut adj = draft(items);
        adj.submit(test_time()).unwrap();
        adj.approve(UserId::new(), test_time()).unwrap();
        adj
    }

    #[test]
    fn create_starts_in_draft() {
        let adj = draft(vec![AdjustmentItem::new(ProductId::new(), 20, 15)]);
        assert_eq!(adj.status(), AdjustmentStatus::Draft);
        assert_eq!(adj.code(), "ADJ-00001");
        assert_eq!(adj.adjustment_date(), adj.updated_at());
    }

    #[test]
    fn create_rejects_empty_negative_and_duplicate_lines() {
        let now = test_time();
        assert!(matches!(
            Adjustment::create(AdjustmentId::new(), "ADJ-1", new_adjustment(vec![]), now),
            Err(DomainError::Validation(_))
        ));

        let negative = vec![AdjustmentItem::new(ProductId::new(), -1, 5)];
        assert!(Adjustment::create(AdjustmentId::new(), "ADJ-1", new_adjustment(negative), now).is_err());

        let product = ProductId::new();
        let duplicate = vec![AdjustmentItem::new(product, 1, 2), AdjustmentItem::new(product, 3, 4)];
        assert!(Adjustment::create(AdjustmentId::new(), "ADJ-1", new_adjustment(duplicate), now).is_err());
    }

    #[test]
    fn approving_a_draft_is_an_invalid_transition() {
        let mut adj = draft(vec![AdjustmentItem::new(ProductId::new(), 20, 15)]);
        let err = adj.approve(UserId::new(), test_time()).unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidStateTransition {
                document: DocumentType::Adjustment,
                from: "Draft",
                action: "approve",
            }
        );
    }

    #[test]
    fn approval_path_records_approver() {
        let approver = UserId::new();
        let mut adj = draft(vec![AdjustmentItem::new(ProductId::new(), 20, 15)]);
        adj.submit(test_time()).unwrap();
        assert_eq!(adj.status(), AdjustmentStatus::PendingApproval);
        adj.approve(approver, test_time()).unwrap();
        assert_eq!(adj.status(), AdjustmentStatus::Approved);
        assert_eq!(adj.approved_by(), Some(approver));
    }

    #[test]
    fn pending_can_be_rejected_or_sent_back() {
        let mut adj = draft(vec![AdjustmentItem::new(ProductId::new(), 1, 2)]);
        adj.submit(test_time()).unwrap();
        adj.revert_to_draft(test_time()).unwrap();
        assert_eq!(adj.status(), AdjustmentStatus::Draft);

        adj.submit(test_time()).unwrap();
        adj.reject(UserId::new(), test_time()).unwrap();
        assert_eq!(adj.status(), AdjustmentStatus::Rejected);
        assert!(adj.status().is_terminal());
        assert!(adj.submit(test_time()).is_err());
        assert!(adj.ensure_deletable().is_err());
    }

    #[test]
    fn completion_movements_carry_signed_difference_and_skip_unchanged_lines() {
        let counted = ProductId::new();
        let unchanged = ProductId::new();
        let adj = approved(vec![
            AdjustmentItem::new(counted, 20, 15),
            AdjustmentItem::new(unchanged, 7, 7),
        ]);

        let movements = adj.completion_movements(UserId::new()).unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].product_id, counted);
        assert_eq!(movements[0].quantity_change, -5);
        assert_eq!(movements[0].movement_type, MovementType::Adjustment);
        assert_eq!(movements[0].reference.document_code, "ADJ-00001");
    }

    #[test]
    fn completed_adjustment_cannot_complete_again() {
        let mut adj = approved(vec![AdjustmentItem::new(ProductId::new(), 20, 15)]);
        adj.mark_completed(test_time()).unwrap();
        assert!(adj.completed_at().is_some());
        assert!(matches!(
            adj.completion_movements(UserId::new()),
            Err(DomainError::InvalidStateTransition { .. })
        ));
        assert!(adj.mark_completed(test_time()).is_err());
    }

    #[test]
    fn items_are_editable_only_in_draft() {
        let mut adj = draft(vec![AdjustmentItem::new(ProductId::new(), 1, 2)]);
        adj.update_items(vec![AdjustmentItem::new(ProductId::new(), 5, 9)], None, test_time())
            .unwrap();
        assert_eq!(adj.items()[0].difference(), 4);
        assert_eq!(adj.description(), Some("quarterly count"));

        adj.submit(test_time()).unwrap();
        assert!(adj.update_items(vec![AdjustmentItem::new(ProductId::new(), 0, 1)], None, test_time()).is_err());
    }
}
