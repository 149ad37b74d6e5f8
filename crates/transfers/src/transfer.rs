use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockflow_core::{
    DocumentType, DomainError, DomainResult, ProductId, TransferId, UserId, WarehouseId,
    WorkflowDocument, WorkflowStatus,
};
use stockflow_inventory::{DocumentReference, MovementRequest, MovementType};

/// Transfer status lifecycle.
///
/// Draft → {Pending, Cancelled}; Pending → {Approved, Cancelled, Draft};
/// Approved → {In Transit, Cancelled}; In Transit → Partially Received →
/// Completed (a full receipt may jump straight to Completed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferStatus {
    Draft,
    Pending,
    Approved,
    /// Shipped from the source warehouse, nothing received yet.
    #[serde(rename = "In Transit")]
    InTransit,
    #[serde(rename = "Partially Received")]
    PartiallyReceived,
    Completed,
    Cancelled,
}

impl WorkflowStatus for TransferStatus {
    fn label(&self) -> &'static str {
        match self {
            TransferStatus::Draft => "Draft",
            TransferStatus::Pending => "Pending",
            TransferStatus::Approved => "Approved",
            TransferStatus::InTransit => "In Transit",
            TransferStatus::PartiallyReceived => "Partially Received",
            TransferStatus::Completed => "Completed",
            TransferStatus::Cancelled => "Cancelled",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Completed | TransferStatus::Cancelled)
    }

    fn is_deletable(&self) -> bool {
        matches!(
            self,
            TransferStatus::Draft | TransferStatus::Pending | TransferStatus::Cancelled
        )
    }
}

/// Ordered line of a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferItem {
    pub product_id: ProductId,
    pub quantity: i64,
    #[serde(default)]
    pub received_quantity: i64,
}

impl TransferItem {
    pub fn new(product_id: ProductId, quantity: i64) -> Self {
        Self {
            product_id,
            quantity,
            received_quantity: 0,
        }
    }

    pub fn outstanding(&self) -> i64 {
        self.quantity - self.received_quantity
    }
}

/// Carrier details captured when the transfer ships.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportInfo {
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub vehicle: Option<String>,
}

/// Input for creating a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransfer {
    pub from_warehouse: WarehouseId,
    pub to_warehouse: WarehouseId,
    /// Ordered quantities per product.
    pub items: Vec<(ProductId, i64)>,
    pub requested_by: UserId,
    pub expected_delivery_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// One line of a receipt call: quantity received now (not cumulative).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptLine {
    pub product_id: ProductId,
    pub received_quantity: i64,
}

/// Validated receipt: destination movements plus per-product increments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub movements: Vec<MovementRequest>,
    increments: BTreeMap<ProductId, i64>,
}

impl Receipt {
    pub fn is_empty(&self) -> bool {
        self.movements.is_empty()
    }

    pub fn total(&self) -> i64 {
        self.increments.values().sum()
    }
}

/// Workflow document: Transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    id: TransferId,
    code: String,
    from_warehouse: WarehouseId,
    to_warehouse: WarehouseId,
    items: Vec<TransferItem>,
    status: TransferStatus,
    requested_by: UserId,
    approved_by: Option<UserId>,
    shipped_by: Option<UserId>,
    received_by: Option<UserId>,
    transport_info: Option<TransportInfo>,
    expected_delivery_date: Option<DateTime<Utc>>,
    shipped_at: Option<DateTime<Utc>>,
    completion_date: Option<DateTime<Utc>>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl WorkflowDocument for Transfer {
    type Status = TransferStatus;

    const DOCUMENT_TYPE: DocumentType = DocumentType::Transfer;

    fn document_id(&self) -> Uuid {
        *self.id.as_uuid()
    }

    fn code(&self) -> &str {
        &self.code
    }

    fn status(&self) -> TransferStatus {
        self.status
    }
}

impl Transfer {
    /// Validate input and build a Draft transfer.
    pub fn create(
        id: TransferId,
        code: impl Into<String>,
        input: NewTransfer,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if input.from_warehouse == input.to_warehouse {
            return Err(DomainError::validation(
                "source and destination warehouses must differ",
            ));
        }
        let items = build_items(&input.items)?;
        Ok(Self {
            id,
            code: code.into(),
            from_warehouse: input.from_warehouse,
            to_warehouse: input.to_warehouse,
            items,
            status: TransferStatus::Draft,
            requested_by: input.requested_by,
            approved_by: None,
            shipped_by: None,
            received_by: None,
            transport_info: None,
            expected_delivery_date: input.expected_delivery_date,
            shipped_at: None,
            completion_date: None,
            notes: input.notes,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn id(&self) -> TransferId {
        self.id
    }

    pub fn from_warehouse(&self) -> WarehouseId {
        self.from_warehouse
    }

    pub fn to_warehouse(&self) -> WarehouseId {
        self.to_warehouse
    }

    pub fn items(&self) -> &[TransferItem] {
        &self.items
    }

    pub fn requested_by(&self) -> UserId {
        self.requested_by
    }

    pub fn approved_by(&self) -> Option<UserId> {
        self.approved_by
    }

    pub fn shipped_by(&self) -> Option<UserId> {
        self.shipped_by
    }

    pub fn received_by(&self) -> Option<UserId> {
        self.received_by
    }

    pub fn transport_info(&self) -> Option<&TransportInfo> {
        self.transport_info.as_ref()
    }

    pub fn expected_delivery_date(&self) -> Option<DateTime<Utc>> {
        self.expected_delivery_date
    }

    pub fn shipped_at(&self) -> Option<DateTime<Utc>> {
        self.shipped_at
    }

    pub fn completion_date(&self) -> Option<DateTime<Utc>> {
        self.completion_date
    }

    pub fn total_ordered(&self) -> i64 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    pub fn total_received(&self) -> i64 {
        self.items.iter().map(|i| i.received_quantity).sum()
    }

    pub fn reference(&self) -> DocumentReference {
        DocumentReference::new(DocumentType::Transfer, *self.id.as_uuid(), self.code.clone())
    }

    fn ensure(&self, allowed: &[TransferStatus], action: &'static str) -> DomainResult<()> {
        self.status.ensure_one_of(allowed, DocumentType::Transfer, action)
    }

    /// Replace ordered lines (Draft only).
    pub fn update_items(&mut self, items: &[(ProductId, i64)], now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure(&[TransferStatus::Draft], "update")?;
        self.items = build_items(items)?;
        self.updated_at = now;
        Ok(())
    }

    pub fn submit(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure(&[TransferStatus::Draft], "submit")?;
        self.status = TransferStatus::Pending;
        self.updated_at = now;
        Ok(())
    }

    pub fn approve(&mut self, approved_by: UserId, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure(&[TransferStatus::Pending], "approve")?;
        self.status = TransferStatus::Approved;
        self.approved_by = Some(approved_by);
        self.updated_at = now;
        Ok(())
    }

    pub fn revert_to_draft(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure(&[TransferStatus::Pending], "revert to draft")?;
        self.status = TransferStatus::Draft;
        self.approved_by = None;
        self.updated_at = now;
        Ok(())
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure(
            &[TransferStatus::Draft, TransferStatus::Pending, TransferStatus::Approved],
            "cancel",
        )?;
        self.status = TransferStatus::Cancelled;
        self.updated_at = now;
        Ok(())
    }

    /// Transfer Out movements for the full ordered quantity, in product order.
    pub fn shipment_movements(&self, performed_by: UserId) -> DomainResult<Vec<MovementRequest>> {
        self.ensure(&[TransferStatus::Approved], "ship")?;
        let reference = self.reference();
        let mut items: Vec<&TransferItem> = self.items.iter().collect();
        items.sort_by_key(|i| i.product_id);

        Ok(items
            .into_iter()
            .map(|item| {
                MovementRequest::new(
                    MovementType::TransferOut,
                    item.product_id,
                    self.from_warehouse,
                    -item.quantity,
                    performed_by,
                    reference.clone(),
                )
                .with_route(self.from_warehouse, self.to_warehouse)
            })
            .collect())
    }

    pub fn mark_shipped(
        &mut self,
        shipped_by: UserId,
        transport_info: Option<TransportInfo>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.ensure(&[TransferStatus::Approved], "ship")?;
        self.status = TransferStatus::InTransit;
        self.shipped_by = Some(shipped_by);
        if transport_info.is_some() {
            self.transport_info = transport_info;
        }
        self.shipped_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Validate a receipt call and build its destination movements.
    ///
    /// The whole call is rejected if any line is unknown, negative, or would
    /// push a product past its ordered quantity.
    pub fn plan_receipt(&self, lines: &[ReceiptLine], performed_by: UserId) -> DomainResult<Receipt> {
        self.ensure(
            &[TransferStatus::InTransit, TransferStatus::PartiallyReceived],
            "receive",
        )?;
        if lines.is_empty() {
            return Err(DomainError::validation("receipt requires at least one line"));
        }

        let mut increments: BTreeMap<ProductId, i64> = BTreeMap::new();
        for line in lines {
            if line.received_quantity < 0 {
                return Err(DomainError::validation("received quantity cannot be negative"));
            }
            let total = increments.entry(line.product_id).or_insert(0);
            *total = total
                .checked_add(line.received_quantity)
                .ok_or_else(|| DomainError::validation("received quantity overflow"))?;
        }

        for (product_id, received) in &increments {
            let item = self
                .items
                .iter()
                .find(|i| i.product_id == *product_id)
                .ok_or_else(|| {
                    DomainError::validation(format!("product {product_id} is not part of this transfer"))
                })?;
            let cumulative = item
                .received_quantity
                .checked_add(*received)
                .ok_or_else(|| DomainError::validation("received quantity overflow"))?;
            if cumulative > item.quantity {
                return Err(DomainError::validation(format!(
                    "received quantity for product {product_id} exceeds ordered quantity ({} + {} > {})",
                    item.received_quantity, received, item.quantity
                )));
            }
        }
        increments.retain(|_, received| *received > 0);

        let reference = self.reference();
        let movements = increments
            .iter()
            .map(|(product_id, received)| {
                MovementRequest::new(
                    MovementType::TransferIn,
                    *product_id,
                    self.to_warehouse,
                    *received,
                    performed_by,
                    reference.clone(),
                )
                .with_route(self.from_warehouse, self.to_warehouse)
            })
            .collect();

        Ok(Receipt {
            movements,
            increments,
        })
    }

    /// Record a planned receipt and recompute status from aggregate totals.
    pub fn apply_receipt(
        &mut self,
        receipt: &Receipt,
        received_by: UserId,
        now: DateTime<Utc>,
    ) -> DomainResult<TransferStatus> {
        self.ensure(
            &[TransferStatus::InTransit, TransferStatus::PartiallyReceived],
            "receive",
        )?;
        for item in &mut self.items {
            if let Some(received) = receipt.increments.get(&item.product_id) {
                item.received_quantity += received;
            }
        }

        let received = self.total_received();
        if received == 0 {
            return Ok(self.status);
        }
        if received < self.total_ordered() {
            self.status = TransferStatus::PartiallyReceived;
        } else {
            self.status = TransferStatus::Completed;
            self.completion_date = Some(now);
            self.received_by = Some(received_by);
        }
        self.updated_at = now;
        Ok(self.status)
    }

    pub fn ensure_deletable(&self) -> DomainResult<()> {
        if self.status.is_deletable() {
            Ok(())
        } else {
            Err(DomainError::invalid_transition(
                DocumentType::Transfer,
                self.status.label(),
                "delete",
            ))
        }
    }
}

fn build_items(lines: &[(ProductId, i64)]) -> DomainResult<Vec<TransferItem>> {
    if lines.is_empty() {
        return Err(DomainError::validation("transfer requires at least one item"));
    }
    let mut seen = HashSet::new();
    let mut items = Vec::with_capacity(lines.len());
    for (product_id, quantity) in lines {
        if *quantity < 1 {
            return Err(DomainError::validation("transfer quantity must be at least 1"));
        }
        if !seen.insert(*product_id) {
            return Err(DomainError::validation(format!(
                "product {product_id} appears more than once"
            )));
        }
        items.push(TransferItem::new(*product_id, *quantity));
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn new_transfer(items: Vec<(ProductId, i64)>) -> NewTransfer {
        NewTransfer {
            from_warehouse: WarehouseId::new(),
            to_warehouse: WarehouseId::new(),
            items,
            requested_by: UserId::new(),
            expected_delivery_date: None,
            notes: None,
        }
    }

    fn shipped(items: Vec<(ProductId, i64)>) -> Transfer {
        let mut transfer =
            Transfer::create(TransferId::new(), "TR-00001", new_transfer(items), test_time()).unwrap();
        transfer.submit(test_time()).unwrap();
        transfer.approve(UserId::new(), test_time()).unwrap();
        transfer.mark_shipped(UserId::new(), None, test_time()).unwrap();
        transfer
    }

    fn line(product_id: ProductId, received_quantity: i64) -> ReceiptLine {
        ReceiptLine {
            product_id,
            received_quantity,
        }
    }

    #[test]
    fn create_rejects_same_warehouse_and_bad_quantities() {
        let warehouse = WarehouseId::new();
        let mut input = new_transfer(vec![(ProductId::new(), 5)]);
        input.to_warehouse = warehouse;
        input.from_warehouse = warehouse;
        assert!(matches!(
            Transfer::create(TransferId::new(), "TR-1", input, test_time()),
            Err(DomainError::Validation(_))
        ));

        assert!(Transfer::create(TransferId::new(), "TR-1", new_transfer(vec![(ProductId::new(), 0)]), test_time()).is_err());
        assert!(Transfer::create(TransferId::new(), "TR-1", new_transfer(vec![]), test_time()).is_err());
    }

    #[test]
    fn overflowing_receipt_lines_are_rejected() {
        let product = ProductId::new();
        let mut transfer = shipped(vec![(product, 10)]);
        let receiver = UserId::new();

        let wrapped = transfer.plan_receipt(&[line(product, i64::MAX), line(product, i64::MAX), line(product, 5)], receiver);
        assert!(matches!(wrapped, Err(DomainError::Validation(_))));

        let receipt = transfer.plan_receipt(&[line(product, 5)], receiver).unwrap();
        transfer.apply_receipt(&receipt, receiver, test_time()).unwrap();
        let past_received = transfer.plan_receipt(&[line(product, i64::MAX)], receiver);
        assert!(matches!(past_received, Err(DomainError::Validation(_))));
        assert_eq!(transfer.items()[0].received_quantity, 5);
    }

    #[test]
    fn shipping_requires_approval() {
        let mut transfer =
            Transfer::create(TransferId::new(), "TR-1", new_transfer(vec![(ProductId::new(), 5)]), test_time()).unwrap();
        assert!(matches!(
            transfer.shipment_movements(UserId::new()),
            Err(DomainError::InvalidStateTransition { action: "ship", .. })
        ));
        transfer.submit(test_time()).unwrap();
        transfer.approve(UserId::new(), test_time()).unwrap();

        let movements = transfer.shipment_movements(UserId::new()).unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].quantity_change, -5);
        assert_eq!(movements[0].warehouse_id, transfer.from_warehouse());
        assert_eq!(movements[0].to_warehouse, Some(transfer.to_warehouse()));
    }

    #[test]
    fn partial_then_full_receipt_completes() {
        let product = ProductId::new();
        let mut transfer = shipped(vec![(product, 50)]);
        let receiver = UserId::new();

        let receipt = transfer.plan_receipt(&[line(product, 20)], receiver).unwrap();
        assert_eq!(receipt.total(), 20);
        assert_eq!(
            transfer.apply_receipt(&receipt, receiver, test_time()).unwrap(),
            TransferStatus::PartiallyReceived
        );
        assert_eq!(transfer.items()[0].outstanding(), 30);
        assert!(transfer.completion_date().is_none());

        let receipt = transfer.plan_receipt(&[line(product, 30)], receiver).unwrap();
        assert_eq!(
            transfer.apply_receipt(&receipt, receiver, test_time()).unwrap(),
            TransferStatus::Completed
        );
        assert!(transfer.completion_date().is_some());
        assert_eq!(transfer.received_by(), Some(receiver));
    }

    #[test]
    fn full_receipt_in_one_call_jumps_to_completed() {
        let a = ProductId::new();
        let b = ProductId::new();
        let mut transfer = shipped(vec![(a, 3), (b, 4)]);
        let receipt = transfer.plan_receipt(&[line(a, 3), line(b, 4)], UserId::new()).unwrap();
        assert_eq!(receipt.movements.len(), 2);
        assert_eq!(
            transfer.apply_receipt(&receipt, UserId::new(), test_time()).unwrap(),
            TransferStatus::Completed
        );
    }

    #[test]
    fn zero_receipt_leaves_status_unchanged() {
        let product = ProductId::new();
        let mut transfer = shipped(vec![(product, 10)]);
        let receipt = transfer.plan_receipt(&[line(product, 0)], UserId::new()).unwrap();
        assert!(receipt.is_empty());
        assert_eq!(
            transfer.apply_receipt(&receipt, UserId::new(), test_time()).unwrap(),
            TransferStatus::InTransit
        );
    }

    #[test]
    fn over_receipt_rejects_the_whole_call() {
        let a = ProductId::new();
        let b = ProductId::new();
        let transfer = shipped(vec![(a, 10), (b, 10)]);

        let err = transfer
            .plan_receipt(&[line(a, 5), line(b, 6), line(b, 5)], UserId::new())
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        assert!(transfer.plan_receipt(&[line(ProductId::new(), 1)], UserId::new()).is_err());
        assert!(transfer.plan_receipt(&[line(a, -1)], UserId::new()).is_err());
    }

    #[test]
    fn cancel_is_not_allowed_once_shipped() {
        let mut transfer = shipped(vec![(ProductId::new(), 1)]);
        assert!(transfer.cancel(test_time()).is_err());
        assert!(transfer.ensure_deletable().is_err());
    }

    #[test]
    fn pending_transfer_can_be_sent_back_and_deleted() {
        let mut transfer =
            Transfer::create(TransferId::new(), "TR-1", new_transfer(vec![(ProductId::new(), 5)]), test_time()).unwrap();
        transfer.submit(test_time()).unwrap();
        assert!(transfer.ensure_deletable().is_ok());
        transfer.revert_to_draft(test_time()).unwrap();
        assert_eq!(transfer.status(), TransferStatus::Draft);
    }
}
