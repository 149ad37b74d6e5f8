//! Pure movement planning.
//!
//! The coordinator loads the current snapshot inside its transaction and asks
//! this module what to write. Nothing here touches storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{DomainError, DomainResult, LedgerEntryId, ProductId, UserId, WarehouseId};

use crate::ledger::{DocumentReference, LedgerEntry, MovementType};
use crate::snapshot::{StockKey, StockSnapshot, StockThresholds};

/// Request to change the on-hand quantity of one snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRequest {
    pub movement_type: MovementType,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity_change: i64,
    pub performed_by: UserId,
    pub reference: DocumentReference,
    pub notes: Option<String>,
    pub from_warehouse: Option<WarehouseId>,
    pub to_warehouse: Option<WarehouseId>,
}

impl MovementRequest {
    pub fn new(
        movement_type: MovementType,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity_change: i64,
        performed_by: UserId,
        reference: DocumentReference,
    ) -> Self {
        Self {
            movement_type,
            product_id,
            warehouse_id,
            quantity_change,
            performed_by,
            reference,
            notes: None,
            from_warehouse: None,
            to_warehouse: None,
        }
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }

    pub fn with_route(mut self, from_warehouse: WarehouseId, to_warehouse: WarehouseId) -> Self {
        self.from_warehouse = Some(from_warehouse);
        self.to_warehouse = Some(to_warehouse);
        self
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.product_id, self.warehouse_id)
    }

    /// Input checks that need no stored state.
    pub fn validate(&self) -> DomainResult<()> {
        self.movement_type.validate_change(self.quantity_change)?;
        self.validate_route()
    }

    /// Route checks only; record-only entries run this without the non-zero rule.
    pub fn validate_route(&self) -> DomainResult<()> {
        if !self.movement_type.rule().transfer_leg {
            if self.from_warehouse.is_some() || self.to_warehouse.is_some() {
                return Err(DomainError::validation(format!(
                    "{} movements cannot carry a transfer route",
                    self.movement_type
                )));
            }
            return Ok(());
        }

        let (Some(from), Some(to)) = (self.from_warehouse, self.to_warehouse) else {
            return Err(DomainError::validation(format!(
                "{} requires both from and to warehouses",
                self.movement_type
            )));
        };
        if from == to {
            return Err(DomainError::validation(
                "from and to warehouses must differ",
            ));
        }
        let expected = match self.movement_type {
            MovementType::TransferOut => from,
            _ => to,
        };
        if self.warehouse_id != expected {
            return Err(DomainError::validation(format!(
                "{} must be applied to the {} warehouse of the route",
                self.movement_type,
                if self.movement_type == MovementType::TransferOut { "source" } else { "destination" }
            )));
        }
        Ok(())
    }
}

/// Identity and time assigned to a ledger entry before it is planned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryStamp {
    pub id: LedgerEntryId,
    pub code: String,
    pub recorded_at: DateTime<Utc>,
}

impl EntryStamp {
    pub fn new(code: impl Into<String>, recorded_at: DateTime<Utc>) -> Self {
        Self {
            id: LedgerEntryId::new(),
            code: code.into(),
            recorded_at,
        }
    }
}

/// The writes a movement produces: the new snapshot state and its ledger entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedMovement {
    pub snapshot: StockSnapshot,
    pub entry: LedgerEntry,
    /// True when the snapshot did not exist and must be inserted.
    pub created_snapshot: bool,
}

/// Decide the ledger entry and snapshot update for a movement.
///
/// `current` must be read inside the same transaction the result is written in.
pub fn plan_movement(
    current: Option<&StockSnapshot>,
    request: &MovementRequest,
    defaults: StockThresholds,
    stamp: EntryStamp,
) -> DomainResult<PlannedMovement> {
    request.validate()?;

    let key = request.key();
    let (base, created_snapshot) = match current {
        Some(snapshot) => {
            if snapshot.key() != key {
                return Err(DomainError::validation("snapshot does not match movement key"));
            }
            (snapshot.clone(), false)
        }
        None if request.quantity_change > 0 && request.movement_type.rule().creates_snapshot => {
            (StockSnapshot::empty(key, defaults, stamp.recorded_at), true)
        }
        None => {
            return Err(DomainError::not_found(format!(
                "stock snapshot for product {} in warehouse {}",
                key.product_id, key.warehouse_id
            )));
        }
    };

    let quantity_before = base.quantity();
    let quantity_after = quantity_before
        .checked_add(request.quantity_change)
        .ok_or_else(|| DomainError::validation("quantity overflow"))?;
    if quantity_after < 0 {
        return Err(DomainError::InsufficientStock {
            product: key.product_id,
            warehouse: key.warehouse_id,
            available: quantity_before,
            requested: request
                .quantity_change
                .checked_neg()
                .ok_or_else(|| DomainError::validation("quantity change out of range"))?,
        });
    }

    let entry = LedgerEntry {
        id: stamp.id,
        code: stamp.code,
        movement_type: request.movement_type,
        product_id: key.product_id,
        warehouse_id: key.warehouse_id,
        quantity_before,
        quantity_change: request.quantity_change,
        quantity_after,
        reference: request.reference.clone(),
        from_warehouse: request.from_warehouse,
        to_warehouse: request.to_warehouse,
        performed_by: request.performed_by,
        recorded_at: stamp.recorded_at,
        notes: request.notes.clone(),
    };

    Ok(PlannedMovement {
        snapshot: base.with_quantity(quantity_after, stamp.recorded_at),
        entry,
        created_snapshot,
    })
}

/// Build a zero-change, record-keeping ledger entry.
///
/// Used for dispositions that do not touch stock (dispose, repair, ...). The
/// snapshot is not modified; before and after both reflect the current quantity.
pub fn plan_audit_entry(
    current: Option<&StockSnapshot>,
    request: &MovementRequest,
    stamp: EntryStamp,
) -> DomainResult<LedgerEntry> {
    if request.quantity_change != 0 {
        return Err(DomainError::validation(
            "audit entries cannot change quantity",
        ));
    }
    request.validate_route()?;
    let quantity = current.map(StockSnapshot::quantity).unwrap_or(0);
    Ok(LedgerEntry {
        id: stamp.id,
        code: stamp.code,
        movement_type: request.movement_type,
        product_id: request.product_id,
        warehouse_id: request.warehouse_id,
        quantity_before: quantity,
        quantity_change: 0,
        quantity_after: quantity,
        reference: request.reference.clone(),
        from_warehouse: request.from_warehouse,
        to_warehouse: request.to_warehouse,
        performed_by: request.performed_by,
        recorded_at: stamp.recorded_at,
        notes: request.notes.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{compute_stock_status, StockStatus};
    use proptest::prelude::*;
    use stockflow_core::DocumentType;
    use uuid::Uuid;

    fn reference() -> DocumentReference {
        DocumentReference::new(DocumentType::Manual, Uuid::now_v7(), "MAN-1")
    }

    fn thresholds() -> StockThresholds {
        StockThresholds::new(10, 200).unwrap()
    }

    fn request(ty: MovementType, key: StockKey, change: i64) -> MovementRequest {
        MovementRequest::new(ty, key.product_id, key.warehouse_id, change, UserId::new(), reference())
    }

    fn stamp() -> EntryStamp {
        EntryStamp::new("IT-00001", Utc::now())
    }

    fn key() -> StockKey {
        StockKey::new(ProductId::new(), WarehouseId::new())
    }

    #[test]
    fn purchase_on_missing_snapshot_creates_it() {
        let key = key();
        let planned = plan_movement(None, &request(MovementType::Purchase, key, 100), thresholds(), stamp()).unwrap();

        assert!(planned.created_snapshot);
        assert_eq!(planned.snapshot.quantity(), 100);
        assert_eq!(planned.snapshot.stock_status(), StockStatus::InStock);
        assert_eq!(planned.entry.quantity_before, 0);
        assert_eq!(planned.entry.quantity_after, 100);
    }

    #[test]
    fn sale_reduces_quantity_and_records_before_after() {
        let key = key();
        let existing = StockSnapshot::restore(key, 100, thresholds(), Utc::now());
        let planned = plan_movement(Some(&existing), &request(MovementType::Sale, key, -30), thresholds(), stamp()).unwrap();

        assert!(!planned.created_snapshot);
        assert_eq!(planned.snapshot.quantity(), 70);
        assert_eq!(planned.entry.quantity_before, 100);
        assert_eq!(planned.entry.quantity_change, -30);
        assert_eq!(planned.entry.quantity_after, 70);
    }

    #[test]
    fn decrease_on_missing_snapshot_is_not_found() {
        let err = plan_movement(None, &request(MovementType::Sale, key(), -1), thresholds(), stamp()).unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[test]
    fn restock_return_requires_existing_snapshot() {
        let err = plan_movement(None, &request(MovementType::Return, key(), 5), thresholds(), stamp()).unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[test]
    fn overdraw_is_insufficient_stock() {
        let key = key();
        let existing = StockSnapshot::restore(key, 15, thresholds(), Utc::now());
        let err = plan_movement(Some(&existing), &request(MovementType::Sale, key, -1000), thresholds(), stamp()).unwrap_err();
        assert_eq!(
            err,
            DomainError::InsufficientStock {
                product: key.product_id,
                warehouse: key.warehouse_id,
                available: 15,
                requested: 1000,
            }
        );
    }

    #[test]
    fn transfer_legs_require_a_consistent_route() {
        let key = key();
        let other = WarehouseId::new();
        let existing = StockSnapshot::restore(key, 50, thresholds(), Utc::now());

        let missing_route = request(MovementType::TransferOut, key, -5);
        assert!(plan_movement(Some(&existing), &missing_route, thresholds(), stamp()).is_err());

        let wrong_side = request(MovementType::TransferOut, key, -5).with_route(other, key.warehouse_id);
        assert!(plan_movement(Some(&existing), &wrong_side, thresholds(), stamp()).is_err());

        let ok = request(MovementType::TransferOut, key, -5).with_route(key.warehouse_id, other);
        let planned = plan_movement(Some(&existing), &ok, thresholds(), stamp()).unwrap();
        assert_eq!(planned.entry.from_warehouse, Some(key.warehouse_id));
        assert_eq!(planned.entry.to_warehouse, Some(other));

        let routed_sale = request(MovementType::Sale, key, -5).with_route(key.warehouse_id, other);
        assert!(plan_movement(Some(&existing), &routed_sale, thresholds(), stamp()).is_err());
    }

    #[test]
    fn audit_entry_leaves_quantity_untouched() {
        let key = key();
        let existing = StockSnapshot::restore(key, 42, thresholds(), Utc::now());
        let entry = plan_audit_entry(Some(&existing), &request(MovementType::Return, key, 0), stamp()).unwrap();
        assert!(entry.is_audit_only());
        assert_eq!(entry.quantity_before, 42);
        assert_eq!(entry.quantity_after, 42);

        assert!(plan_audit_entry(None, &request(MovementType::Return, key, 3), stamp()).is_err());
    }

    #[test]
    fn most_negative_change_is_rejected_not_negated() {
        let key = key();
        let existing = StockSnapshot::restore(key, 5, thresholds(), Utc::now());
        let err = plan_movement(Some(&existing), &request(MovementType::Sale, key, i64::MIN), thresholds(), stamp())
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let largest = plan_movement(Some(&existing), &request(MovementType::Sale, key, i64::MIN + 1), thresholds(), stamp())
            .unwrap_err();
        assert!(matches!(largest, DomainError::InsufficientStock { available: 5, requested: i64::MAX, .. }));
    }

    #[test]
    fn audit_entry_rejects_a_route_on_non_transfer_types() {
        let key = key();
        let existing = StockSnapshot::restore(key, 8, thresholds(), Utc::now());
        let routed = request(MovementType::Return, key, 0).with_route(key.warehouse_id, WarehouseId::new());
        let err = plan_audit_entry(Some(&existing), &routed, stamp()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: for any sequence of movements, the snapshot never goes
        /// negative, every entry satisfies before + change == after, and the
        /// final quantity equals the sum of applied changes.
        #[test]
        fn applied_changes_sum_to_snapshot_quantity(
            changes in prop::collection::vec(-150i64..150i64, 1..60)
        ) {
            let key = key();
            let mut snapshot: Option<StockSnapshot> = None;
            let mut applied = 0i64;

            for change in changes {
                if change == 0 {
                    continue;
                }
                let req = request(MovementType::Adjustment, key, change);
                match plan_movement(snapshot.as_ref(), &req, thresholds(), stamp()) {
                    Ok(planned) => {
                        prop_assert_eq!(
                            planned.entry.quantity_before + planned.entry.quantity_change,
                            planned.entry.quantity_after
                        );
                        applied += planned.entry.quantity_change;
                        snapshot = Some(planned.snapshot);
                    }
                    Err(DomainError::InsufficientStock { .. }) | Err(DomainError::NotFound(_)) => {}
                    Err(other) => prop_assert!(false, "unexpected error: {other:?}"),
                }

                if let Some(s) = &snapshot {
                    prop_assert!(s.quantity() >= 0);
                    prop_assert_eq!(s.quantity(), applied);
                    let t = s.thresholds();
                    prop_assert_eq!(
                        s.stock_status(),
                        compute_stock_status(s.quantity(), t.min_stock_level, t.max_stock_level)
                    );
                }
            }
        }
    }
}
