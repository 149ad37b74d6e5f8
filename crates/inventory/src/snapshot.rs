use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{DomainError, DomainResult, ProductId, WarehouseId};

/// Key of a stock snapshot: one product in one warehouse.
///
/// Ordered so multi-item steps can touch snapshots in a stable order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StockKey {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
}

impl StockKey {
    pub fn new(product_id: ProductId, warehouse_id: WarehouseId) -> Self {
        Self {
            product_id,
            warehouse_id,
        }
    }
}

/// Derived availability status of a snapshot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StockStatus {
    #[serde(rename = "In Stock")]
    InStock,
    #[serde(rename = "Low Stock")]
    LowStock,
    #[serde(rename = "Out of Stock")]
    OutOfStock,
    #[serde(rename = "Overstocked")]
    Overstocked,
}

impl StockStatus {
    pub fn label(&self) -> &'static str {
        match self {
            StockStatus::InStock => "In Stock",
            StockStatus::LowStock => "Low Stock",
            StockStatus::OutOfStock => "Out of Stock",
            StockStatus::Overstocked => "Overstocked",
        }
    }
}

impl core::fmt::Display for StockStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.label())
    }
}

/// Derive the stock status from quantity and thresholds.
///
/// `max_stock_level == 0` means the snapshot has no upper bound.
pub fn compute_stock_status(quantity: i64, min_stock_level: i64, max_stock_level: i64) -> StockStatus {
    if quantity <= 0 {
        StockStatus::OutOfStock
    } else if quantity <= min_stock_level {
        StockStatus::LowStock
    } else if max_stock_level > 0 && quantity > max_stock_level {
        StockStatus::Overstocked
    } else {
        StockStatus::InStock
    }
}

/// Reorder thresholds of a snapshot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockThresholds {
    pub min_stock_level: i64,
    pub max_stock_level: i64,
}

impl StockThresholds {
    pub fn new(min_stock_level: i64, max_stock_level: i64) -> DomainResult<Self> {
        if min_stock_level < 0 || max_stock_level < 0 {
            return Err(DomainError::validation("stock levels cannot be negative"));
        }
        if max_stock_level > 0 && min_stock_level > max_stock_level {
            return Err(DomainError::validation(
                "min_stock_level cannot exceed max_stock_level",
            ));
        }
        Ok(Self {
            min_stock_level,
            max_stock_level,
        })
    }
}

/// Current on-hand quantity of one product in one warehouse.
///
/// The status is recomputed on every construction and mutation; it cannot be
/// set directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSnapshot {
    product_id: ProductId,
    warehouse_id: WarehouseId,
    quantity: i64,
    min_stock_level: i64,
    max_stock_level: i64,
    stock_status: StockStatus,
    last_stock_check: DateTime<Utc>,
}

impl StockSnapshot {
    /// A fresh, empty snapshot (quantity 0).
    pub fn empty(key: StockKey, thresholds: StockThresholds, at: DateTime<Utc>) -> Self {
        Self::restore(key, 0, thresholds, at)
    }

    /// Rebuild a snapshot from persisted fields, re-deriving the status.
    pub fn restore(
        key: StockKey,
        quantity: i64,
        thresholds: StockThresholds,
        last_stock_check: DateTime<Utc>,
    ) -> Self {
        Self {
            product_id: key.product_id,
            warehouse_id: key.warehouse_id,
            quantity,
            min_stock_level: thresholds.min_stock_level,
            max_stock_level: thresholds.max_stock_level,
            stock_status: compute_stock_status(
                quantity,
                thresholds.min_stock_level,
                thresholds.max_stock_level,
            ),
            last_stock_check,
        }
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.product_id, self.warehouse_id)
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn warehouse_id(&self) -> WarehouseId {
        self.warehouse_id
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn thresholds(&self) -> StockThresholds {
        StockThresholds {
            min_stock_level: self.min_stock_level,
            max_stock_level: self.max_stock_level,
        }
    }

    pub fn stock_status(&self) -> StockStatus {
        self.stock_status
    }

    pub fn last_stock_check(&self) -> DateTime<Utc> {
        self.last_stock_check
    }

    /// Copy with a new quantity (status re-derived, check time bumped).
    pub fn with_quantity(&self, quantity: i64, at: DateTime<Utc>) -> Self {
        Self::restore(self.key(), quantity, self.thresholds(), at)
    }

    /// Copy with new thresholds (status re-derived).
    pub fn with_thresholds(&self, thresholds: StockThresholds, at: DateTime<Utc>) -> Self {
        Self::restore(self.key(), self.quantity, thresholds, at)
    }
}
