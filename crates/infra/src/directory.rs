//! Read-only lookups against the warehouse, product and user directories.
//!
//! Those records are owned by the surrounding application; the inventory core
//! only checks that referenced ids exist.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use stockflow_core::{ProductId, UserId, WarehouseId};

use crate::error::{ServiceError, ServiceResult};

#[async_trait]
pub trait Directory: Send + Sync {
    async fn warehouse_exists(&self, id: WarehouseId) -> ServiceResult<bool>;
    async fn product_exists(&self, id: ProductId) -> ServiceResult<bool>;
    async fn user_exists(&self, id: UserId) -> ServiceResult<bool>;
}

#[async_trait]
impl<D> Directory for Arc<D>
where
    D: Directory + ?Sized,
{
    async fn warehouse_exists(&self, id: WarehouseId) -> ServiceResult<bool> {
        (**self).warehouse_exists(id).await
    }

    async fn product_exists(&self, id: ProductId) -> ServiceResult<bool> {
        (**self).product_exists(id).await
    }

    async fn user_exists(&self, id: UserId) -> ServiceResult<bool> {
        (**self).user_exists(id).await
    }
}

pub(crate) async fn require_warehouse<D: Directory + ?Sized>(directory: &D, id: WarehouseId) -> ServiceResult<()> {
    if directory.warehouse_exists(id).await? {
        Ok(())
    } else {
        Err(ServiceError::NotFound(format!("warehouse {id}")))
    }
}

pub(crate) async fn require_product<D: Directory + ?Sized>(directory: &D, id: ProductId) -> ServiceResult<()> {
    if directory.product_exists(id).await? {
        Ok(())
    } else {
        Err(ServiceError::NotFound(format!("product {id}")))
    }
}

pub(crate) async fn require_user<D: Directory + ?Sized>(directory: &D, id: UserId) -> ServiceResult<()> {
    if directory.user_exists(id).await? {
        Ok(())
    } else {
        Err(ServiceError::NotFound(format!("user {id}")))
    }
}

/// In-memory directory for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    warehouses: RwLock<HashSet<WarehouseId>>,
    products: RwLock<HashSet<ProductId>>,
    users: RwLock<HashSet<UserId>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_warehouse(&self, id: WarehouseId) {
        insert(&self.warehouses, id);
    }

    pub fn add_product(&self, id: ProductId) {
        insert(&self.products, id);
    }

    pub fn add_user(&self, id: UserId) {
        insert(&self.users, id);
    }
}

// A panicked writer cannot leave a `HashSet` half-inserted, so poisoning is
// recovered on both paths.
fn insert<T: Eq + std::hash::Hash>(set: &RwLock<HashSet<T>>, id: T) {
    set.write().unwrap_or_else(PoisonError::into_inner).insert(id);
}

fn contains<T: Eq + std::hash::Hash>(set: &RwLock<HashSet<T>>, id: &T) -> ServiceResult<bool> {
    Ok(set.read().unwrap_or_else(PoisonError::into_inner).contains(id))
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn warehouse_exists(&self, id: WarehouseId) -> ServiceResult<bool> {
        contains(&self.warehouses, &id)
    }

    async fn product_exists(&self, id: ProductId) -> ServiceResult<bool> {
        contains(&self.products, &id)
    }

    async fn user_exists(&self, id: UserId) -> ServiceResult<bool> {
        contains(&self.users, &id)
    }
}
