use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use kade_core::{DomainError, ExpectedVersion, ProductId};
use kade_inventory::{Product, ProductPatch, StockMovement};

/// Ledger listing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MovementOrder {
    /// Most recent movement first (display order).
    #[default]
    NewestFirst,
    /// Chronological.
    OldestFirst,
}

/// Storage operation error.
///
/// These are **infrastructure errors** (missing rows, lost races, unavailable
/// backends) as opposed to domain errors, except for `Rejected` which carries a
/// domain validation failure raised while applying an update in place.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("product {0} already exists")]
    DuplicateKey(ProductId),

    #[error("product {0} not found")]
    NotFound(ProductId),

    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("update rejected: {0}")]
    Rejected(#[from] DomainError),

    /// The committed stock would have gone negative.
    #[error("insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: ProductId,
        available: i64,
        requested: i64,
    },

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Rejection for a commit whose resulting stock is negative.
    pub fn insufficient_stock(product: &Product, movement: &StockMovement) -> Self {
        StoreError::InsufficientStock {
            product_id: product.id_typed(),
            available: product.stock() - movement.delta,
            requested: movement.quantity,
        }
    }
}

/// Durable table of product records.
///
/// `stock` is never written through this trait; see
/// [`InventoryStore::commit_movement`].
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Persist a new product. Fails with `DuplicateKey` if the id is taken.
    async fn create(&self, product: Product) -> Result<Product, StoreError>;

    async fn find(&self, product_id: ProductId) -> Result<Product, StoreError>;

    /// Apply only the provided fields.
    async fn update(&self, product_id: ProductId, patch: ProductPatch) -> Result<Product, StoreError>;

    /// Remove the product and return the removed record. Ledger entries stay.
    async fn delete(&self, product_id: ProductId) -> Result<Product, StoreError>;

    /// All products in insertion order.
    async fn list_all(&self) -> Result<Vec<Product>, StoreError>;

    async fn set_reorder_level(&self, product_id: ProductId, level: i64) -> Result<Product, StoreError> {
        self.update(product_id, ProductPatch::reorder_level(level)).await
    }

    /// Products whose stock is below their reorder level.
    async fn list_low_stock(&self) -> Result<Vec<Product>, StoreError> {
        Ok(self
            .list_all()
            .await?
            .into_iter()
            .filter(Product::is_low_stock)
            .collect())
    }
}

/// Append-only stock movement history.
#[async_trait]
pub trait StockLedger: Send + Sync {
    /// The only write the ledger exposes.
    async fn append(&self, movement: StockMovement) -> Result<StockMovement, StoreError>;

    async fn list_movements(&self, order: MovementOrder) -> Result<Vec<StockMovement>, StoreError>;

    /// Movements for one product, oldest first.
    async fn list_for_product(&self, product_id: ProductId) -> Result<Vec<StockMovement>, StoreError>;
}

/// Catalog + ledger with an atomic stock commit.
#[async_trait]
pub trait InventoryStore: CatalogStore + StockLedger {
    /// Persist `product` (already carrying its new stock and version) and append
    /// `movement`, as one unit.
    ///
    /// Implementations must:
    /// - fail with `NotFound` if the row no longer exists
    /// - fail with `Concurrency` unless the stored row is at `expected_version`
    /// - leave both tables untouched on any failure
    async fn commit_movement(
        &self,
        product: &Product,
        expected_version: ExpectedVersion,
        movement: &StockMovement,
    ) -> Result<(), StoreError>;
}

/// Type-erased store used by the service layer.
pub type SharedStore = Arc<dyn InventoryStore>;

#[async_trait]
impl<S> CatalogStore for Arc<S>
where
    S: CatalogStore + ?Sized,
{
    async fn create(&self, product: Product) -> Result<Product, StoreError> {
        (**self).create(product).await
    }

    async fn find(&self, product_id: ProductId) -> Result<Product, StoreError> {
        (**self).find(product_id).await
    }

    async fn update(&self, product_id: ProductId, patch: ProductPatch) -> Result<Product, StoreError> {
        (**self).update(product_id, patch).await
    }

    async fn delete(&self, product_id: ProductId) -> Result<Product, StoreError> {
        (**self).delete(product_id).await
    }

    async fn list_all(&self) -> Result<Vec<Product>, StoreError> {
        (**self).list_all().await
    }

    async fn set_reorder_level(&self, product_id: ProductId, level: i64) -> Result<Product, StoreError> {
        (**self).set_reorder_level(product_id, level).await
    }

    async fn list_low_stock(&self) -> Result<Vec<Product>, StoreError> {
        (**self).list_low_stock().await
    }
}

#[async_trait]
impl<S> StockLedger for Arc<S>
where
    S: StockLedger + ?Sized,
{
    async fn append(&self, movement: StockMovement) -> Result<StockMovement, StoreError> {
        (**self).append(movement).await
    }

    async fn list_movements(&self, order: MovementOrder) -> Result<Vec<StockMovement>, StoreError> {
        (**self).list_movements(order).await
    }

    async fn list_for_product(&self, product_id: ProductId) -> Result<Vec<StockMovement>, StoreError> {
        (**self).list_for_product(product_id).await
    }
}

#[async_trait]
impl<S> InventoryStore for Arc<S>
where
    S: InventoryStore + ?Sized,
{
    async fn commit_movement(
        &self,
        product: &Product,
        expected_version: ExpectedVersion,
        movement: &StockMovement,
    ) -> Result<(), StoreError> {
        (**self).commit_movement(product, expected_version, movement).await
    }
}
