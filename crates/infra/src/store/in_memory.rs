use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use kade_core::{AggregateRoot, ExpectedVersion, ProductId};
use kade_inventory::{Product, ProductPatch, StockMovement};

use super::r#trait::{CatalogStore, InventoryStore, MovementOrder, StockLedger, StoreError};

#[derive(Debug, Default)]
struct Tables {
    products: HashMap<ProductId, Product>,
    /// Insertion order of live products.
    order: Vec<ProductId>,
    /// Append-only, in commit order.
    movements: Vec<StockMovement>,
}

/// In-memory catalog and ledger.
///
/// Intended for tests/dev. Both tables sit behind one lock so a stock commit is
/// a single critical section; no `.await` happens while it is held.
#[derive(Debug, Default)]
pub struct InMemoryInventoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }
}

#[async_trait]
impl CatalogStore for InMemoryInventoryStore {
    async fn create(&self, product: Product) -> Result<Product, StoreError> {
        let mut tables = self.write()?;
        let id = product.id_typed();
        if tables.products.contains_key(&id) {
            return Err(StoreError::DuplicateKey(id));
        }
        tables.order.push(id);
        tables.products.insert(id, product.clone());
        Ok(product)
    }

    async fn find(&self, product_id: ProductId) -> Result<Product, StoreError> {
        self.read()?
            .products
            .get(&product_id)
            .cloned()
            .ok_or(StoreError::NotFound(product_id))
    }

    async fn update(&self, product_id: ProductId, patch: ProductPatch) -> Result<Product, StoreError> {
        let mut tables = self.write()?;
        let product = tables
            .products
            .get_mut(&product_id)
            .ok_or(StoreError::NotFound(product_id))?;

        // Work on a copy so a rejected patch leaves the row as it was.
        let mut updated = product.clone();
        updated.apply_patch(patch)?;
        *product = updated.clone();
        Ok(updated)
    }

    async fn delete(&self, product_id: ProductId) -> Result<Product, StoreError> {
        let mut tables = self.write()?;
        let removed = tables
            .products
            .remove(&product_id)
            .ok_or(StoreError::NotFound(product_id))?;
        tables.order.retain(|id| *id != product_id);
        Ok(removed)
    }

    async fn list_all(&self) -> Result<Vec<Product>, StoreError> {
        let tables = self.read()?;
        tables
            .order
            .iter()
            .map(|id| {
                tables
                    .products
                    .get(id)
                    .cloned()
                    .ok_or_else(|| StoreError::Corrupt(format!("order index references missing product {id}")))
            })
            .collect()
    }
}

#[async_trait]
impl StockLedger for InMemoryInventoryStore {
    async fn append(&self, movement: StockMovement) -> Result<StockMovement, StoreError> {
        let mut tables = self.write()?;
        if tables.movements.iter().any(|m| m.movement_id == movement.movement_id) {
            return Err(StoreError::Concurrency(format!(
                "movement {} already recorded",
                movement.movement_id
            )));
        }
        tables.movements.push(movement.clone());
        Ok(movement)
    }

    async fn list_movements(&self, order: MovementOrder) -> Result<Vec<StockMovement>, StoreError> {
        let mut movements = self.read()?.movements.clone();
        // Stable sort keeps commit order among equal timestamps.
        match order {
            MovementOrder::OldestFirst => movements.sort_by(|a, b| a.date.cmp(&b.date)),
            MovementOrder::NewestFirst => {
                movements.reverse();
                movements.sort_by(|a, b| b.date.cmp(&a.date));
            }
        }
        Ok(movements)
    }

    async fn list_for_product(&self, product_id: ProductId) -> Result<Vec<StockMovement>, StoreError> {
        let mut movements: Vec<StockMovement> = self
            .read()?
            .movements
            .iter()
            .filter(|m| m.product_id == product_id)
            .cloned()
            .collect();
        movements.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(movements)
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn commit_movement(
        &self,
        product: &Product,
        expected_version: ExpectedVersion,
        movement: &StockMovement,
    ) -> Result<(), StoreError> {
        let id = product.id_typed();
        if movement.product_id != id {
            return Err(StoreError::Corrupt(format!(
                "movement targets product {}, commit targets {id}",
                movement.product_id
            )));
        }
        if product.stock() < 0 {
            return Err(StoreError::insufficient_stock(product, movement));
        }

        let mut tables = self.write()?;
        let current = tables
            .products
            .get(&id)
            .ok_or(StoreError::NotFound(id))?
            .version();
        if !expected_version.matches(current) {
            return Err(StoreError::Concurrency(format!(
                "product {id}: expected {expected_version:?}, found {current}"
            )));
        }
        if tables.movements.iter().any(|m| m.movement_id == movement.movement_id) {
            return Err(StoreError::Concurrency(format!(
                "movement {} already recorded",
                movement.movement_id
            )));
        }

        tables.products.insert(id, product.clone());
        tables.movements.push(movement.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use kade_core::{DomainError, MovementId};
    use kade_inventory::{MovementType, NewProduct, Price};

    fn product(id: i64, stock: i64) -> Product {
        Product::create(NewProduct {
            product_id: ProductId::new(id),
            name: format!("Item {id}"),
            price: Price::new(250).unwrap(),
            stock,
            reorder_level: None,
            category: "General".to_string(),
        })
        .unwrap()
    }

    fn restock(product: &Product, quantity: i64, minutes: i64) -> StockMovement {
        StockMovement {
            movement_id: MovementId::new(),
            product_id: product.id_typed(),
            product_name: product.name().to_string(),
            movement_type: MovementType::Restock,
            quantity,
            delta: quantity,
            total_price: None,
            date: Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap() + Duration::minutes(minutes),
        }
    }

    fn restocked(product: &Product, delta: i64) -> Product {
        Product::restore(
            product.id_typed(),
            product.name().to_string(),
            product.price(),
            product.stock() + delta,
            product.reorder_level(),
            product.category().to_string(),
            product.version() + 1,
        )
    }

    #[tokio::test]
    async fn duplicate_product_id_is_rejected() {
        let store = InMemoryInventoryStore::new();
        store.create(product(1, 5)).await.unwrap();
        let err = store.create(product(1, 9)).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(id) if id == ProductId::new(1)));
        assert_eq!(store.find(ProductId::new(1)).await.unwrap().stock(), 5);
    }

    #[tokio::test]
    async fn list_all_keeps_insertion_order_after_delete() {
        let store = InMemoryInventoryStore::new();
        for id in [3, 1, 2] {
            store.create(product(id, 0)).await.unwrap();
        }
        store.delete(ProductId::new(1)).await.unwrap();
        let ids: Vec<i64> = store
            .list_all()
            .await
            .unwrap()
            .iter()
            .map(|p| p.id_typed().value())
            .collect();
        assert_eq!(ids, vec![3, 2]);
    }

    #[tokio::test]
    async fn rejected_update_leaves_row_unchanged() {
        let store = InMemoryInventoryStore::new();
        store.create(product(1, 5)).await.unwrap();
        let err = store
            .update(
                ProductId::new(1),
                ProductPatch {
                    name: Some("OK name".to_string()),
                    reorder_level: Some(0),
                    ..ProductPatch::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Rejected(DomainError::Validation(_))));
        let stored = store.find(ProductId::new(1)).await.unwrap();
        assert_eq!(stored.name(), "Item 1");
        assert_eq!(stored.version(), 0);
    }

    #[tokio::test]
    async fn set_reorder_level_goes_through_update() {
        let store = InMemoryInventoryStore::new();
        store.create(product(1, 5)).await.unwrap();
        let updated = store.set_reorder_level(ProductId::new(1), 3).await.unwrap();
        assert_eq!(updated.reorder_level(), 3);
        assert!(store.list_low_stock().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn commit_checks_version_and_writes_both_tables() {
        let store = InMemoryInventoryStore::new();
        let p = store.create(product(1, 5)).await.unwrap();
        let m = restock(&p, 3, 0);

        store
            .commit_movement(&restocked(&p, 3), ExpectedVersion::Exact(0), &m)
            .await
            .unwrap();
        assert_eq!(store.find(ProductId::new(1)).await.unwrap().stock(), 8);
        assert_eq!(store.list_movements(MovementOrder::NewestFirst).await.unwrap(), vec![m]);

        // Same base version again: the row has moved on.
        let stale = restock(&p, 1, 1);
        let err = store
            .commit_movement(&restocked(&p, 1), ExpectedVersion::Exact(0), &stale)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Concurrency(_)));
        assert_eq!(store.list_movements(MovementOrder::OldestFirst).await.unwrap().len(), 1);
        assert_eq!(store.find(ProductId::new(1)).await.unwrap().stock(), 8);
    }

    #[tokio::test]
    async fn negative_commit_is_insufficient_stock() {
        let store = InMemoryInventoryStore::new();
        let p = store.create(product(1, 2)).await.unwrap();
        let mut sale = restock(&p, 5, 0);
        sale.movement_type = MovementType::Sale;
        sale.delta = -5;

        let err = store
            .commit_movement(&restocked(&p, -5), ExpectedVersion::Exact(0), &sale)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::InsufficientStock { available: 2, requested: 5, .. }
        ));
        assert_eq!(store.find(ProductId::new(1)).await.unwrap().stock(), 2);
        assert!(store.list_movements(MovementOrder::NewestFirst).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn commit_against_deleted_product_is_not_found() {
        let store = InMemoryInventoryStore::new();
        let p = store.create(product(1, 5)).await.unwrap();
        store.delete(ProductId::new(1)).await.unwrap();
        let err = store
            .commit_movement(&restocked(&p, 2), ExpectedVersion::Exact(0), &restock(&p, 2, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(store.list_movements(MovementOrder::NewestFirst).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn movements_are_ordered_by_date() {
        let store = InMemoryInventoryStore::new();
        let a = product(1, 0);
        let b = product(2, 0);
        let late = restock(&a, 1, 30);
        let early = restock(&b, 2, 5);
        let middle = restock(&a, 3, 10);
        for m in [late.clone(), early.clone(), middle.clone()] {
            store.append(m).await.unwrap();
        }

        let newest: Vec<_> = store.list_movements(MovementOrder::NewestFirst).await.unwrap();
        assert_eq!(newest, vec![late.clone(), middle.clone(), early.clone()]);

        let for_a = store.list_for_product(ProductId::new(1)).await.unwrap();
        assert_eq!(for_a, vec![middle, late]);
    }

    #[tokio::test]
    async fn ledger_survives_product_deletion() {
        let store = InMemoryInventoryStore::new();
        let p = store.create(product(1, 0)).await.unwrap();
        store.append(restock(&p, 4, 0)).await.unwrap();
        store.delete(ProductId::new(1)).await.unwrap();
        let entries = store.list_for_product(ProductId::new(1)).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].product_name, "Item 1");
    }
}
