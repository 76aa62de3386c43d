//! Stock mutation engine.
//!
//! Every change to a product's on-hand quantity goes through
//! [`StockMutationEngine::apply_movement`]:
//!
//! ```text
//! MovementRequest
//!   ↓
//! 1. Acquire the product's lock (bounded wait)
//!   ↓
//! 2. Load the current Product (NotFound if gone)
//!   ↓
//! 3. Decide: Product::handle (pure, produces one StockMovement)
//!   ↓
//! 4. Apply the movement to a copy of the product (stock + delta, version + 1)
//!   ↓
//! 5. Commit catalog row + ledger entry as one unit, conditional on the
//!    version read in step 2
//! ```
//!
//! The lock serializes writers inside one process; the version condition
//! catches writers in other processes sharing the same database. A lost race
//! surfaces as [`MutationError::Conflict`] and is not retried here.
//!
//! Step 5 runs on a spawned task that owns the lock guard, so dropping the
//! caller's future after the commit has started cannot leave it half done.
//!
//! Catalog edits that must not interleave with a stock commit (update,
//! reorder level, delete) take the same lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{info, instrument, warn};

use kade_core::{Aggregate, AggregateRoot, DomainError, ExpectedVersion, MovementId, ProductId};
use kade_inventory::{
    AdjustmentPolicy, Direction, MovementType, NewProduct, Product, ProductPatch, RecordMovement,
    StockMovement,
};

use crate::store::{CatalogStore, InventoryStore, StoreError};

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Engine tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub adjustment_policy: AdjustmentPolicy,
    /// Longest wait for a product lock before giving up.
    pub lock_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            adjustment_policy: AdjustmentPolicy::default(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

/// One requested stock change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovementRequest {
    pub product_id: ProductId,
    pub movement_type: MovementType,
    pub quantity: i64,
    /// Only read for adjustments.
    pub direction: Direction,
}

impl MovementRequest {
    pub fn restock(product_id: ProductId, quantity: i64) -> Self {
        Self {
            product_id,
            movement_type: MovementType::Restock,
            quantity,
            direction: Direction::Increase,
        }
    }

    pub fn sale(product_id: ProductId, quantity: i64) -> Self {
        Self {
            product_id,
            movement_type: MovementType::Sale,
            quantity,
            direction: Direction::Decrease,
        }
    }

    pub fn adjustment(product_id: ProductId, quantity: i64, direction: Direction) -> Self {
        Self {
            product_id,
            movement_type: MovementType::Adjustment,
            quantity,
            direction,
        }
    }
}

/// Committed result of a movement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMovement {
    pub product: Product,
    pub movement: StockMovement,
}

/// Engine error taxonomy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MutationError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    #[error("insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: ProductId,
        available: i64,
        requested: i64,
    },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage failure: {0}")]
    StorageFailure(String),
}

impl MutationError {
    /// Stable machine-readable code.
    pub fn kind(&self) -> &'static str {
        match self {
            MutationError::Validation(_) => "validation_error",
            MutationError::ProductNotFound(_) => "not_found",
            MutationError::InsufficientStock { .. } => "insufficient_stock",
            MutationError::Conflict(_) => "conflict",
            MutationError::StorageFailure(_) => "storage_failure",
        }
    }

    /// Attach the product a domain error was raised for.
    pub fn from_domain(product_id: ProductId, err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg)
            | DomainError::InvariantViolation(msg)
            | DomainError::InvalidId(msg) => MutationError::Validation(msg),
            DomainError::NotFound => MutationError::ProductNotFound(product_id),
            DomainError::Conflict(msg) => MutationError::Conflict(msg),
            DomainError::InsufficientStock {
                available,
                requested,
            } => MutationError::InsufficientStock {
                product_id,
                available,
                requested,
            },
        }
    }
}

impl From<StoreError> for MutationError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(id) => MutationError::ProductNotFound(id),
            StoreError::DuplicateKey(id) => {
                MutationError::Conflict(format!("product {id} already exists"))
            }
            StoreError::Concurrency(msg) => MutationError::Conflict(msg),
            StoreError::InsufficientStock {
                product_id,
                available,
                requested,
            } => MutationError::InsufficientStock {
                product_id,
                available,
                requested,
            },
            StoreError::Rejected(err) => MutationError::Validation(err.to_string()),
            StoreError::Unavailable(msg) | StoreError::Corrupt(msg) => {
                MutationError::StorageFailure(msg)
            }
        }
    }
}

type LockTable = Arc<Mutex<HashMap<ProductId, Arc<AsyncMutex<()>>>>>;

/// Per-product async locks. An entry lives only while someone holds or
/// waits for it.
#[derive(Debug, Default)]
struct ProductLocks {
    table: LockTable,
}

impl ProductLocks {
    async fn acquire(
        &self,
        product_id: ProductId,
        timeout: Duration,
    ) -> Result<ProductLockGuard, MutationError> {
        let lock = {
            let mut locks = self
                .table
                .lock()
                .map_err(|_| MutationError::StorageFailure("lock table poisoned".to_string()))?;
            Arc::clone(locks.entry(product_id).or_default())
        };

        let acquired = tokio::time::timeout(timeout, lock.lock_owned()).await;
        match acquired {
            Ok(guard) => Ok(ProductLockGuard {
                product_id,
                table: Arc::clone(&self.table),
                guard: Some(guard),
            }),
            Err(_) => {
                prune(&self.table, product_id);
                Err(MutationError::StorageFailure(format!(
                    "timed out after {}ms waiting for product {product_id}",
                    timeout.as_millis()
                )))
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.table.lock().map(|locks| locks.len()).unwrap_or_default()
    }
}

/// Held product lock. Dropping it unlocks and prunes the idle table entry.
#[derive(Debug)]
struct ProductLockGuard {
    product_id: ProductId,
    table: LockTable,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ProductLockGuard {
    fn drop(&mut self) {
        self.guard.take();
        prune(&self.table, self.product_id);
    }
}

/// Remove the entry once the table holds the only reference. Holders and
/// waiters clone the `Arc` under the table lock, so a count of one is final.
fn prune(table: &LockTable, product_id: ProductId) {
    if let Ok(mut locks) = table.lock() {
        if locks.get(&product_id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&product_id);
        }
    }
}

/// Applies stock movements and serialized catalog edits.
///
/// `S` is cloned into the commit task, so pass a cheap handle (`Arc<_>`).
#[derive(Debug)]
pub struct StockMutationEngine<S> {
    store: S,
    locks: ProductLocks,
    config: EngineConfig,
}

impl<S> StockMutationEngine<S> {
    pub fn new(store: S, config: EngineConfig) -> Self {
        Self {
            store,
            locks: ProductLocks::default(),
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }
}

impl<S> StockMutationEngine<S>
where
    S: InventoryStore + Clone + 'static,
{
    /// Validate and atomically apply one movement.
    ///
    /// On success the returned product carries the committed stock and the
    /// movement is already in the ledger. On any error nothing was written.
    #[instrument(
        skip(self),
        fields(
            product_id = %request.product_id,
            movement_type = %request.movement_type,
            quantity = request.quantity
        ),
        err
    )]
    pub async fn apply_movement(
        &self,
        request: MovementRequest,
    ) -> Result<AppliedMovement, MutationError> {
        let product_id = request.product_id;
        let guard = self.locks.acquire(product_id, self.config.lock_timeout).await?;

        let product = self.store.find(product_id).await?;
        let command = RecordMovement {
            movement_id: MovementId::new(),
            product_id,
            movement_type: request.movement_type,
            quantity: request.quantity,
            direction: request.direction,
            adjustment_policy: self.config.adjustment_policy,
            occurred_at: Utc::now(),
        };

        let movement = match product.handle(&command) {
            Ok(mut events) if events.len() == 1 => events.remove(0),
            Ok(events) => {
                return Err(MutationError::StorageFailure(format!(
                    "expected one movement, decision produced {}",
                    events.len()
                )));
            }
            Err(err) => {
                warn!(error = %err, "movement rejected");
                return Err(MutationError::from_domain(product_id, err));
            }
        };

        let expected = ExpectedVersion::Exact(product.version());
        let mut updated = product;
        updated.apply(&movement);

        let store = self.store.clone();
        let commit = tokio::spawn(async move {
            let _guard = guard;
            store
                .commit_movement(&updated, expected, &movement)
                .await
                .map(|()| AppliedMovement {
                    product: updated,
                    movement,
                })
        });

        let applied = commit
            .await
            .map_err(|e| MutationError::StorageFailure(format!("commit task failed: {e}")))??;

        info!(
            movement_id = %applied.movement.movement_id,
            delta = applied.movement.delta,
            stock = applied.product.stock(),
            "movement committed"
        );
        Ok(applied)
    }

    /// Add a product to the catalog.
    #[instrument(skip(self, input), fields(product_id = %input.product_id), err)]
    pub async fn create_product(&self, input: NewProduct) -> Result<Product, MutationError> {
        let product_id = input.product_id;
        let product = Product::create(input).map_err(|e| MutationError::from_domain(product_id, e))?;
        let created = self.store.create(product).await?;
        info!("product created");
        Ok(created)
    }

    /// Partial catalog update. Stock is not reachable from here.
    #[instrument(skip(self, patch), fields(product_id = %product_id), err)]
    pub async fn update_product(
        &self,
        product_id: ProductId,
        patch: ProductPatch,
    ) -> Result<Product, MutationError> {
        let _guard = self.locks.acquire(product_id, self.config.lock_timeout).await?;
        Ok(self.store.update(product_id, patch).await?)
    }

    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub async fn set_reorder_level(
        &self,
        product_id: ProductId,
        level: i64,
    ) -> Result<Product, MutationError> {
        let _guard = self.locks.acquire(product_id, self.config.lock_timeout).await?;
        Ok(self.store.set_reorder_level(product_id, level).await?)
    }

    /// Remove a product. Its ledger entries stay.
    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub async fn delete_product(&self, product_id: ProductId) -> Result<Product, MutationError> {
        let _guard = self.locks.acquire(product_id, self.config.lock_timeout).await?;
        let removed = self.store.delete(product_id).await?;
        info!("product deleted");
        Ok(removed)
    }
}
