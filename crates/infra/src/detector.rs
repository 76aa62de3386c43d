//! Low-stock detection.

use tracing::{debug, instrument};

use kade_inventory::Product;

use crate::store::{CatalogStore, StoreError};

/// Pure read over the catalog: every product whose stock is below its
/// reorder level. Nothing is cached; each call sees the latest committed state.
#[derive(Debug, Clone)]
pub struct LowStockDetector<S> {
    store: S,
}

impl<S> LowStockDetector<S>
where
    S: CatalogStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[instrument(skip(self), err)]
    pub async fn detect(&self) -> Result<Vec<Product>, StoreError> {
        let low = self.store.list_low_stock().await?;
        debug!(count = low.len(), "low-stock products detected");
        Ok(low)
    }
}
