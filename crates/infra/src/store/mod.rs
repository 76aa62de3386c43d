//! Catalog and ledger persistence boundary.
//!
//! The traits here describe the catalog table, the append-only stock ledger and
//! the single atomic write that ties them together. Two implementations ship:
//! an in-memory store (tests/dev) and a Postgres store.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryInventoryStore;
pub use postgres::PostgresInventoryStore;
pub use r#trait::{CatalogStore, InventoryStore, MovementOrder, SharedStore, StockLedger, StoreError};
