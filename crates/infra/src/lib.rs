//! Infrastructure layer: storage, the stock mutation engine, low-stock
//! detection, reorder orchestration, notification sinks and config.

pub mod config;
pub mod detector;
pub mod engine;
pub mod notify;
pub mod reorder;
pub mod store;

#[cfg(test)]
mod integration_tests;

pub use config::{ConfigError, InfraConfig};
pub use detector::LowStockDetector;
pub use engine::{AppliedMovement, EngineConfig, MovementRequest, MutationError, StockMutationEngine};
pub use notify::{NotifyError, RecordingNotifier, ReorderNotifier, TracingNotifier};
pub use reorder::{ReorderError, ReorderOrchestrator, ReorderReport, ReorderRun};
pub use store::{
    CatalogStore, InMemoryInventoryStore, InventoryStore, MovementOrder, PostgresInventoryStore,
    SharedStore, StockLedger, StoreError,
};
