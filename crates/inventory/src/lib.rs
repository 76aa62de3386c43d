//! Inventory domain module.
//!
//! This crate contains business rules for the product catalog, stock movements
//! and reorder batches, implemented purely as deterministic domain logic (no IO,
//! no HTTP, no storage).

pub mod movement;
pub mod product;
pub mod reorder;

pub use movement::{
    AdjustmentPolicy, Direction, MovementType, RecordMovement, StockMovement, net_change,
};
pub use product::{
    DEFAULT_REORDER_LEVEL, MIN_NAME_LEN, NewProduct, Price, Product, ProductPatch,
};
pub use reorder::{BatchState, ReorderBatch, ReorderLine, ReorderNotice};
