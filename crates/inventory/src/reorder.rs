//! Reorder batches: which low-stock products to replenish, and by how much.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use kade_core::{DomainError, ProductId};

use crate::product::Product;

/// One product to replenish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderLine {
    pub product_id: ProductId,
    pub name: String,
    pub reorder_quantity: i64,
}

impl ReorderLine {
    /// Line for a low-stock product, or `None` when nothing needs ordering.
    pub fn for_product(product: &Product) -> Option<Self> {
        let reorder_quantity = product.reorder_quantity();
        if reorder_quantity == 0 {
            return None;
        }
        Some(Self {
            product_id: product.id_typed(),
            name: product.name().to_string(),
            reorder_quantity,
        })
    }
}

/// What a supplier is told about one line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderNotice {
    pub product_name: String,
    pub reorder_quantity: i64,
}

/// Batch lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchState {
    Collected,
    Processing,
    Completed,
    Failed,
}

impl BatchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchState::Completed | BatchState::Failed)
    }
}

/// A reorder batch, generated once per orchestration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorderBatch {
    batch_id: Uuid,
    created_at: DateTime<Utc>,
    lines: Vec<ReorderLine>,
    state: BatchState,
}

impl ReorderBatch {
    /// Collect lines for the given products, skipping any that need nothing.
    pub fn collect<'a>(
        products: impl IntoIterator<Item = &'a Product>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let lines = products.into_iter().filter_map(ReorderLine::for_product).collect();
        Self {
            batch_id: Uuid::now_v7(),
            created_at,
            lines,
            state: BatchState::Collected,
        }
    }

    /// Wrap an explicit, caller-supplied reorder list.
    pub fn from_lines(lines: Vec<ReorderLine>, created_at: DateTime<Utc>) -> Result<Self, DomainError> {
        if lines.is_empty() {
            return Err(DomainError::validation("reorder list is empty"));
        }
        Ok(Self {
            batch_id: Uuid::now_v7(),
            created_at,
            lines,
            state: BatchState::Collected,
        })
    }

    pub fn batch_id(&self) -> Uuid {
        self.batch_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn lines(&self) -> &[ReorderLine] {
        &self.lines
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Collected -> Processing.
    pub fn begin_processing(&mut self) -> Result<(), DomainError> {
        if self.state != BatchState::Collected {
            return Err(DomainError::invariant(format!(
                "batch {} cannot start processing from {:?}",
                self.batch_id, self.state
            )));
        }
        self.state = BatchState::Processing;
        Ok(())
    }

    /// Processing -> Completed (every line succeeded) or Failed.
    pub fn finish(&mut self, all_succeeded: bool) -> Result<(), DomainError> {
        if self.state != BatchState::Processing {
            return Err(DomainError::invariant(format!(
                "batch {} cannot finish from {:?}",
                self.batch_id, self.state
            )));
        }
        self.state = if all_succeeded {
            BatchState::Completed
        } else {
            BatchState::Failed
        };
        Ok(())
    }

    pub fn notices(&self) -> Vec<ReorderNotice> {
        self.lines
            .iter()
            .map(|l| ReorderNotice {
                product_name: l.name.clone(),
                reorder_quantity: l.reorder_quantity,
            })
            .collect()
    }
}
