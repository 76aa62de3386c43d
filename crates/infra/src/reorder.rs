//! Reorder orchestration.
//!
//! ```text
//! LowStockDetector ─▶ ReorderBatch (Collected)
//!                        │ process_batch: one restock per line, each independent
//!                        ▼
//!                     Processing ─▶ Completed (all lines ok) | Failed (any line errored)
//!                        │
//!                        ▼ notify (separate step, separately retryable)
//!                     ReorderNotifier
//! ```
//!
//! A notification failure never undoes a restock.
//!
//! Detection-driven runs (`build_and_process`, `run`) are serialized per
//! orchestrator, so a second run detects the state the first one left behind
//! instead of restocking the same deficit again.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use kade_core::{DomainError, ProductId};
use kade_inventory::{BatchState, ReorderBatch, ReorderLine, ReorderNotice};

use crate::detector::LowStockDetector;
use crate::engine::{MovementRequest, MutationError, StockMutationEngine};
use crate::notify::{NotifyError, ReorderNotifier};
use crate::store::{InventoryStore, StoreError};

#[derive(Debug, Error)]
pub enum ReorderError {
    #[error(transparent)]
    Batch(#[from] DomainError),

    #[error("low-stock detection failed: {0}")]
    Detection(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemOutcome {
    Success,
    Error,
}

/// Result of one line of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderItemResult {
    pub product_id: ProductId,
    pub name: String,
    pub reorder_quantity: i64,
    pub outcome: ItemOutcome,
    /// Error code when `outcome` is `error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub detail: String,
}

/// Per-item report for one processed batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderReport {
    pub batch_id: Uuid,
    pub state: BatchState,
    pub items: Vec<ReorderItemResult>,
}

impl ReorderReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &ReorderItemResult> {
        self.items.iter().filter(|i| i.outcome == ItemOutcome::Success)
    }

    pub fn failed_count(&self) -> usize {
        self.items.len() - self.succeeded().count()
    }

    /// Notices for the lines that were actually restocked.
    pub fn succeeded_notices(&self) -> Vec<ReorderNotice> {
        self.succeeded()
            .map(|i| ReorderNotice {
                product_name: i.name.clone(),
                reorder_quantity: i.reorder_quantity,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Sent,
    Skipped,
    Failed,
}

/// What happened on the notification leg of a full run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationReport {
    pub status: NotificationStatus,
    pub destination: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Build, restock and notify in one go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderRun {
    #[serde(flatten)]
    pub report: ReorderReport,
    pub notification: NotificationReport,
}

/// Drives reorder batches through the mutation engine and the notifier.
#[derive(Debug)]
pub struct ReorderOrchestrator<S, N> {
    engine: Arc<StockMutationEngine<S>>,
    detector: LowStockDetector<S>,
    notifier: N,
    run_lock: Mutex<()>,
}

impl<S, N> ReorderOrchestrator<S, N>
where
    S: InventoryStore + Clone + 'static,
    N: ReorderNotifier,
{
    pub fn new(engine: Arc<StockMutationEngine<S>>, notifier: N) -> Self {
        let detector = LowStockDetector::new(engine.store().clone());
        Self {
            engine,
            detector,
            notifier,
            run_lock: Mutex::new(()),
        }
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Collect a batch from the current low-stock set. Lines needing nothing
    /// are dropped.
    #[instrument(skip(self), err)]
    pub async fn build_reorder_batch(&self) -> Result<ReorderBatch, StoreError> {
        let low = self.detector.detect().await?;
        let batch = ReorderBatch::collect(&low, Utc::now());
        info!(batch_id = %batch.batch_id(), lines = batch.lines().len(), "reorder batch collected");
        Ok(batch)
    }

    /// Restock every line. A failed line is recorded and the rest continue.
    #[instrument(skip(self, batch), fields(batch_id = %batch.batch_id()), err)]
    pub async fn process_batch(&self, batch: &mut ReorderBatch) -> Result<ReorderReport, ReorderError> {
        batch.begin_processing()?;

        let mut items = Vec::with_capacity(batch.lines().len());
        for line in batch.lines() {
            items.push(self.process_line(line).await);
        }

        let all_succeeded = items.iter().all(|i| i.outcome == ItemOutcome::Success);
        batch.finish(all_succeeded)?;

        let report = ReorderReport {
            batch_id: batch.batch_id(),
            state: batch.state(),
            items,
        };
        info!(
            state = ?report.state,
            failed = report.failed_count(),
            total = report.items.len(),
            "reorder batch processed"
        );
        Ok(report)
    }

    /// Process a caller-supplied list of lines. An empty list is rejected.
    pub async fn process_lines(&self, lines: Vec<ReorderLine>) -> Result<ReorderReport, ReorderError> {
        let mut batch = ReorderBatch::from_lines(lines, Utc::now())?;
        self.process_batch(&mut batch).await
    }

    /// Detect, collect and restock while holding the run lock.
    pub async fn build_and_process(&self) -> Result<ReorderReport, ReorderError> {
        let _run = self.run_lock.lock().await;
        let mut batch = self.build_reorder_batch().await?;
        self.process_batch(&mut batch).await
    }

    /// Send the batch's notices to `destination`.
    #[instrument(skip(self, batch), fields(batch_id = %batch.batch_id()), err)]
    pub async fn notify(&self, batch: &ReorderBatch, destination: &str) -> Result<(), NotifyError> {
        self.notifier.notify(destination, &batch.notices()).await
    }

    /// Build, process, then notify about the lines that were restocked.
    /// A notification failure is reported in the result, not returned as an error.
    pub async fn run(&self, destination: &str) -> Result<ReorderRun, ReorderError> {
        let report = self.build_and_process().await?;
        let notices = report.succeeded_notices();

        let notification = if notices.is_empty() {
            NotificationReport {
                status: NotificationStatus::Skipped,
                destination: destination.to_string(),
                detail: Some("nothing was restocked".to_string()),
            }
        } else {
            match self.notifier.notify(destination, &notices).await {
                Ok(()) => NotificationReport {
                    status: NotificationStatus::Sent,
                    destination: destination.to_string(),
                    detail: None,
                },
                Err(err) => {
                    warn!(error = %err, batch_id = %report.batch_id, "reorder notification failed");
                    NotificationReport {
                        status: NotificationStatus::Failed,
                        destination: destination.to_string(),
                        detail: Some("notification delivery failed".to_string()),
                    }
                }
            }
        };

        Ok(ReorderRun {
            report,
            notification,
        })
    }

    async fn process_line(&self, line: &ReorderLine) -> ReorderItemResult {
        let request = MovementRequest::restock(line.product_id, line.reorder_quantity);
        match self.engine.apply_movement(request).await {
            Ok(applied) => ReorderItemResult {
                product_id: line.product_id,
                name: line.name.clone(),
                reorder_quantity: line.reorder_quantity,
                outcome: ItemOutcome::Success,
                error: None,
                detail: format!("stock is now {}", applied.product.stock()),
            },
            Err(err) => {
                warn!(product_id = %line.product_id, error = %err, "reorder line failed");
                ReorderItemResult {
                    product_id: line.product_id,
                    name: line.name.clone(),
                    reorder_quantity: line.reorder_quantity,
                    outcome: ItemOutcome::Error,
                    error: Some(err.kind().to_string()),
                    detail: match &err {
                        MutationError::StorageFailure(_) => "storage is temporarily unavailable".to_string(),
                        other => other.to_string(),
                    },
                }
            }
        }
    }
}
