//! Outbound reorder notifications.
//!
//! Delivery mechanics live outside this workspace; the core only hands a list
//! of notices and a destination to a [`ReorderNotifier`].

use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use kade_inventory::ReorderNotice;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotifyError {
    #[error("invalid destination: {0}")]
    InvalidDestination(String),

    #[error("nothing to send")]
    Empty,

    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Sink for reorder notices (e.g. a supplier contact).
#[async_trait]
pub trait ReorderNotifier: Send + Sync {
    async fn notify(&self, destination: &str, notices: &[ReorderNotice]) -> Result<(), NotifyError>;
}

#[async_trait]
impl<N> ReorderNotifier for std::sync::Arc<N>
where
    N: ReorderNotifier + ?Sized,
{
    async fn notify(&self, destination: &str, notices: &[ReorderNotice]) -> Result<(), NotifyError> {
        (**self).notify(destination, notices).await
    }
}

fn check_request(destination: &str, notices: &[ReorderNotice]) -> Result<(), NotifyError> {
    if destination.trim().is_empty() {
        return Err(NotifyError::InvalidDestination("destination is empty".to_string()));
    }
    if notices.is_empty() {
        return Err(NotifyError::Empty);
    }
    Ok(())
}

/// Writes each notice to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl ReorderNotifier for TracingNotifier {
    async fn notify(&self, destination: &str, notices: &[ReorderNotice]) -> Result<(), NotifyError> {
        check_request(destination, notices)?;
        for notice in notices {
            info!(
                destination,
                product = %notice.product_name,
                reorder_quantity = notice.reorder_quantity,
                "reorder notice"
            );
        }
        Ok(())
    }
}

/// One delivered notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
    pub destination: String,
    pub notices: Vec<ReorderNotice>,
}

/// Keeps every notification in memory. Can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentNotification>>,
    fail_with: Mutex<Option<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent deliveries fail with `reason` (`None` to recover).
    pub fn set_failure(&self, reason: Option<String>) {
        if let Ok(mut fail_with) = self.fail_with.lock() {
            *fail_with = reason;
        }
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ReorderNotifier for RecordingNotifier {
    async fn notify(&self, destination: &str, notices: &[ReorderNotice]) -> Result<(), NotifyError> {
        check_request(destination, notices)?;
        let failure = self
            .fail_with
            .lock()
            .map_err(|_| NotifyError::Delivery("notifier state poisoned".to_string()))?
            .clone();
        if let Some(reason) = failure {
            return Err(NotifyError::Delivery(reason));
        }
        self.sent
            .lock()
            .map_err(|_| NotifyError::Delivery("notifier state poisoned".to_string()))?
            .push(SentNotification {
                destination: destination.to_string(),
                notices: notices.to_vec(),
            });
        Ok(())
    }
}
