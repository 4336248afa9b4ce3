use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::counter_store::{CounterStore, StoreError};
use crate::ticket_number::{TicketNumber, TICKET_MODULUS};

pub const DEFAULT_KEY_PREFIX: &str = "queue:";

/// Stored by `reset_queue`: the queue exists but has issued nothing since.
/// `advance_wrapping` folds it to 0, so the next ticket is `0000`.
pub const RESET_MARKER: i64 = -1;

#[derive(Debug, Error)]
pub enum TicketError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] StoreError),
    #[error("Queue not found: {0}")]
    NotFound(String),
}

/// Snapshot of a queue as seen by `queue_status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub queue_id: String,
    /// Last issued ticket, `0000` when nothing has been issued.
    pub current: TicketNumber,
    pub exists: bool,
}

/// Issues, inspects and resets per-queue ticket counters.
///
/// Holds no counter state of its own: every call goes to the store, and
/// issuing relies on the store's atomic `advance_wrapping` so concurrent
/// callers always receive distinct numbers.
#[derive(Clone)]
pub struct TicketEngine {
    store: Arc<dyn CounterStore>,
    key_prefix: String,
}

impl TicketEngine {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self::with_key_prefix(store, DEFAULT_KEY_PREFIX)
    }

    pub fn with_key_prefix(store: Arc<dyn CounterStore>, key_prefix: impl Into<String>) -> Self {
        TicketEngine {
            store,
            key_prefix: key_prefix.into(),
        }
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    fn key(&self, queue_id: &str) -> Result<String, TicketError> {
        if queue_id.is_empty() {
            return Err(TicketError::InvalidArgument(
                "queue id must not be empty".to_string(),
            ));
        }
        Ok(format!("{}{}", self.key_prefix, queue_id))
    }

    /// Hands out the next ticket: `0000` for a queue that has none yet,
    /// otherwise the previous number plus one, wrapping after `9999`.
    #[tracing::instrument(skip(self), fields(backend = self.backend()))]
    pub async fn issue_next(&self, queue_id: &str) -> Result<TicketNumber, TicketError> {
        let key = self.key(queue_id)?;
        let next = self.store.advance_wrapping(&key, TICKET_MODULUS).await?;
        let ticket = TicketNumber::new(next)?;
        tracing::debug!(ticket = %ticket, "issued ticket");
        Ok(ticket)
    }

    #[tracing::instrument(skip(self))]
    pub async fn peek_current(&self, queue_id: &str) -> Result<TicketNumber, TicketError> {
        Ok(self.queue_status(queue_id).await?.current)
    }

    #[tracing::instrument(skip(self))]
    pub async fn queue_status(&self, queue_id: &str) -> Result<QueueStatus, TicketError> {
        let key = self.key(queue_id)?;
        let stored = self.store.get(&key).await?;
        Ok(QueueStatus {
            queue_id: queue_id.to_string(),
            current: stored
                .filter(|value| *value != RESET_MARKER)
                .map(TicketNumber::wrapping)
                .unwrap_or_default(),
            exists: stored.is_some(),
        })
    }

    /// Restarts the queue so the next issue returns `0000`, creating it if needed.
    #[tracing::instrument(skip(self))]
    pub async fn reset_queue(&self, queue_id: &str) -> Result<(), TicketError> {
        let key = self.key(queue_id)?;
        self.store.set(&key, RESET_MARKER).await?;
        tracing::info!("queue reset");
        Ok(())
    }

    /// Returns whether the queue existed before the call.
    #[tracing::instrument(skip(self))]
    pub async fn delete_queue(&self, queue_id: &str) -> Result<bool, TicketError> {
        let key = self.key(queue_id)?;
        let existed = self.store.delete(&key).await?;
        tracing::info!(existed, "queue deleted");
        Ok(existed)
    }

    pub async fn health_check(&self) -> Result<(), TicketError> {
        self.store.ping().await?;
        Ok(())
    }
}
