use async_trait::async_trait;
use tracing::{debug, warn};

use crate::domain::{DeadLetter, RelayRecord};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// A record with the same natural key already exists.
    #[error("record already exists")]
    Conflict,

    #[error("{0}")]
    Other(String),
}

/// Port for the durable log of relayed messages.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Insert a record. Fails with [`StoreError::Conflict`] on a duplicate
    /// `(message_id, source_group_id, target_group_id)`.
    async fn append(&self, record: &RelayRecord) -> Result<(), StoreError>;

    /// Record (or update) a message that could not be forwarded.
    async fn park(&self, letter: &DeadLetter) -> Result<(), StoreError>;

    async fn close(&self) -> Result<(), StoreError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Persisted {
    Inserted,
    Duplicate,
    Failed,
}

/// Append `record`, treating a duplicate as already done.
///
/// Other failures are logged and reported as [`Persisted::Failed`]; the
/// message has already been delivered at this point.
pub async fn persist(store: &dyn MessageStore, record: &RelayRecord) -> Persisted {
    match store.append(record).await {
        Ok(()) => Persisted::Inserted,
        Err(StoreError::Conflict) => {
            debug!(message_id = record.message_id.0, "record already stored");
            Persisted::Duplicate
        }
        Err(e) => {
            warn!(message_id = record.message_id.0, error = %e, "failed to store relayed message");
            Persisted::Failed
        }
    }
}
