// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Persistence boundary of the routing core.
//!
//! The core only depends on the operation sets below; backends are free to
//! choose their own layout. The default backend is the in-memory one in
//! [`memory`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::future::Future;
use std::time::Duration;

use codec::TopicFilter;

use crate::message::{Delivery, Message, SessionState, Subscription};
use crate::types::MessageId;

pub mod memory;

pub use memory::{MemoryArchiveStore, MemoryQueueStore, MemoryRetainedStore, MemorySessionStore};

/// Error type for storage operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// No record for this key.
    NotFound(String),

    /// Backend timeout or other retryable fault.
    Transient(String),

    /// Permanent backend failure.
    Operation(String),
}

impl Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::NotFound(key) => write!(f, "Record not found: {key}"),
            Self::Transient(msg) => write!(f, "Transient storage error: {msg}"),
            Self::Operation(msg) => write!(f, "Storage operation failed: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Session record as persisted between connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    pub client_id: String,
    /// Seconds the session outlives a disconnect.
    pub session_expiry: u32,
    pub subscriptions: Vec<Subscription>,
    /// In-flight and receiving state of the last connection.
    pub state: SessionState,
    /// Unix milliseconds of the last update.
    pub updated_at: u64,
}

/// Per-client persistent session state.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, client_id: &str) -> Result<Option<StoredSession>>;

    async fn put(&self, session: StoredSession) -> Result<()>;

    async fn delete(&self, client_id: &str) -> Result<()>;

    async fn iterate(&self) -> Result<Vec<StoredSession>>;
}

/// FIFO queues of messages awaiting first transmission, per client.
#[async_trait]
pub trait QueueStore: Send + Sync {
    async fn enqueue(&self, client_id: &str, delivery: Delivery) -> Result<()>;

    async fn dequeue(&self, client_id: &str) -> Result<Option<Delivery>>;

    /// Remove a queued message by its broker assigned id.
    async fn remove(&self, client_id: &str, message_id: MessageId) -> Result<()>;

    /// Snapshot the queue in order without consuming it.
    async fn iterate(&self, client_id: &str) -> Result<Vec<Delivery>>;

    /// Drop the whole queue, returning the number of messages removed.
    async fn clear(&self, client_id: &str) -> Result<usize>;
}

/// Topic name to last retained message.
#[async_trait]
pub trait RetainedStore: Send + Sync {
    /// Store the message as the retained one of its topic. An empty
    /// payload deletes the entry instead of storing it.
    async fn put(&self, message: Message) -> Result<()>;

    async fn get(&self, topic: &str) -> Result<Option<Message>>;

    /// The single latest retained message of every topic matching the
    /// filter.
    async fn find_matching(&self, filter: &TopicFilter) -> Result<Vec<Message>>;

    /// Remove entries whose expiry deadline has passed, returning how many
    /// were dropped.
    async fn purge_expired(&self, now: u64) -> Result<usize>;
}

/// Append-only log of every accepted publication.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    async fn append(&self, message: Message) -> Result<()>;

    async fn purge_before(&self, instant: u64) -> Result<usize>;
}

/// Run a storage operation, retrying transient faults with bounded
/// exponential backoff. Exhausting the budget surfaces the last error.
pub async fn with_retry<T, F, Fut>(retry_limit: u32, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = Duration::from_millis(50);
    let mut attempt = 0;
    loop {
        match op().await {
            Err(StorageError::Transient(msg)) if attempt < retry_limit => {
                attempt += 1;
                log::warn!("store: Transient error, attempt {attempt}/{retry_limit}: {msg}");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test]
    async fn test_with_retry_recovers_from_transient_errors() {
        let failures = Cell::new(2);
        let failures_ref = &failures;
        let result = with_retry(3, || async move {
            if failures_ref.get() > 0 {
                failures_ref.set(failures_ref.get() - 1);
                Err(StorageError::Transient("backend busy".to_string()))
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test]
    async fn test_with_retry_gives_up() {
        let result: Result<()> = with_retry(1, || async {
            Err(StorageError::Transient("down".to_string()))
        })
        .await;
        assert!(matches!(result, Err(StorageError::Transient(_))));
    }
}
