//! # WorkQueue Abstraction
//!
//! A platform-level abstraction for point-to-point work distribution.
//!
//! Unlike a pub/sub bus, a work queue hands each item to exactly one
//! consumer. Items are organized into named FIFO lists (e.g.
//! `webhook:delivery` for live work, `dead:letter` for abandoned items).
//! The queue is an accelerator, not a source of truth: producers persist
//! state in the database first, so a lost queue item is always rediscovered
//! by a periodic sweep.
//!
//! ## Implementations
//!
//! - **InMemoryQueue**: dev/test implementation using tokio channels
//! - **NatsQueue**: production implementation using NATS queue groups
//!
//! ## Usage
//!
//! ```rust
//! use work_queue::{InMemoryQueue, WorkQueue};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let queue = InMemoryQueue::new();
//! queue.push("webhook:delivery", b"job-1".to_vec()).await?;
//!
//! let item = queue.pop("webhook:delivery", Duration::from_secs(1)).await?;
//! assert_eq!(item, Some(b"job-1".to_vec()));
//! # Ok(())
//! # }
//! ```

mod inmemory_queue;
mod nats_queue;

pub use inmemory_queue::InMemoryQueue;
pub use nats_queue::NatsQueue;

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

/// Errors that can occur when using the work queue
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("failed to push item: {0}")]
    PushError(String),

    #[error("failed to pop item: {0}")]
    PopError(String),

    #[error("connection error: {0}")]
    ConnectionError(String),
}

/// Result type for work queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Core work-queue abstraction for named FIFO lists
///
/// Each list is an independent FIFO. An item pushed to a list is delivered
/// to exactly one of the consumers popping that list.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Push an item onto the tail of a named list
    async fn push(&self, list: &str, payload: Vec<u8>) -> QueueResult<()>;

    /// Pop an item from the head of a named list
    ///
    /// Blocks up to `wait` for an item to arrive. Returns `Ok(None)` when
    /// the wait elapses with nothing available.
    async fn pop(&self, list: &str, wait: Duration) -> QueueResult<Option<Vec<u8>>>;

    /// Whether the backing transport is currently usable
    async fn healthy(&self) -> bool;
}

impl fmt::Debug for dyn WorkQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WorkQueue")
    }
}
