//! In-memory implementation of the WorkQueue trait for testing and development

use crate::{QueueResult, WorkQueue};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;

type Sender = mpsc::UnboundedSender<Vec<u8>>;
type Receiver = Arc<Mutex<mpsc::UnboundedReceiver<Vec<u8>>>>;

/// WorkQueue implementation backed by tokio channels
///
/// This implementation is suitable for:
/// - Unit tests (no external dependencies)
/// - Local development without Docker
/// - Single-process deployments where the retry sweep covers crashes
///
/// Each named list gets its own unbounded channel. Items are handed to
/// exactly one consumer in push order.
#[derive(Clone, Default)]
pub struct InMemoryQueue {
    lists: Arc<DashMap<String, (Sender, Receiver)>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self {
            lists: Arc::new(DashMap::new()),
        }
    }

    fn channel_for(&self, list: &str) -> (Sender, Receiver) {
        let entry = self.lists.entry(list.to_string()).or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            (tx, Arc::new(Mutex::new(rx)))
        });
        entry.value().clone()
    }
}

#[async_trait]
impl WorkQueue for InMemoryQueue {
    async fn push(&self, list: &str, payload: Vec<u8>) -> QueueResult<()> {
        let (tx, _) = self.channel_for(list);
        // The receiver half lives in the same map, so the channel is never closed.
        let _ = tx.send(payload);
        Ok(())
    }

    async fn pop(&self, list: &str, wait: Duration) -> QueueResult<Option<Vec<u8>>> {
        let (_, rx) = self.channel_for(list);
        let mut rx = rx.lock().await;
        match timeout(wait, rx.recv()).await {
            Ok(item) => Ok(item),
            Err(_) => Ok(None),
        }
    }

    async fn healthy(&self) -> bool {
        true
    }
}
