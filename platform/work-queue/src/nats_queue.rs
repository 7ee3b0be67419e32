//! NATS-based implementation of the WorkQueue trait

use crate::{QueueError, QueueResult, WorkQueue};
use async_nats::Client;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;

/// WorkQueue implementation using NATS queue groups
///
/// Each named list maps to a subject under `opf.queue.*`. Consumers join a
/// shared queue group so every item is handed to exactly one consumer,
/// regardless of how many processes are popping.
///
/// # Example
/// ```rust,no_run
/// use work_queue::{NatsQueue, WorkQueue};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = async_nats::connect("nats://localhost:4222").await?;
/// let queue = NatsQueue::new(client);
/// queue.push("webhook:delivery", b"job".to_vec()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct NatsQueue {
    client: Client,
    subscribers: Arc<DashMap<String, Arc<Mutex<async_nats::Subscriber>>>>,
}

const QUEUE_GROUP: &str = "opf-workers";

impl NatsQueue {
    /// Create a new NatsQueue from an already-connected client
    pub fn new(client: Client) -> Self {
        Self {
            client,
            subscribers: Arc::new(DashMap::new()),
        }
    }

    /// Connect to a NATS server and wrap the client
    pub async fn connect(url: &str) -> QueueResult<Self> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| QueueError::ConnectionError(e.to_string()))?;
        Ok(Self::new(client))
    }

    /// Get a reference to the underlying NATS client
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn subject_for(list: &str) -> String {
        // List names use `:` separators (e.g. "webhook:delivery"); NATS
        // subjects use `.`.
        format!("opf.queue.{}", list.replace(':', "."))
    }

    async fn subscriber_for(&self, list: &str) -> QueueResult<Arc<Mutex<async_nats::Subscriber>>> {
        if let Some(existing) = self.subscribers.get(list) {
            return Ok(existing.value().clone());
        }

        let subject = Self::subject_for(list);
        let sub = self
            .client
            .queue_subscribe(subject, QUEUE_GROUP.to_string())
            .await
            .map_err(|e| QueueError::ConnectionError(e.to_string()))?;

        let sub = Arc::new(Mutex::new(sub));
        self.subscribers.insert(list.to_string(), sub.clone());
        Ok(sub)
    }
}

#[async_trait]
impl WorkQueue for NatsQueue {
    async fn push(&self, list: &str, payload: Vec<u8>) -> QueueResult<()> {
        self.client
            .publish(Self::subject_for(list), payload.into())
            .await
            .map_err(|e| QueueError::PushError(e.to_string()))
    }

    async fn pop(&self, list: &str, wait: Duration) -> QueueResult<Option<Vec<u8>>> {
        let sub = self.subscriber_for(list).await?;
        let mut sub = sub.lock().await;
        match timeout(wait, sub.next()).await {
            Ok(Some(msg)) => Ok(Some(msg.payload.to_vec())),
            Ok(None) => Err(QueueError::ConnectionError(
                "subscription closed".to_string(),
            )),
            Err(_) => Ok(None),
        }
    }

    async fn healthy(&self) -> bool {
        self.client.connection_state() == async_nats::connection::State::Connected
    }
}
