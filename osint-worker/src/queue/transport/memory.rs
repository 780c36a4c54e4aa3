//! In-process transport.
//!
//! Backs every queue with a `VecDeque` behind one async mutex. Blocked pops
//! are woken through a shared `Notify` whenever anything is published.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::{timeout_at, Instant};
use tracing::debug;

use super::{Durability, Transport};
use crate::queue::error::TransportError;

/// Transport keeping all queues in memory.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    queues: Mutex<HashMap<String, VecDeque<Vec<u8>>>>,
    published: Notify,
    closed: AtomicBool,
}

impl MemoryTransport {
    /// Create an empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `queue` is currently declared.
    pub async fn exists(&self, queue: &str) -> bool {
        self.queues.lock().await.contains_key(queue)
    }

    /// Number of messages waiting in `queue` (zero if it does not exist).
    pub async fn len(&self, queue: &str) -> usize {
        self.queues
            .lock()
            .await
            .get(queue)
            .map(VecDeque::len)
            .unwrap_or(0)
    }

    /// Names of all declared queues, sorted.
    pub async fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queues.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }

    async fn try_pop(&self, queue: &str) -> Option<Vec<u8>> {
        self.queues
            .lock()
            .await
            .get_mut(queue)
            .and_then(VecDeque::pop_front)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn declare(&self, queue: &str, _durability: Durability) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.queues
            .lock()
            .await
            .entry(queue.to_string())
            .or_default();
        Ok(())
    }

    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), TransportError> {
        self.ensure_open()?;

        let routed = match self.queues.lock().await.get_mut(queue) {
            Some(messages) => {
                messages.push_back(payload.to_vec());
                true
            }
            None => false,
        };

        if routed {
            self.published.notify_waiters();
        } else {
            debug!(queue = %queue, "memory_publish_unroutable");
        }

        Ok(())
    }

    async fn blocking_pop(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, TransportError> {
        let deadline = Instant::now() + timeout;

        loop {
            self.ensure_open()?;

            // Register interest before checking so a publish in between is not missed.
            let notified = self.published.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(payload) = self.try_pop(queue).await {
                return Ok(Some(payload));
            }

            if timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn delete(&self, queue: &str) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.queues.lock().await.remove(queue);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::Release);
        self.queues.lock().await.clear();
        self.published.notify_waiters();
        Ok(())
    }
}
