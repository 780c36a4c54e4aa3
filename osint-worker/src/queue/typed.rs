//! Typed publish/consume over one named queue.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::error::{QueueError, TransportError};
use super::policy::{FailureAction, QueueOptions};
use super::transport::{Durability, Transport};
use super::types::dead_letter_queue_name;

/// Bytes of an undecodable payload echoed into the logs.
const BODY_PREVIEW_LEN: usize = 500;

/// Durable typed queue.
///
/// Messages are JSON-encoded `T` values. Any number of tasks may publish and
/// consume through the same handle; each consumed message is delivered to
/// exactly one consumer.
pub struct Queue<T> {
    transport: Arc<dyn Transport>,
    name: String,
    options: QueueOptions,
    shutdown: CancellationToken,
    _payload: PhantomData<fn() -> T>,
}

impl<T> Queue<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Open `name` on `transport`, declaring it (and its dead-letter queue
    /// when the policy needs one).
    pub async fn open(
        transport: Arc<dyn Transport>,
        name: impl Into<String>,
        options: QueueOptions,
    ) -> Result<Self, QueueError> {
        let name = name.into();

        transport.declare(&name, Durability::Durable).await?;
        if options.policy.uses_dead_letter() {
            transport
                .declare(&dead_letter_queue_name(&name), Durability::Durable)
                .await?;
        }

        info!(queue = %name, worker = %options.worker, "queue_opened");

        Ok(Self {
            transport,
            name,
            options,
            shutdown: CancellationToken::new(),
            _payload: PhantomData,
        })
    }

    /// Publish a message to the tail of the queue.
    pub async fn publish(&self, message: &T) -> Result<(), QueueError> {
        let body = serde_json::to_vec(message).map_err(QueueError::Serialization)?;
        self.transport.publish(&self.name, &body).await?;

        debug!(queue = %self.name, body_length = body.len(), "queue_message_published");
        Ok(())
    }

    /// Consume messages until the queue is closed.
    ///
    /// Each iteration blocks for at most one poll interval, so a close is
    /// observed within that bound. Decode and handler failures are logged and
    /// resolved by the queue's [`ConsumePolicy`](super::ConsumePolicy); they
    /// never end the loop. Messages are handled one at a time, in pop order.
    pub async fn consume<F, Fut>(&self, mut handler: F) -> Result<(), QueueError>
    where
        F: FnMut(T) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        info!(queue = %self.name, worker = %self.options.worker, "queue_consumer_started");

        loop {
            if self.shutdown.is_cancelled() {
                info!(queue = %self.name, worker = %self.options.worker, "queue_consumer_stopped");
                return Ok(());
            }

            let payload = match self
                .transport
                .blocking_pop(&self.name, self.options.poll_interval)
                .await
            {
                Ok(Some(payload)) => payload,
                Ok(None) => continue,
                Err(TransportError::Closed) => {
                    if self.shutdown.is_cancelled() {
                        info!(queue = %self.name, "queue_consumer_stopped");
                        return Ok(());
                    }
                    warn!(queue = %self.name, "queue_transport_closed");
                    return Err(TransportError::Closed.into());
                }
                Err(e) => {
                    error!(queue = %self.name, error = %e, "queue_pop_failed");
                    tokio::select! {
                        _ = self.shutdown.cancelled() => {}
                        _ = sleep(self.options.poll_interval) => {}
                    }
                    continue;
                }
            };

            let message: T = match serde_json::from_slice(&payload) {
                Ok(message) => message,
                Err(e) => {
                    warn!(
                        queue = %self.name,
                        error = %e,
                        body_preview = %String::from_utf8_lossy(
                            &payload[..payload.len().min(BODY_PREVIEW_LEN)]
                        ),
                        "queue_message_decode_failed"
                    );
                    self.resolve_failure(self.options.policy.on_decode_error, &payload)
                        .await;
                    continue;
                }
            };

            if let Err(e) = handler(message).await {
                error!(
                    queue = %self.name,
                    worker = %self.options.worker,
                    error = %format!("{e:#}"),
                    "queue_handler_failed"
                );
                self.resolve_failure(self.options.policy.on_handler_error, &payload)
                    .await;
            }
        }
    }

    async fn resolve_failure(&self, action: FailureAction, payload: &[u8]) {
        match action {
            FailureAction::Drop => {
                debug!(queue = %self.name, "queue_message_dropped");
            }
            FailureAction::DeadLetter => {
                let dead_letter = dead_letter_queue_name(&self.name);
                match self.transport.publish(&dead_letter, payload).await {
                    Ok(()) => {
                        info!(queue = %self.name, dead_letter = %dead_letter, "queue_message_dead_lettered");
                    }
                    Err(e) => {
                        error!(
                            queue = %self.name,
                            dead_letter = %dead_letter,
                            error = %e,
                            "queue_dead_letter_failed"
                        );
                    }
                }
            }
        }
    }
}

impl<T> Queue<T> {
    /// Name of the underlying queue.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Settings the queue was opened with.
    pub fn options(&self) -> &QueueOptions {
        &self.options
    }

    /// Transport the queue publishes through.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Token cancelled when the queue is closed.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop consume loops without releasing the transport.
    ///
    /// Used when several queues share one transport.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Stop consume loops and release the transport.
    pub async fn close(&self) -> Result<(), QueueError> {
        self.shutdown.cancel();
        self.transport.close().await?;
        info!(queue = %self.name, "queue_closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::policy::ConsumePolicy;
    use crate::queue::transport::MemoryTransport;
    use serde::Deserialize;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestMessage {
        id: String,
        tags: Vec<String>,
        score: f64,
    }

    fn fast_options() -> QueueOptions {
        QueueOptions::default().with_poll_interval(Duration::from_millis(20))
    }

    async fn open<T: Serialize + DeserializeOwned>(
        transport: &Arc<MemoryTransport>,
        options: QueueOptions,
    ) -> Arc<Queue<T>> {
        let transport: Arc<dyn Transport> = transport.clone();
        Arc::new(Queue::open(transport, "test_queue", options).await.unwrap())
    }

    #[tokio::test]
    async fn test_publish_then_consume_round_trip() {
        let transport = Arc::new(MemoryTransport::new());
        let queue = open::<TestMessage>(&transport, fast_options()).await;

        let message = TestMessage {
            id: "123".to_string(),
            tags: vec!["email".to_string(), "phone".to_string()],
            score: 0.75,
        };
        queue.publish(&message).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                queue
                    .consume(|msg| {
                        let tx = tx.clone();
                        async move {
                            tx.send(msg)?;
                            anyhow::Ok(())
                        }
                    })
                    .await
            })
        };

        let received = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, message);

        queue.stop();
        consumer.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_publish_encodes_json() {
        let transport = Arc::new(MemoryTransport::new());
        let queue = open::<String>(&transport, fast_options()).await;

        queue.publish(&"test message".to_string()).await.unwrap();

        let raw = transport
            .blocking_pop("test_queue", Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(raw, serde_json::to_vec("test message").unwrap());
    }

    #[tokio::test]
    async fn test_publish_fails_on_closed_transport() {
        let transport = Arc::new(MemoryTransport::new());
        let queue = open::<String>(&transport, fast_options()).await;
        transport.close().await.unwrap();

        let err = queue.publish(&"late".to_string()).await.unwrap_err();
        assert!(matches!(err, QueueError::Transport(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_consume_stops_within_poll_interval() {
        let transport = Arc::new(MemoryTransport::new());
        let queue = open::<String>(&transport, fast_options()).await;

        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.consume(|_| async { anyhow::Ok(()) }).await })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        let started = std::time::Instant::now();
        queue.close().await.unwrap();

        let result = tokio::time::timeout(Duration::from_millis(500), consumer)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_consume_reports_foreign_transport_close() {
        let transport = Arc::new(MemoryTransport::new());
        let queue = open::<String>(&transport, fast_options()).await;

        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.consume(|_| async { anyhow::Ok(()) }).await })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        transport.close().await.unwrap();

        let result = consumer.await.unwrap();
        assert!(matches!(
            result,
            Err(QueueError::Transport(TransportError::Closed))
        ));
    }

    #[tokio::test]
    async fn test_consume_skips_undecodable_messages() {
        let transport = Arc::new(MemoryTransport::new());
        let queue = open::<TestMessage>(&transport, fast_options()).await;

        transport.publish("test_queue", b"not json").await.unwrap();
        let good = TestMessage {
            id: "ok".to_string(),
            tags: vec![],
            score: 1.0,
        };
        queue.publish(&good).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                queue
                    .consume(|msg| {
                        let tx = tx.clone();
                        async move {
                            tx.send(msg)?;
                            anyhow::Ok(())
                        }
                    })
                    .await
            })
        };

        let received = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.id, "ok");
        assert_eq!(transport.len("test_queue").await, 0);

        queue.stop();
        consumer.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_handler_failure_does_not_stop_loop_or_requeue() {
        let transport = Arc::new(MemoryTransport::new());
        let queue = open::<u32>(&transport, fast_options()).await;

        for n in 1..=3u32 {
            queue.publish(&n).await.unwrap();
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                queue
                    .consume(|n| {
                        let tx = tx.clone();
                        async move {
                            tx.send(n)?;
                            if n == 2 {
                                anyhow::bail!("cannot handle {n}");
                            }
                            anyhow::Ok(())
                        }
                    })
                    .await
            })
        };

        let mut seen = Vec::new();
        for _ in 0..3 {
            let n = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap();
            seen.push(n);
        }
        assert_eq!(seen, vec![1, 2, 3]);

        // The failed message is gone for good
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(transport.len("test_queue").await, 0);

        queue.stop();
        consumer.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_dead_letter_policy() {
        let transport = Arc::new(MemoryTransport::new());
        let options = fast_options().with_policy(ConsumePolicy {
            on_decode_error: FailureAction::DeadLetter,
            on_handler_error: FailureAction::DeadLetter,
        });
        let queue = open::<u32>(&transport, options).await;

        transport.publish("test_queue", b"\"garbage\"").await.unwrap();
        queue.publish(&7).await.unwrap();

        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                queue
                    .consume(|n| async move { Err::<(), _>(anyhow::anyhow!("rejecting {n}")) })
                    .await
            })
        };

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while transport.len("test_queue_dead_letter").await < 2 {
            assert!(tokio::time::Instant::now() < deadline, "dead letters never arrived");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        queue.stop();
        consumer.await.unwrap().unwrap();

        let timeout = Duration::from_millis(10);
        let first = transport
            .blocking_pop("test_queue_dead_letter", timeout)
            .await
            .unwrap();
        let second = transport
            .blocking_pop("test_queue_dead_letter", timeout)
            .await
            .unwrap();
        assert_eq!(first, Some(b"\"garbage\"".to_vec()));
        assert_eq!(second, Some(b"7".to_vec()));
    }
}
