//! RabbitMQ transport using lapin.
//!
//! Queues map one-to-one onto broker queues addressed through the default
//! exchange. The transport keeps a single connection and channel, shared by
//! every task of the process, and reconnects lazily when the channel drops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lapin::{
    options::{BasicGetOptions, BasicPublishOptions, QueueDeclareOptions, QueueDeleteOptions},
    types::{AMQPValue, FieldTable},
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use tokio::sync::RwLock;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::{Durability, Transport};
use crate::queue::error::TransportError;

/// Interval between two `basic.get` attempts while waiting for a message.
const GET_POLL_STEP: Duration = Duration::from_millis(100);

/// Broker-side expiry of unused reply queues, in milliseconds.
///
/// Reply queues are deleted by their caller; this only reclaims queues whose
/// caller crashed before cleaning up.
const EPHEMERAL_QUEUE_EXPIRY_MS: u32 = 10 * 60 * 1000;

/// AMQP transport with connection management.
#[derive(Clone)]
pub struct AmqpTransport {
    inner: Arc<AmqpInner>,
}

struct AmqpInner {
    url: String,
    connection: RwLock<Option<Connection>>,
    channel: RwLock<Option<Channel>>,
    closed: AtomicBool,
}

impl AmqpTransport {
    /// Create a transport for the given broker URL. Connects lazily.
    pub fn new(url: String) -> Self {
        Self {
            inner: Arc::new(AmqpInner {
                url,
                connection: RwLock::new(None),
                channel: RwLock::new(None),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Create a transport and establish the connection right away.
    pub async fn connect(url: String) -> Result<Self, TransportError> {
        let transport = Self::new(url);
        transport.ensure_connected().await?;
        Ok(transport)
    }

    /// Ensure we have a valid connection and channel.
    async fn ensure_connected(&self) -> Result<Channel, TransportError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }

        {
            let channel = self.inner.channel.read().await;
            if let Some(ch) = channel.as_ref() {
                if ch.status().connected() {
                    return Ok(ch.clone());
                }
            }
        }

        let mut connection = self.inner.connection.write().await;
        let mut channel = self.inner.channel.write().await;

        // Double-check after acquiring write lock
        if let Some(ch) = channel.as_ref() {
            if ch.status().connected() {
                return Ok(ch.clone());
            }
        }

        info!(url_length = self.inner.url.len(), "amqp_transport_connecting");

        let conn = Connection::connect(&self.inner.url, ConnectionProperties::default()).await?;
        let ch = conn.create_channel().await?;

        info!("amqp_transport_connected");

        *connection = Some(conn);
        *channel = Some(ch.clone());

        Ok(ch)
    }
}

#[async_trait]
impl Transport for AmqpTransport {
    async fn declare(&self, queue: &str, durability: Durability) -> Result<(), TransportError> {
        let channel = self.ensure_connected().await?;

        let mut arguments = FieldTable::default();
        if durability == Durability::Ephemeral {
            arguments.insert(
                "x-expires".into(),
                AMQPValue::LongUInt(EPHEMERAL_QUEUE_EXPIRY_MS),
            );
        }

        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: durability == Durability::Durable,
                    ..Default::default()
                },
                arguments,
            )
            .await?;

        debug!(queue = %queue, durability = ?durability, "amqp_queue_declared");
        Ok(())
    }

    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), TransportError> {
        let channel = self.ensure_connected().await?;

        channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default()
                    .with_delivery_mode(2) // Persistent
                    .with_content_type("application/json".into()),
            )
            .await?
            .await?;

        Ok(())
    }

    async fn blocking_pop(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, TransportError> {
        let deadline = Instant::now() + timeout;

        loop {
            let channel = self.ensure_connected().await?;

            // no_ack: the message leaves the broker as soon as it is handed out
            let message = channel
                .basic_get(queue, BasicGetOptions { no_ack: true })
                .await?;

            if let Some(message) = message {
                return Ok(Some(message.delivery.data));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            sleep(GET_POLL_STEP.min(deadline - now)).await;
        }
    }

    async fn delete(&self, queue: &str) -> Result<(), TransportError> {
        let channel = self.ensure_connected().await?;
        channel
            .queue_delete(queue, QueueDeleteOptions::default())
            .await?;
        debug!(queue = %queue, "amqp_queue_deleted");
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.inner.closed.store(true, Ordering::Release);

        let mut connection = self.inner.connection.write().await;
        let mut channel = self.inner.channel.write().await;

        if let Some(ch) = channel.take() {
            if let Err(e) = ch.close(200, "Normal shutdown").await {
                warn!(error = %e, "amqp_channel_close_error");
            }
        }

        if let Some(conn) = connection.take() {
            if let Err(e) = conn.close(200, "Normal shutdown").await {
                warn!(error = %e, "amqp_connection_close_error");
            }
        }

        info!("amqp_transport_closed");
        Ok(())
    }
}
