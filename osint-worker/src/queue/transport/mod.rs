//! Named-queue transports.
//!
//! A transport is a durable, FIFO, at-least-once queue primitive keyed by
//! queue name. The typed queues in this crate only ever talk to a transport
//! through the [`Transport`] trait, so the same code runs over RabbitMQ in
//! production and over an in-process backend in tests.
//!
//! Publishing to a queue that was never declared, or was deleted, is silently
//! discarded by every backend.

pub mod amqp;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;

use super::error::TransportError;

pub use amqp::AmqpTransport;
pub use memory::MemoryTransport;

/// Lifetime class of a declared queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Durability {
    /// Survives broker restarts; used for statically configured queues.
    Durable,
    /// Private to one call; used for reply destinations.
    Ephemeral,
}

/// Queue primitive shared by every producer and consumer of a process.
///
/// Implementations must tolerate concurrent calls from many tasks.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Create `queue` if it does not exist yet. Idempotent.
    async fn declare(&self, queue: &str, durability: Durability) -> Result<(), TransportError>;

    /// Append `payload` to the tail of `queue`.
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), TransportError>;

    /// Remove and return the head of `queue`, waiting up to `timeout`.
    ///
    /// Returns `Ok(None)` when nothing arrived in time.
    async fn blocking_pop(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, TransportError>;

    /// Delete `queue` and anything still in it. Deleting a missing queue is a no-op.
    async fn delete(&self, queue: &str) -> Result<(), TransportError>;

    /// Release the underlying connection. Later calls fail with `Closed`.
    async fn close(&self) -> Result<(), TransportError>;
}
