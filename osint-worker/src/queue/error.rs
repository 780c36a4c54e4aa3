//! Error types for the queue and transport layers.

use thiserror::Error;

/// Failure of the underlying message transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport was closed by its owner.
    #[error("transport is closed")]
    Closed,

    /// The AMQP broker rejected a command or the connection dropped.
    #[error("amqp error: {0}")]
    Amqp(#[from] lapin::Error),
}

/// Failure of a typed queue or RPC operation.
#[derive(Debug, Error)]
pub enum QueueError {
    /// A payload could not be encoded.
    #[error("failed to serialize message: {0}")]
    Serialization(#[source] serde_json::Error),

    /// A payload could not be decoded into the declared type.
    #[error("failed to deserialize message: {0}")]
    Deserialization(#[source] serde_json::Error),

    /// The transport failed outside of request publication.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The request of an RPC call could not be published.
    #[error("failed to publish request: {0}")]
    Publish(#[source] TransportError),

    /// No reply arrived before the deadline.
    #[error("timeout waiting for response")]
    Timeout,

    /// The caller cancelled the call before a reply arrived.
    #[error("cancelled while waiting for response")]
    Cancelled,

    /// The responder's handler failed; the text is the remote error verbatim.
    #[error("{0}")]
    Remote(String),

    /// A reply carried another call's correlation id.
    #[error("response correlation mismatch: expected {expected}, got {actual}")]
    CorrelationMismatch { expected: String, actual: String },
}

impl QueueError {
    /// Whether the call failed because no reply arrived in time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, QueueError::Timeout)
    }

    /// Whether the call failed because the remote handler reported an error.
    pub fn is_remote(&self) -> bool {
        matches!(self, QueueError::Remote(_))
    }
}
