//! Request/response RPC over a typed queue.
//!
//! ## Call flow
//!
//! ```text
//! send_and_wait → declare <queue>_reply_<id> → publish {id, reply_to, data} on <queue>
//!                                                      ↓
//!                              consume_with_reply → handler → publish {id, data, error}
//!                                                      ↓
//! send_and_wait ← blocking pop on <queue>_reply_<id> ←─┘   (then delete the reply queue)
//! ```
//!
//! Every call gets its own reply destination, so concurrent calls on one
//! queue never see each other's responses.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::error::QueueError;
use super::policy::QueueOptions;
use super::transport::{Durability, Transport};
use super::typed::Queue;
use super::types::{reply_queue_name, RequestMessage, ResponseMessage};

/// Correlated request/response queue.
///
/// `T` is the request payload type, `R` the response payload type. Callers use
/// [`send_and_wait`](Self::send_and_wait); workers run
/// [`consume_with_reply`](Self::consume_with_reply).
pub struct RequestResponseQueue<T, R> {
    queue: Queue<RequestMessage>,
    _types: PhantomData<fn(T) -> R>,
}

impl<T, R> RequestResponseQueue<T, R> {
    /// Open the base queue `name` on `transport`.
    pub async fn open(
        transport: Arc<dyn Transport>,
        name: impl Into<String>,
        options: QueueOptions,
    ) -> Result<Self, QueueError> {
        let queue = Queue::open(transport, name, options).await?;
        Ok(Self {
            queue,
            _types: PhantomData,
        })
    }

    /// The underlying queue carrying request envelopes.
    pub fn queue(&self) -> &Queue<RequestMessage> {
        &self.queue
    }

    /// Name of the base queue.
    pub fn name(&self) -> &str {
        self.queue.name()
    }

    /// Stop responder loops without releasing the transport.
    pub fn stop(&self) {
        self.queue.stop();
    }

    /// Stop responder loops and release the transport.
    pub async fn close(&self) -> Result<(), QueueError> {
        self.queue.close().await
    }
}

impl<T, R> RequestResponseQueue<T, R>
where
    T: Serialize,
    R: DeserializeOwned,
{
    /// Send `data` and wait for the typed response.
    ///
    /// Returns [`QueueError::Timeout`] if no reply arrives within `timeout`,
    /// [`QueueError::Cancelled`] if `ctx` fires first, and
    /// [`QueueError::Remote`] carrying the responder's error text verbatim if
    /// the handler failed. The reply destination is deleted on every path.
    pub async fn send_and_wait(
        &self,
        ctx: &CancellationToken,
        data: &T,
        timeout: Duration,
    ) -> Result<R, QueueError> {
        let correlation_id = Uuid::new_v4().to_string();
        let reply = ReplyDestination::new(
            Arc::clone(self.queue.transport()),
            reply_queue_name(self.queue.name(), &correlation_id),
        );

        let result = self
            .exchange(ctx, &correlation_id, reply.name(), data, timeout)
            .await;

        reply.release().await;
        result
    }

    async fn exchange(
        &self,
        ctx: &CancellationToken,
        correlation_id: &str,
        reply_to: &str,
        data: &T,
        timeout: Duration,
    ) -> Result<R, QueueError> {
        let transport = self.queue.transport();

        let payload = serde_json::to_value(data).map_err(QueueError::Serialization)?;

        // The reply queue must exist before a responder can see the request.
        transport
            .declare(reply_to, Durability::Ephemeral)
            .await
            .map_err(QueueError::Publish)?;

        let request = RequestMessage {
            id: correlation_id.to_string(),
            reply_to: reply_to.to_string(),
            data: payload,
        };
        self.queue.publish(&request).await.map_err(|e| match e {
            QueueError::Transport(e) => QueueError::Publish(e),
            other => other,
        })?;

        debug!(
            queue = %self.queue.name(),
            correlation_id = %correlation_id,
            timeout_ms = timeout.as_millis() as u64,
            "rpc_request_sent"
        );

        let popped = tokio::select! {
            _ = ctx.cancelled() => {
                info!(queue = %self.queue.name(), correlation_id = %correlation_id, "rpc_cancelled");
                return Err(QueueError::Cancelled);
            }
            popped = transport.blocking_pop(reply_to, timeout) => popped?,
        };

        let Some(raw) = popped else {
            warn!(
                queue = %self.queue.name(),
                correlation_id = %correlation_id,
                timeout_ms = timeout.as_millis() as u64,
                "rpc_timeout"
            );
            return Err(QueueError::Timeout);
        };

        let response: ResponseMessage =
            serde_json::from_slice(&raw).map_err(QueueError::Deserialization)?;

        if response.id != correlation_id {
            error!(
                queue = %self.queue.name(),
                expected = %correlation_id,
                actual = %response.id,
                "rpc_correlation_mismatch"
            );
            return Err(QueueError::CorrelationMismatch {
                expected: correlation_id.to_string(),
                actual: response.id,
            });
        }

        if response.is_error() {
            debug!(
                queue = %self.queue.name(),
                correlation_id = %correlation_id,
                error = %response.error,
                "rpc_remote_error"
            );
            return Err(QueueError::Remote(response.error));
        }

        let result = serde_json::from_value(response.data).map_err(QueueError::Deserialization)?;

        debug!(queue = %self.queue.name(), correlation_id = %correlation_id, "rpc_response_received");
        Ok(result)
    }
}

impl<T, R> RequestResponseQueue<T, R>
where
    T: DeserializeOwned,
    R: Serialize,
{
    /// Serve requests until the queue is closed.
    ///
    /// Every request gets exactly one response on its `reply_to` destination:
    /// the handler's result, or an error carrying the handler's error text
    /// (or the decode failure when `data` does not fit `T`). Failed requests
    /// are not retried.
    pub async fn consume_with_reply<F, Fut>(&self, handler: F) -> Result<(), QueueError>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = anyhow::Result<R>>,
    {
        let handler = &handler;
        self.queue
            .consume(move |request| async move {
                self.respond(handler, request).await;
                anyhow::Ok(())
            })
            .await
    }

    async fn respond<F, Fut>(&self, handler: &F, request: RequestMessage)
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = anyhow::Result<R>>,
    {
        if request.reply_to.is_empty() {
            warn!(
                queue = %self.queue.name(),
                correlation_id = %request.id,
                "rpc_request_without_reply_to"
            );
            return;
        }

        let response = match serde_json::from_value::<T>(request.data) {
            Err(e) => {
                warn!(
                    queue = %self.queue.name(),
                    correlation_id = %request.id,
                    error = %e,
                    "rpc_request_decode_failed"
                );
                ResponseMessage::failure(&request.id, format!("failed to decode request data: {e}"))
            }
            Ok(data) => match handler(data).await {
                Ok(result) => match serde_json::to_value(&result) {
                    Ok(value) => ResponseMessage::success(&request.id, value),
                    Err(e) => {
                        error!(
                            queue = %self.queue.name(),
                            correlation_id = %request.id,
                            error = %e,
                            "rpc_response_encode_failed"
                        );
                        ResponseMessage::failure(
                            &request.id,
                            format!("failed to encode response data: {e}"),
                        )
                    }
                },
                Err(e) => {
                    error!(
                        queue = %self.queue.name(),
                        worker = %self.queue.options().worker,
                        correlation_id = %request.id,
                        error = %format!("{e:#}"),
                        "rpc_handler_failed"
                    );
                    ResponseMessage::failure(&request.id, format!("{e:#}"))
                }
            },
        };

        self.send_response(&request.reply_to, &response).await;
    }

    async fn send_response(&self, reply_to: &str, response: &ResponseMessage) {
        let body = match serde_json::to_vec(response) {
            Ok(body) => body,
            Err(e) => {
                error!(reply_to = %reply_to, error = %e, "rpc_response_serialize_failed");
                return;
            }
        };

        // No retry: on failure the caller times out.
        match self.queue.transport().publish(reply_to, &body).await {
            Ok(()) => debug!(
                reply_to = %reply_to,
                correlation_id = %response.id,
                is_error = response.is_error(),
                "rpc_response_sent"
            ),
            Err(e) => error!(
                reply_to = %reply_to,
                correlation_id = %response.id,
                error = %e,
                "rpc_response_publish_failed"
            ),
        }
    }
}

/// Reply destination owned by one in-flight call.
///
/// [`release`](Self::release) deletes it. If the call's future is dropped
/// before that, the deletion is spawned onto the runtime instead.
struct ReplyDestination {
    transport: Arc<dyn Transport>,
    name: String,
    released: bool,
}

impl ReplyDestination {
    fn new(transport: Arc<dyn Transport>, name: String) -> Self {
        Self {
            transport,
            name,
            released: false,
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn release(mut self) {
        self.released = true;
        if let Err(e) = self.transport.delete(&self.name).await {
            debug!(reply_to = %self.name, error = %e, "rpc_reply_cleanup_failed");
        }
    }
}

impl Drop for ReplyDestination {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let transport = Arc::clone(&self.transport);
        let name = std::mem::take(&mut self.name);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = transport.delete(&name).await {
                    debug!(reply_to = %name, error = %e, "rpc_reply_cleanup_failed");
                }
            });
        }
    }
}
