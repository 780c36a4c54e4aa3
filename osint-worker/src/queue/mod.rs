//! Queue module: typed queues and request/response RPC.
//!
//! This module provides:
//! - A [`Transport`] abstraction over named FIFO queues (RabbitMQ or in-memory)
//! - [`Queue<T>`]: typed publish and a cancellable consume loop
//! - [`RequestResponseQueue<T, R>`]: correlated RPC with per-call reply queues
//!
//! ## Architecture
//!
//! ```text
//! Web API ─→ investigate queue ─→ Worker ─→ scrape RPC ─→ Scrape responder
//!                                        └→ analyze_text RPC ─→ Analysis responder
//! ```

pub mod error;
pub mod policy;
pub mod rpc;
pub mod transport;
pub mod typed;
pub mod types;

pub use error::{QueueError, TransportError};
pub use policy::{ConsumePolicy, FailureAction, QueueOptions, DEFAULT_POLL_INTERVAL};
pub use rpc::RequestResponseQueue;
pub use transport::{AmqpTransport, Durability, MemoryTransport, Transport};
pub use typed::Queue;
pub use types::{
    dead_letter_queue_name, reply_queue_name, AnalyzeRequest, InvestigateJob, RequestMessage,
    ResponseMessage, ScrapeRequest, ANALYZE_QUEUE, INVESTIGATE_QUEUE, SCRAPE_QUEUE,
};
