//! OSINT toolkit: scrape pages, find PII and keywords, coordinate workers over queues.
//!
//! This library provides shared modules for the two binaries:
//! - `osint-web`: HTTP API that enqueues investigations and proxies RPCs
//! - `osint-worker`: consume loops serving scrape and analysis requests
//!
//! ## Architecture
//!
//! ```text
//! HTTP → Web API → investigate queue → Worker ─→ scrape RPC ─→ WebScraper
//!                                             └→ analyze_text RPC ─→ TextAnalysisService
//! ```

pub mod analysis;
pub mod config;
pub mod html;
pub mod queue;
pub mod scrape;
pub mod util;
pub mod web;
pub mod worker;

// Re-export commonly used types
pub use analysis::{TextAnalysisResult, TextAnalysisService};
pub use config::Config;
pub use html::ScrapedPage;
pub use queue::{
    AmqpTransport, MemoryTransport, Queue, QueueError, RequestResponseQueue, Transport,
    TransportError,
};
pub use scrape::{ScrapingOptions, WebScraper};
pub use web::AppState;
pub use worker::Worker;
