//! Failure policy of consume loops.
//!
//! A consume loop never crashes on a bad message. What happens to the
//! offending payload is decided here: it is either dropped or moved to the
//! queue's dead-letter queue. Messages are never requeued.

use std::str::FromStr;
use std::time::Duration;

use crate::config::Config;

/// What a consume loop does with a message it failed to process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailureAction {
    /// Log and discard the message.
    #[default]
    Drop,
    /// Log and republish the raw payload to `<queue>_dead_letter`.
    DeadLetter,
}

impl FromStr for FailureAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drop" => Ok(FailureAction::Drop),
            "dead_letter" | "dead-letter" | "deadletter" => Ok(FailureAction::DeadLetter),
            other => Err(format!("unknown failure action: {other}")),
        }
    }
}

/// Per-queue failure policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumePolicy {
    /// Applied when a payload cannot be decoded into the queue's type
    pub on_decode_error: FailureAction,
    /// Applied when the handler returns an error
    pub on_handler_error: FailureAction,
}

impl ConsumePolicy {
    /// Whether any failure path needs the dead-letter queue.
    pub fn uses_dead_letter(&self) -> bool {
        self.on_decode_error == FailureAction::DeadLetter
            || self.on_handler_error == FailureAction::DeadLetter
    }
}

/// Default interval a consume loop blocks for before re-checking cancellation.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Settings shared by every queue a process opens.
#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Upper bound on a single blocking pop inside a consume loop
    pub poll_interval: Duration,
    /// Failure policy of consume loops
    pub policy: ConsumePolicy,
    /// Worker identity reported in logs
    pub worker: String,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            policy: ConsumePolicy::default(),
            worker: "unknown".to_string(),
        }
    }
}

impl QueueOptions {
    /// Build queue settings from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            policy: ConsumePolicy {
                on_decode_error: config.on_decode_error,
                on_handler_error: config.on_handler_error,
            },
            worker: config.hostname.clone(),
        }
    }

    /// Override the poll interval.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Override the failure policy.
    pub fn with_policy(mut self, policy: ConsumePolicy) -> Self {
        self.policy = policy;
        self
    }
}
