//! Small helpers shared across modules.

pub mod shutdown;
pub mod user_agent;

pub use shutdown::shutdown_signal;
pub use user_agent::{build_headers, pick_user_agent, DEFAULT_USER_AGENT};
