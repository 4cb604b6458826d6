//! Timeout enforcement.
//!
//! # Responsibilities
//! - Derive the per-invocation budget from config and runtime deadline
//! - Keep a margin so the reply still reaches the runtime in time
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors
//! - Timed-out invocations reply 504 Gateway Timeout

use std::time::Duration;

/// Time reserved for posting the reply once the upstream wait gives up.
pub const REPLY_MARGIN: Duration = Duration::from_millis(50);

/// The smaller of the configured timeout and what the runtime deadline
/// leaves, less [`REPLY_MARGIN`].
pub fn invocation_budget(configured: Duration, remaining: Option<Duration>) -> Duration {
    match remaining {
        Some(left) => configured.min(left.saturating_sub(REPLY_MARGIN)),
        None => configured,
    }
}
