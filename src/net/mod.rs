//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Invocation ready to forward
//!     → connection.rs (checkout a bounded upstream slot)
//!     → hyper client (pooled keep-alive connection to the upstream)
//!     → slot released on completion, timeout or cancellation
//! ```
//!
//! # Design Decisions
//! - Bounded checkout prevents resource exhaustion
//! - Every checkout is tracked so leaks show up as a non-zero in-flight count

pub mod connection;

pub use connection::{SlotGuard, SlotId, UpstreamSlots};
