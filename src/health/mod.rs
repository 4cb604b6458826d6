//! Upstream health subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (readiness.rs):
//!     Check upstream (HTTP status or TCP connect)
//!     → retry every interval, log at 2s, 4s, 8s, ...
//!     → mark ready
//!
//! async_init:
//!     Startup check gives up after 9.8s
//!     → first invocation finishes the wait inside its own timeout
//! ```

pub mod readiness;

pub use readiness::ReadinessCheck;
