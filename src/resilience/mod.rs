//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Invocation:
//!     → timeouts.rs (budget = min(config timeout, runtime deadline))
//!     → upstream checkout + request + body, all under one deadline
//!     → On expiry: the in-flight request is dropped, 504 reply
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every upstream call has a deadline
//! - No retries: request bodies may not be safely replayable

pub mod timeouts;
