//! Hosting runtime integration.
//!
//! # Data Flow
//! ```text
//! GET  /2018-06-01/runtime/invocation/next
//!     → request id, deadline, function ARN, trace id from headers
//!     → Adapter::handle_bytes (event body)
//! POST /2018-06-01/runtime/invocation/{id}/response   (reply JSON)
//!  or /2018-06-01/runtime/invocation/{id}/error      (configured error status)
//! ```

pub mod driver;

pub use driver::{NextInvocation, RuntimeApiDriver, RuntimeError};
