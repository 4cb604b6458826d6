//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! event parts
//!     → request.rs (rewrite, add context headers, ForwardedRequest)
//!     → [adapter sends to upstream]
//!     → response.rs (ForwardedResponse → InvocationResponse)
//!
//! server.rs: local invoke endpoint feeding raw events to the adapter
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestRewrite, X_REQUEST_ID};
pub use response::{ForwardedResponse, InvocationResponse};
pub use server::InvokeServer;
