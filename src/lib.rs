//! Invocation-to-HTTP relay library.
//!
//! Exposes a local HTTP server through a serverless runtime: each inbound
//! invocation event is translated into an HTTP request, forwarded to the
//! upstream listener, and its response is translated back.

pub mod adapter;
pub mod config;
pub mod error;
pub mod event;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod runtime;

pub use adapter::Adapter;
pub use config::schema::RelayConfig;
pub use error::AdapterError;
pub use event::{InvocationContext, InvocationEvent};
pub use http::{InvocationResponse, InvokeServer};
pub use lifecycle::Shutdown;
