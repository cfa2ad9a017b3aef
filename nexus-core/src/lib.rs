//! Shared identifiers, data model, configuration, and error types for the
//! NexusRAG platform — the foundation every other crate builds on, the same
//! role `adk-core` plays in the teacher's workspace.

pub mod circuit_breaker;
pub mod config;
pub mod context;
pub mod error;
pub mod ids;
pub mod model;
pub mod redact;

pub use circuit_breaker::CircuitBreaker;
pub use config::NexusConfig;
pub use context::{Principal, RequestContext, RouteClass};
pub use error::{NexusError, Result};
