//! HTTP surface, envelopes, and bootstrap for the NexusRAG platform.

pub mod admission;
pub mod auth;
pub mod envelope;
pub mod plans;
pub mod routes;
pub mod sse;
pub mod state;

pub use routes::app_router;
pub use state::AppState;
