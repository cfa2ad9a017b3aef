//! Region failover control plane (spec §4.13, C15).

pub mod readiness;
pub mod state;
pub mod store;
pub mod token;

pub use readiness::{evaluate_readiness, Blocker, Readiness, Recommendation};
pub use state::FailoverState;
pub use store::{FailoverRun, FailoverStore, InMemoryFailoverStore, PgFailoverStore, TRANSITION_COOLDOWN};
pub use token::{FailoverToken, InMemoryTokenStore, TokenPurpose, TokenStore, TOKEN_TTL};

pub const MIGRATIONS: &[(&str, &str)] = &[("0001_failover", include_str!("../migrations/0001_failover.sql"))];
