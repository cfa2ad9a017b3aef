//! Authentication, RBAC, ABAC, and document ACL evaluation (spec §4.2, C4).

pub mod abac;
pub mod acl;
pub mod api_key;
pub mod decision;
pub mod rbac;
pub mod sso;

pub use abac::{evaluate, Condition, Effect, Env, Policy, Value};
pub use acl::{effective_permission, satisfies};
pub use decision::{authorize, dev_bypass_principal, AbacInput, DocumentAuthzInput};
pub use rbac::{role_allows, RouteScope};
pub use sso::{handle_callback, start_login, CallbackOutcome, NonceStore, OidcProvider, StartLogin};
