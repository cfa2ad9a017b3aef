pub mod admin;
pub mod audit;
pub mod auth_sso;
mod common;
pub mod corpora;
pub mod documents;
pub mod legacy;
pub mod ops;
pub mod run;
pub mod scim;
pub mod self_serve;

use axum::Router;

use crate::state::AppState;

/// All `/v1/**` routes (spec §4.1): plans/quotas/authz/governance/crypto and
/// compliance administration, tenant self-serve, document and corpus
/// mutation, retrieval, audit, and ops.
pub fn versioned_router() -> Router<AppState> {
    Router::new()
        .merge(run::router())
        .merge(documents::router())
        .merge(corpora::router())
        .merge(audit::router())
        .merge(ops::router())
        .merge(admin::router())
        .merge(self_serve::router())
}

/// The full app router: `/v1/**` plus the unversioned routes spec §4.1
/// keeps alive with deprecation headers, plus SSO and SCIM, which were
/// never versioned to begin with.
pub fn app_router() -> Router<AppState> {
    Router::new()
        .nest("/v1", versioned_router())
        .merge(legacy::router())
        .merge(auth_sso::router())
        .merge(scim::router())
}
