//! OIDC single sign-on (spec §6): `/auth/sso/oidc/{provider}/start` mints a
//! short-TTL state nonce and redirects to the provider; `.../callback`
//! verifies the nonce and the provider's ID token, then resolves a role via
//! its configured group-to-role mapping.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use nexus_core::ids::TenantId;
use nexus_core::model::Role;
use nexus_core::{NexusError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

pub const STATE_NONCE_TTL: Duration = Duration::minutes(10);

#[derive(Debug, Clone)]
pub struct OidcProvider {
    pub id: String,
    pub issuer: String,
    pub audience: String,
    /// HMAC shared secret for a provider's ID tokens. Production IdPs sign
    /// with RS256 over JWKS; this module only handles the shared-secret
    /// case until a JWKS fetcher lands.
    pub hmac_secret: String,
    pub tenant_id: TenantId,
    /// IdP group name -> role granted to callers carrying it.
    pub group_roles: HashMap<String, Role>,
}

#[derive(Debug, Deserialize, Serialize)]
struct IdTokenClaims {
    sub: String,
    iss: String,
    aud: String,
    #[serde(default)]
    groups: Vec<String>,
    exp: usize,
}

struct Nonce {
    provider_id: String,
    return_to: String,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct NonceStore {
    nonces: RwLock<HashMap<String, Nonce>>,
}

impl NonceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mint(&self, provider_id: &str, return_to: &str, now: DateTime<Utc>) -> String {
        let state = uuid::Uuid::new_v4().to_string();
        self.nonces.write().unwrap().insert(
            state.clone(),
            Nonce { provider_id: provider_id.to_string(), return_to: return_to.to_string(), expires_at: now + STATE_NONCE_TTL },
        );
        state
    }

    /// Consumes a state value; a nonce is usable exactly once and only
    /// before its TTL expires.
    fn consume(&self, state: &str, now: DateTime<Utc>) -> Result<(String, String)> {
        let mut nonces = self.nonces.write().unwrap();
        let nonce = nonces.remove(state).ok_or(NexusError::Unauthorized)?;
        if nonce.expires_at < now {
            return Err(NexusError::Unauthorized);
        }
        Ok((nonce.provider_id, nonce.return_to))
    }
}

pub struct StartLogin {
    pub state: String,
    pub return_to: String,
}

pub fn start_login(nonces: &NonceStore, provider: &OidcProvider, return_to: &str, now: DateTime<Utc>) -> StartLogin {
    StartLogin { state: nonces.mint(&provider.id, return_to, now), return_to: return_to.to_string() }
}

pub struct CallbackOutcome {
    pub tenant_id: TenantId,
    pub subject: String,
    pub role: Role,
    pub return_to: String,
}

/// Verifies `state` against the nonce store and `id_token` against the
/// provider's issuer/audience/signature, then maps the token's groups to a
/// role via the provider's `group_roles` (highest-privilege match wins).
pub fn handle_callback(nonces: &NonceStore, provider: &OidcProvider, state: &str, id_token: &str, now: DateTime<Utc>) -> Result<CallbackOutcome> {
    let (provider_id, return_to) = nonces.consume(state, now)?;
    if provider_id != provider.id {
        return Err(NexusError::Unauthorized);
    }

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[&provider.audience]);
    validation.set_issuer(&[&provider.issuer]);
    let decoding_key = DecodingKey::from_secret(provider.hmac_secret.as_bytes());
    let token = decode::<IdTokenClaims>(id_token, &decoding_key, &validation).map_err(|_| NexusError::Unauthorized)?;

    let role = token
        .claims
        .groups
        .iter()
        .filter_map(|g| provider.group_roles.get(g).copied())
        .max_by_key(|role| match role {
            Role::Admin => 2,
            Role::Editor => 1,
            Role::Reader => 0,
        })
        .ok_or(NexusError::Forbidden)?;

    Ok(CallbackOutcome { tenant_id: provider.tenant_id.clone(), subject: token.claims.sub, role, return_to })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn provider() -> OidcProvider {
        let mut group_roles = HashMap::new();
        group_roles.insert("nexus-editors".to_string(), Role::Editor);
        OidcProvider {
            id: "okta".into(),
            issuer: "https://idp.example.com".into(),
            audience: "nexusrag".into(),
            hmac_secret: "test-secret".into(),
            tenant_id: TenantId::new("t1"),
            group_roles,
        }
    }

    fn sign(claims: &IdTokenClaims, secret: &str) -> String {
        encode(&Header::new(Algorithm::HS256), claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn full_round_trip_resolves_role_from_group() {
        let nonces = NonceStore::new();
        let provider = provider();
        let now = Utc::now();
        let login = start_login(&nonces, &provider, "/dashboard", now);

        let claims = IdTokenClaims {
            sub: "user-1".into(),
            iss: provider.issuer.clone(),
            aud: provider.audience.clone(),
            groups: vec!["nexus-editors".into()],
            exp: (now + Duration::minutes(5)).timestamp() as usize,
        };
        let id_token = sign(&claims, &provider.hmac_secret);

        let outcome = handle_callback(&nonces, &provider, &login.state, &id_token, now).unwrap();
        assert_eq!(outcome.role, Role::Editor);
        assert_eq!(outcome.return_to, "/dashboard");
    }

    #[test]
    fn reused_state_is_rejected() {
        let nonces = NonceStore::new();
        let provider = provider();
        let now = Utc::now();
        let login = start_login(&nonces, &provider, "/x", now);
        let claims = IdTokenClaims { sub: "user-1".into(), iss: provider.issuer.clone(), aud: provider.audience.clone(), groups: vec![], exp: (now + Duration::minutes(5)).timestamp() as usize };
        let id_token = sign(&claims, &provider.hmac_secret);
        handle_callback(&nonces, &provider, &login.state, &id_token, now).ok();
        let err = handle_callback(&nonces, &provider, &login.state, &id_token, now).unwrap_err();
        assert_eq!(err.code(), "UNAUTHORIZED");
    }

    #[test]
    fn expired_state_is_rejected() {
        let nonces = NonceStore::new();
        let provider = provider();
        let now = Utc::now();
        let login = start_login(&nonces, &provider, "/x", now);
        let later = now + STATE_NONCE_TTL + Duration::seconds(1);
        let claims = IdTokenClaims { sub: "user-1".into(), iss: provider.issuer.clone(), aud: provider.audience.clone(), groups: vec![], exp: (later + Duration::minutes(5)).timestamp() as usize };
        let id_token = sign(&claims, &provider.hmac_secret);
        let err = handle_callback(&nonces, &provider, &login.state, &id_token, later).unwrap_err();
        assert_eq!(err.code(), "UNAUTHORIZED");
    }

    #[test]
    fn unmapped_group_is_forbidden() {
        let nonces = NonceStore::new();
        let provider = provider();
        let now = Utc::now();
        let login = start_login(&nonces, &provider, "/x", now);
        let claims = IdTokenClaims { sub: "user-1".into(), iss: provider.issuer.clone(), aud: provider.audience.clone(), groups: vec!["unrelated-group".into()], exp: (now + Duration::minutes(5)).timestamp() as usize };
        let id_token = sign(&claims, &provider.hmac_secret);
        let err = handle_callback(&nonces, &provider, &login.state, &id_token, now).unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");
    }
}
