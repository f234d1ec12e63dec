//! Authentication handling

use axum::http::{header, HeaderMap};
use rivalscope_core::config::{AuthConfig, AuthMode};

/// Header carrying the tenant a request acts for.
pub const TENANT_HEADER: &str = "x-tenant-id";
pub const DEFAULT_TENANT: &str = "default";

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[derive(Debug, thiserror::Error)]
#[error("unauthorized: {0}")]
pub struct AuthError(pub String);

#[derive(Clone, Debug)]
pub struct ResolvedAuth {
    pub mode: AuthMode,
    pub token: Option<String>,
}

impl ResolvedAuth {
    pub fn from_config(config: &AuthConfig, env_token: Option<String>) -> Self {
        let token = config.token.clone().or(env_token);
        Self {
            mode: config.mode.clone(),
            token,
        }
    }

    pub fn none() -> Self {
        Self {
            mode: AuthMode::None,
            token: None,
        }
    }

    pub fn verify_token(&self, provided: Option<&str>) -> Result<(), AuthError> {
        match self.mode {
            AuthMode::None => Ok(()),
            AuthMode::Token => {
                let expected = self
                    .token
                    .as_deref()
                    .ok_or_else(|| AuthError("no token configured".into()))?;
                let provided = provided.ok_or_else(|| AuthError("bearer token required".into()))?;
                if !constant_time_eq(expected.as_bytes(), provided.as_bytes()) {
                    return Err(AuthError("invalid token".into()));
                }
                Ok(())
            }
        }
    }

    pub fn verify_headers(&self, headers: &HeaderMap) -> Result<(), AuthError> {
        self.verify_token(bearer_token(headers))
    }
}

/// Token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// Tenant from the `x-tenant-id` header; blank or missing means the default tenant.
pub fn tenant_id(headers: &HeaderMap) -> String {
    headers
        .get(TENANT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_TENANT)
        .to_string()
}
