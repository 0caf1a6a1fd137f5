use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header::AUTHORIZATION, request::Parts, HeaderMap};

use crate::claims::Claims;
use crate::error::{AuthError, AuthResult};

/// Verified, permission-checked request identity inserted by the guard layer.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub claims: Claims,
    pub token: String,
}

impl AuthContext {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.claims.has_permission(permission)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or(AuthError::AuthContextMissing)
    }
}

/// Pull the bearer credential out of a raw `Authorization` header value.
///
/// The value must be exactly `<scheme> <token>` where the scheme is
/// `bearer` in any case. A blank value is treated the same as an absent one.
pub fn extract_bearer(header: Option<&str>) -> AuthResult<&str> {
    let raw = header
        .filter(|value| !value.trim().is_empty())
        .ok_or(AuthError::AuthorizationHeaderMissing)?;

    let mut parts = raw.split_whitespace();
    let scheme = parts.next().ok_or(AuthError::AuthorizationHeaderMissing)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::InvalidHeaderScheme);
    }

    let token = parts.next().ok_or(AuthError::InvalidHeaderNoToken)?;
    if parts.next().is_some() {
        return Err(AuthError::InvalidHeaderTooManyParts);
    }

    Ok(token)
}

/// Header-map flavour of [`extract_bearer`]; a non-ASCII value cannot carry a bearer scheme.
pub fn bearer_from_headers(headers: &HeaderMap) -> AuthResult<String> {
    let header = match headers.get(AUTHORIZATION) {
        Some(value) => Some(value.to_str().map_err(|_| AuthError::InvalidHeaderScheme)?),
        None => None,
    };
    extract_bearer(header).map(str::to_owned)
}
