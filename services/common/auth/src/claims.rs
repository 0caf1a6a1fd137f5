use std::collections::BTreeSet;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::config::JwtConfig;
use crate::error::{AuthError, AuthResult};

/// Decoded token payload. Only produced by [`crate::JwtVerifier`] after the
/// signature and the standard claims have been checked.
#[derive(Debug, Clone, Serialize)]
pub struct Claims {
    issuer: String,
    audience: Vec<String>,
    subject: String,
    expires_at: DateTime<Utc>,
    issued_at: Option<DateTime<Utc>>,
    permissions: Option<BTreeSet<String>>,
    raw: serde_json::Value,
}

impl Claims {
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn audience(&self) -> &[String] {
        &self.audience
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.issued_at
    }

    /// `None` when the token carried no `permissions` claim at all.
    pub fn permissions(&self) -> Option<&BTreeSet<String>> {
        self.permissions.as_ref()
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions
            .as_ref()
            .is_some_and(|granted| granted.contains(permission))
    }

    /// Full decoded payload, including claims this crate does not model.
    pub fn raw(&self) -> &serde_json::Value {
        &self.raw
    }

    pub(crate) fn from_payload(value: serde_json::Value) -> AuthResult<Self> {
        let repr: ClaimsRepr = serde_json::from_value(value.clone())
            .map_err(|err| AuthError::MalformedClaims(err.to_string()))?;
        let mut claims = Claims::try_from(repr)?;
        claims.raw = value;
        Ok(claims)
    }

    /// Expiry first, then issuer and audience.
    pub(crate) fn validate(&self, config: &JwtConfig, now: DateTime<Utc>) -> AuthResult<()> {
        let cutoff = now - chrono::Duration::seconds(i64::from(config.leeway_seconds));
        if self.expires_at <= cutoff {
            return Err(AuthError::TokenExpired);
        }

        let issuer = config.issuer();
        if self.issuer != issuer {
            return Err(AuthError::InvalidClaims(format!(
                "issuer '{}' does not match '{issuer}'",
                self.issuer
            )));
        }

        if !self.audience.iter().any(|aud| aud == &config.audience) {
            return Err(AuthError::InvalidClaims(format!(
                "audience does not include '{}'",
                config.audience
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ClaimsRepr {
    #[serde(default)]
    sub: String,
    exp: i64,
    #[serde(default)]
    iat: Option<i64>,
    iss: String,
    #[serde(default)]
    aud: Option<AudienceRepr>,
    #[serde(default)]
    permissions: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AudienceRepr {
    Single(String),
    Many(Vec<String>),
}

impl TryFrom<ClaimsRepr> for Claims {
    type Error = AuthError;

    fn try_from(value: ClaimsRepr) -> AuthResult<Self> {
        let expires_at = Utc
            .timestamp_opt(value.exp, 0)
            .single()
            .ok_or_else(|| AuthError::MalformedClaims(format!("exp out of range: {}", value.exp)))?;

        let issued_at = match value.iat {
            Some(iat) => Some(
                Utc.timestamp_opt(iat, 0)
                    .single()
                    .ok_or_else(|| AuthError::MalformedClaims(format!("iat out of range: {iat}")))?,
            ),
            None => None,
        };

        let audience = match value.aud {
            Some(AudienceRepr::Single(item)) => vec![item],
            Some(AudienceRepr::Many(items)) => items,
            None => Vec::new(),
        };

        Ok(Self {
            issuer: value.iss,
            audience,
            subject: value.sub,
            expires_at,
            issued_at,
            permissions: value.permissions.map(|items| items.into_iter().collect()),
            raw: serde_json::Value::Null,
        })
    }
}
