use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use serde_json::Value;
use tracing::debug;

use crate::claims::Claims;
use crate::config::JwtConfig;
use crate::error::{AuthError, AuthResult};
use crate::jwks::KeySet;

/// Only algorithm accepted, regardless of what a token header claims.
pub const SIGNING_ALGORITHM: Algorithm = Algorithm::RS256;

/// Stateless RS256 verifier. Key resolution is the caller's concern.
#[derive(Debug, Clone)]
pub struct JwtVerifier {
    config: JwtConfig,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(config: JwtConfig) -> Self {
        // Signature only; expiry, issuer and audience are checked in that
        // order by `Claims::validate` once the payload is trusted.
        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        Self { config, validation }
    }

    pub fn config(&self) -> &JwtConfig {
        &self.config
    }

    /// Key identifier from the unverified header.
    pub fn key_id(token: &str) -> AuthResult<String> {
        let header =
            decode_header(token).map_err(|err| AuthError::InvalidHeader(err.to_string()))?;
        header
            .kid
            .ok_or_else(|| AuthError::InvalidHeader("token header has no kid".to_string()))
    }

    pub fn verify(&self, token: &str, keys: &KeySet) -> AuthResult<Claims> {
        self.verify_at(token, keys, Utc::now())
    }

    pub fn verify_at(&self, token: &str, keys: &KeySet, now: DateTime<Utc>) -> AuthResult<Claims> {
        let kid = Self::key_id(token)?;
        let key = keys
            .find(&kid)
            .ok_or_else(|| AuthError::InvalidHeaderKeyNotFound(kid.clone()))?;

        let token_data = decode::<Value>(token, &key.decoding_key()?, &self.validation)?;
        let claims = Claims::from_payload(token_data.claims)?;
        claims.validate(&self.config, now)?;

        debug!(kid, subject = claims.subject(), "verified JWT successfully");
        Ok(claims)
    }
}
