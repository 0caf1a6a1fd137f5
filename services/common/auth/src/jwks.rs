use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use common_observability::AuthMetrics;
use jsonwebtoken::DecodingKey;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::JwtConfig;
use crate::error::{AuthError, AuthResult};

/// One RSA public key published by the issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningKey {
    pub kid: String,
    #[serde(rename = "kty")]
    pub key_type: String,
    #[serde(rename = "use", default)]
    pub key_use: String,
    #[serde(rename = "n")]
    pub modulus: String,
    #[serde(rename = "e")]
    pub exponent: String,
}

impl SigningKey {
    pub fn decoding_key(&self) -> AuthResult<DecodingKey> {
        DecodingKey::from_rsa_components(&self.modulus, &self.exponent).map_err(|err| {
            AuthError::InvalidSignature(format!("unusable key '{}': {err}", self.kid))
        })
    }
}

/// Ordered key set, unique by `kid`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySet {
    keys: Vec<SigningKey>,
}

impl KeySet {
    /// Keeps the first key seen for each `kid`; later duplicates are dropped.
    pub fn new(keys: Vec<SigningKey>) -> Self {
        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(keys.len());
        for key in keys {
            if seen.insert(key.kid.clone()) {
                unique.push(key);
            } else {
                warn!(kid = %key.kid, "duplicate kid in published key set; keeping first");
            }
        }
        Self { keys: unique }
    }

    pub fn find(&self, kid: &str) -> Option<&SigningKey> {
        self.keys.iter().find(|key| key.kid == kid)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Anything able to resolve the issuer's current signing keys.
#[async_trait]
pub trait KeySetSource: Send + Sync {
    async fn key_set(&self) -> AuthResult<Arc<KeySet>>;

    /// Re-resolve after a token named an unknown `kid`.
    ///
    /// `None` means the source has nothing newer than `key_set` would return.
    async fn refresh(&self) -> AuthResult<Option<Arc<KeySet>>> {
        Ok(None)
    }
}

/// Fixed key set, for development and tests.
#[derive(Debug, Clone)]
pub struct StaticKeySet {
    keys: Arc<KeySet>,
}

impl StaticKeySet {
    pub fn new(keys: KeySet) -> Self {
        Self {
            keys: Arc::new(keys),
        }
    }
}

#[async_trait]
impl KeySetSource for StaticKeySet {
    async fn key_set(&self) -> AuthResult<Arc<KeySet>> {
        Ok(self.keys.clone())
    }
}

/// Fetches the published key set over HTTP on every call.
#[derive(Clone)]
pub struct JwksFetcher {
    client: Client,
    url: String,
    retry_attempts: u32,
    retry_backoff: Duration,
    metrics: Option<AuthMetrics>,
}

impl JwksFetcher {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(build_client(Duration::from_secs(5)), url)
    }

    pub fn from_config(config: &JwtConfig) -> Self {
        Self::with_client(build_client(config.fetch_timeout), config.jwks_url())
            .with_retry(config.retry_attempts, config.retry_backoff)
    }

    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            retry_attempts: 0,
            retry_backoff: Duration::from_millis(100),
            metrics: None,
        }
    }

    pub fn with_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.retry_attempts = attempts;
        self.retry_backoff = backoff;
        self
    }

    pub fn with_metrics(mut self, metrics: AuthMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Fetch with bounded retry of transient failures. Every failure here is
    /// upstream, never the caller's.
    pub async fn fetch(&self) -> AuthResult<KeySet> {
        let mut attempt = 0;
        loop {
            match self.fetch_once().await {
                Ok(keys) => return Ok(keys),
                Err(failure) if failure.transient && attempt < self.retry_attempts => {
                    let err = failure.error;
                    let delay = self.retry_backoff * 2u32.saturating_pow(attempt);
                    warn!(
                        error = %err,
                        jwks_url = %self.url,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "JWKS fetch failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(failure) => return Err(failure.error),
            }
        }
    }

    async fn fetch_once(&self) -> Result<KeySet, FetchFailure> {
        let started = Instant::now();
        let result = self.request().await;
        if let Some(metrics) = &self.metrics {
            let outcome = if result.is_ok() { "ok" } else { "error" };
            metrics.record_key_set_fetch(outcome, started.elapsed());
        }
        result
    }

    async fn request(&self) -> Result<KeySet, FetchFailure> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|err| FetchFailure::transient(map_transport_error(err)))?;

        let status = response.status();
        if !status.is_success() {
            let error =
                AuthError::KeySetUnavailable(format!("HTTP {status} from {}", self.url));
            return Err(if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                FetchFailure::transient(error)
            } else {
                FetchFailure::permanent(error)
            });
        }

        let body: JwksResponse = response.json().await.map_err(|err| {
            if err.is_timeout() {
                FetchFailure::transient(AuthError::KeySetTimeout)
            } else {
                FetchFailure::permanent(AuthError::KeySetUnavailable(format!(
                    "malformed JWKS response: {err}"
                )))
            }
        })?;

        let keys = KeySet::new(body.keys.into_iter().filter_map(JwkEntry::into_rsa_key).collect());
        debug!(count = keys.len(), jwks_url = %self.url, "fetched JWKS");
        Ok(keys)
    }
}

/// One failed fetch attempt; only transient failures are retried.
struct FetchFailure {
    error: AuthError,
    transient: bool,
}

impl FetchFailure {
    fn transient(error: AuthError) -> Self {
        Self {
            error,
            transient: true,
        }
    }

    fn permanent(error: AuthError) -> Self {
        Self {
            error,
            transient: false,
        }
    }
}

#[async_trait]
impl KeySetSource for JwksFetcher {
    async fn key_set(&self) -> AuthResult<Arc<KeySet>> {
        self.fetch().await.map(Arc::new)
    }
}

fn build_client(timeout: Duration) -> Client {
    Client::builder().timeout(timeout).build().unwrap_or_else(|err| {
        warn!(error = %err, "failed to build JWKS client with timeout; using defaults");
        Client::new()
    })
}

fn map_transport_error(err: reqwest::Error) -> AuthError {
    if err.is_timeout() {
        AuthError::KeySetTimeout
    } else {
        AuthError::KeySetUnavailable(err.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<JwkEntry>,
}

#[derive(Debug, Deserialize)]
struct JwkEntry {
    kid: Option<String>,
    kty: Option<String>,
    #[serde(rename = "use")]
    key_use: Option<String>,
    n: Option<String>,
    e: Option<String>,
}

impl JwkEntry {
    /// Entries that cannot verify an RS256 signature are skipped, not fatal.
    fn into_rsa_key(self) -> Option<SigningKey> {
        let Some(kid) = self.kid else {
            warn!("JWKS entry without kid skipped");
            return None;
        };
        let key_type = self.kty.unwrap_or_else(|| "RSA".to_string());
        if key_type != "RSA" {
            debug!(%kid, kty = %key_type, "non-RSA JWKS entry skipped");
            return None;
        }
        let key_use = self.key_use.unwrap_or_else(|| "sig".to_string());
        if key_use != "sig" {
            debug!(%kid, key_use = %key_use, "non-signing JWKS entry skipped");
            return None;
        }
        match (self.n, self.e) {
            (Some(modulus), Some(exponent)) => Some(SigningKey {
                kid,
                key_type,
                key_use,
                modulus,
                exponent,
            }),
            _ => {
                warn!(%kid, "JWKS entry missing RSA components skipped");
                None
            }
        }
    }
}
