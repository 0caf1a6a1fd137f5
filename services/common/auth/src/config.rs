use std::time::Duration;

/// How much of a verification failure is rendered back to the caller.
///
/// The full `AuthError` is always available to logs and metrics; this only
/// controls the HTTP body produced by the guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorDetail {
    /// Render the specific failure code and description.
    #[default]
    Specific,
    /// Collapse token verification failures into a single `invalid_token` body.
    Generic,
}

impl ErrorDetail {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "specific" => Some(Self::Specific),
            "generic" => Some(Self::Generic),
            _ => None,
        }
    }
}

/// Runtime configuration for JWT verification.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Identity provider domain; the expected issuer is `https://{domain}/`.
    pub domain: String,
    /// Expected audience claim (aud).
    pub audience: String,
    /// Allowable clock skew in seconds when validating exp.
    pub leeway_seconds: u32,
    /// Overrides the well-known JWKS location derived from `domain`.
    pub jwks_url: Option<String>,
    /// Per-request timeout applied by the JWKS HTTP client.
    pub fetch_timeout: Duration,
    /// Upper bound the guard waits for a key set before giving up.
    pub key_set_deadline: Duration,
    /// Extra fetch attempts after a transient JWKS failure.
    pub retry_attempts: u32,
    /// Base delay between JWKS retries, doubled per attempt.
    pub retry_backoff: Duration,
    /// How long a fetched key set is served before it is considered stale.
    pub cache_ttl: Duration,
    /// Minimum age of a cached key set before a forced refresh hits the network.
    pub min_refresh_interval: Duration,
    pub error_detail: ErrorDetail,
}

impl JwtConfig {
    /// Construct config with defaults: no leeway, 5s fetch timeout, 10 minute cache.
    pub fn new(domain: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            audience: audience.into(),
            leeway_seconds: 0,
            jwks_url: None,
            fetch_timeout: Duration::from_secs(5),
            key_set_deadline: Duration::from_secs(10),
            retry_attempts: 2,
            retry_backoff: Duration::from_millis(100),
            cache_ttl: Duration::from_secs(600),
            min_refresh_interval: Duration::from_secs(30),
            error_detail: ErrorDetail::Specific,
        }
    }

    /// Expected `iss` claim.
    pub fn issuer(&self) -> String {
        format!("https://{}/", self.domain)
    }

    pub fn jwks_url(&self) -> String {
        match &self.jwks_url {
            Some(url) => url.clone(),
            None => format!("https://{}/.well-known/jwks.json", self.domain),
        }
    }

    /// Adjust the allowed leeway.
    pub fn with_leeway(mut self, seconds: u32) -> Self {
        self.leeway_seconds = seconds;
        self
    }

    pub fn with_jwks_url(mut self, url: impl Into<String>) -> Self {
        self.jwks_url = Some(url.into());
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_key_set_deadline(mut self, deadline: Duration) -> Self {
        self.key_set_deadline = deadline;
        self
    }

    pub fn with_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.retry_attempts = attempts;
        self.retry_backoff = backoff;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    pub fn with_error_detail(mut self, detail: ErrorDetail) -> Self {
        self.error_detail = detail;
        self
    }
}
