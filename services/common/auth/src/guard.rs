//! The authorization pipeline: extract, resolve keys, verify, check permission.
//!
//! Stages run in a fixed order and the first failure is terminal for the
//! request. Nothing is retried except a single key-set refresh when a token
//! names a `kid` the current set does not contain.

use std::future::Future;
use std::sync::Arc;

use axum::http::HeaderMap;
use axum::response::Response;
use common_observability::AuthMetrics;
use tokio::time::Instant;
use tracing::{debug, error, instrument, warn};

use crate::cache::CachedKeySet;
use crate::claims::Claims;
use crate::config::JwtConfig;
use crate::error::{AuthError, AuthResult};
use crate::extractors::{bearer_from_headers, extract_bearer, AuthContext};
use crate::jwks::{JwksFetcher, KeySetSource};
use crate::layer::RequirePermissionLayer;
use crate::permissions::ensure_permission;
use crate::verifier::JwtVerifier;

#[derive(Clone)]
pub struct AuthGuard {
    verifier: Arc<JwtVerifier>,
    keys: Arc<dyn KeySetSource>,
    metrics: Option<AuthMetrics>,
}

impl AuthGuard {
    pub fn new(config: JwtConfig, keys: Arc<dyn KeySetSource>) -> Self {
        Self {
            verifier: Arc::new(JwtVerifier::new(config)),
            keys,
            metrics: None,
        }
    }

    /// Guard backed by the issuer's well-known JWKS endpoint behind a TTL cache.
    pub fn from_config(config: JwtConfig) -> Self {
        Self::from_config_with_metrics(config, None)
    }

    pub fn from_config_with_metrics(config: JwtConfig, metrics: Option<AuthMetrics>) -> Self {
        let mut fetcher = JwksFetcher::from_config(&config);
        if let Some(metrics) = &metrics {
            fetcher = fetcher.with_metrics(metrics.clone());
        }
        let keys = Arc::new(CachedKeySet::from_config(fetcher, &config));
        let guard = Self::new(config, keys);
        match metrics {
            Some(metrics) => guard.with_metrics(metrics),
            None => guard,
        }
    }

    pub fn with_metrics(mut self, metrics: AuthMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &JwtConfig {
        self.verifier.config()
    }

    /// Run the full pipeline against a raw `Authorization` header value.
    #[instrument(skip(self, authorization), fields(permission = %required))]
    pub async fn authorize(&self, authorization: Option<&str>, required: &str) -> AuthResult<Claims> {
        let result = async {
            let token = extract_bearer(authorization)?;
            let claims = self.authenticate(token).await?;
            ensure_permission(required, &claims)?;
            Ok(claims)
        }
        .await;
        self.record(result.as_ref(), required);
        result
    }

    /// Same pipeline for a request's headers, keeping the raw token alongside the claims.
    #[instrument(skip(self, headers), fields(permission = %required))]
    pub async fn authorize_headers(
        &self,
        headers: &HeaderMap,
        required: &str,
    ) -> AuthResult<AuthContext> {
        let result = async {
            let token = bearer_from_headers(headers)?;
            let claims = self.authenticate(&token).await?;
            ensure_permission(required, &claims)?;
            Ok(AuthContext { claims, token })
        }
        .await;
        self.record(result.as_ref().map(|ctx| &ctx.claims), required);
        result
    }

    /// Verify a bare token without a permission requirement.
    ///
    /// Key resolution, including a rotation refresh, shares one deadline.
    pub async fn authenticate(&self, token: &str) -> AuthResult<Claims> {
        let deadline = Instant::now() + self.config().key_set_deadline;
        let keys = within_deadline(deadline, self.keys.key_set()).await?;
        match self.verifier.verify(token, &keys) {
            Err(AuthError::InvalidHeaderKeyNotFound(kid)) => {
                debug!(%kid, "kid not in cached key set; re-resolving");
                match within_deadline(deadline, self.keys.refresh()).await? {
                    Some(fresh) if !Arc::ptr_eq(&fresh, &keys) => self.verifier.verify(token, &fresh),
                    _ => Err(AuthError::InvalidHeaderKeyNotFound(kid)),
                }
            }
            outcome => outcome,
        }
    }

    /// Resolve the key set ahead of the first request; returns the key count.
    pub async fn warm(&self) -> AuthResult<usize> {
        let deadline = Instant::now() + self.config().key_set_deadline;
        let keys = within_deadline(deadline, self.keys.key_set()).await?;
        Ok(keys.len())
    }

    /// Wrap `operation` so it only runs for callers holding `permission`.
    pub fn protect<F>(&self, permission: impl Into<String>, operation: F) -> Protected<F> {
        Protected {
            guard: self.clone(),
            permission: permission.into(),
            operation,
        }
    }

    /// Tower layer enforcing `permission` in front of an axum route or handler.
    pub fn require(&self, permission: impl Into<String>) -> RequirePermissionLayer {
        RequirePermissionLayer::new(self.clone(), permission)
    }

    /// Render a failure using the configured exposure mode.
    pub fn reject(&self, err: AuthError) -> Response {
        err.into_response_with(self.config().error_detail)
    }

    fn record(&self, outcome: Result<&Claims, &AuthError>, required: &str) {
        let (label, kind) = match outcome {
            Ok(claims) => {
                debug!(permission = required, subject = claims.subject(), "request authorized");
                ("authorized", "none")
            }
            Err(err) if err.is_upstream() => {
                error!(permission = required, kind = err.kind(), error = %err, "signing key set unavailable");
                ("upstream_error", err.kind())
            }
            Err(err @ AuthError::AuthorizationHeaderMissing) => {
                debug!(permission = required, kind = err.kind(), "request rejected");
                ("rejected", err.kind())
            }
            Err(err) => {
                warn!(permission = required, kind = err.kind(), error = %err, "request rejected");
                ("rejected", err.kind())
            }
        };
        if let Some(metrics) = &self.metrics {
            metrics.record_decision(label, kind);
        }
    }
}

async fn within_deadline<T>(
    deadline: Instant,
    lookup: impl Future<Output = AuthResult<T>>,
) -> AuthResult<T> {
    tokio::time::timeout_at(deadline, lookup)
        .await
        .unwrap_or(Err(AuthError::KeySetTimeout))
}

/// A protected operation bound to its required permission.
#[derive(Clone)]
pub struct Protected<F> {
    guard: AuthGuard,
    permission: String,
    operation: F,
}

impl<F> Protected<F> {
    pub fn permission(&self) -> &str {
        &self.permission
    }

    /// Authorize, then invoke the operation with the verified claims.
    ///
    /// The operation is never invoked when any stage fails.
    pub async fn call<Fut, T>(&self, authorization: Option<&str>) -> AuthResult<T>
    where
        F: Fn(Claims) -> Fut,
        Fut: Future<Output = T>,
    {
        let claims = self.guard.authorize(authorization, &self.permission).await?;
        Ok((self.operation)(claims).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwks::{KeySet, StaticKeySet};
    use crate::test_support::{self, config, key_set, payload, sign, sign_with};
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn guard() -> AuthGuard {
        AuthGuard::new(config(), Arc::new(StaticKeySet::new(key_set())))
    }

    fn bearer(token: &str) -> String {
        format!("Bearer {token}")
    }

    struct SlowSource;

    #[async_trait]
    impl KeySetSource for SlowSource {
        async fn key_set(&self) -> AuthResult<Arc<KeySet>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Arc::new(key_set()))
        }
    }

    /// Starts with an empty set and publishes the test key on refresh.
    struct RotatingSource {
        refreshes: AtomicUsize,
    }

    #[async_trait]
    impl KeySetSource for RotatingSource {
        async fn key_set(&self) -> AuthResult<Arc<KeySet>> {
            Ok(Arc::new(KeySet::default()))
        }

        async fn refresh(&self) -> AuthResult<Option<Arc<KeySet>>> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            Ok(Some(Arc::new(key_set())))
        }
    }

    /// Both lookups are individually under the deadline but not together.
    struct SlowRotatingSource;

    #[async_trait]
    impl KeySetSource for SlowRotatingSource {
        async fn key_set(&self) -> AuthResult<Arc<KeySet>> {
            tokio::time::sleep(Duration::from_millis(40)).await;
            Ok(Arc::new(KeySet::default()))
        }

        async fn refresh(&self) -> AuthResult<Option<Arc<KeySet>>> {
            tokio::time::sleep(Duration::from_millis(40)).await;
            Ok(Some(Arc::new(key_set())))
        }
    }

    struct DownSource;

    #[async_trait]
    impl KeySetSource for DownSource {
        async fn key_set(&self) -> AuthResult<Arc<KeySet>> {
            Err(AuthError::KeySetUnavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn authorize_returns_claims_for_granted_permission() {
        let token = sign(&payload(Some(&["post:actors", "get:actors"])));
        let claims = guard()
            .authorize(Some(bearer(&token).as_str()), "post:actors")
            .await
            .expect("authorized");
        assert_eq!(claims.subject(), "auth0|casting-director");
    }

    #[tokio::test]
    async fn authorize_short_circuits_on_header_errors() {
        let guard = guard();
        assert_eq!(
            guard.authorize(None, "get:actors").await.expect_err("missing"),
            AuthError::AuthorizationHeaderMissing
        );
        assert_eq!(
            guard
                .authorize(Some("Basic xyz"), "get:actors")
                .await
                .expect_err("scheme"),
            AuthError::InvalidHeaderScheme
        );
    }

    #[tokio::test]
    async fn header_errors_never_touch_the_key_source() {
        let guard = AuthGuard::new(config(), Arc::new(DownSource));
        let err = guard
            .authorize(Some("Bearer"), "get:actors")
            .await
            .expect_err("no token");
        assert_eq!(err, AuthError::InvalidHeaderNoToken);
    }

    #[tokio::test]
    async fn authorize_distinguishes_missing_and_denied_permissions() {
        let guard = guard();
        let without = sign(&payload(None));
        let err = guard
            .authorize(Some(bearer(&without).as_str()), "post:actors")
            .await
            .expect_err("missing permissions");
        assert_eq!(err, AuthError::PermissionsClaimMissing);

        let reader = sign(&payload(Some(&["get:actors"])));
        let err = guard
            .authorize(Some(bearer(&reader).as_str()), "post:actors")
            .await
            .expect_err("denied");
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn protected_operation_runs_only_when_authorized() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let protected = guard().protect("post:actors", move |claims: Claims| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                claims.subject().to_string()
            }
        });
        assert_eq!(protected.permission(), "post:actors");

        let reader = bearer(&sign(&payload(Some(&["get:actors"]))));
        let err = protected.call(Some(reader.as_str())).await.expect_err("denied");
        assert_eq!(err, AuthError::PermissionDenied("post:actors".into()));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let director = bearer(&sign(&payload(Some(&["post:actors", "get:actors"]))));
        let first = protected.call(Some(director.as_str())).await.expect("first call");
        let second = protected.call(Some(director.as_str())).await.expect("second call");
        assert_eq!(first, "auth0|casting-director");
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn slow_key_source_hits_deadline() {
        let config = config().with_key_set_deadline(Duration::from_millis(50));
        let guard = AuthGuard::new(config, Arc::new(SlowSource));
        let token = sign(&payload(Some(&["get:actors"])));

        let err = guard
            .authorize(Some(bearer(&token).as_str()), "get:actors")
            .await
            .expect_err("deadline");
        assert_eq!(err, AuthError::KeySetTimeout);
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn rotation_refresh_shares_the_lookup_deadline() {
        let config = config().with_key_set_deadline(Duration::from_millis(60));
        let guard = AuthGuard::new(config, Arc::new(SlowRotatingSource));
        let token = sign(&payload(Some(&["get:actors"])));

        let err = guard
            .authorize(Some(bearer(&token).as_str()), "get:actors")
            .await
            .expect_err("deadline spans both lookups");

        assert_eq!(err, AuthError::KeySetTimeout);
    }

    #[tokio::test]
    async fn unknown_kid_triggers_single_refresh() {
        let source = Arc::new(RotatingSource {
            refreshes: AtomicUsize::new(0),
        });
        let guard = AuthGuard::new(config(), source.clone());
        let token = sign(&payload(Some(&["get:actors"])));

        guard
            .authorize(Some(bearer(&token).as_str()), "get:actors")
            .await
            .expect("authorized after refresh");
        assert_eq!(source.refreshes.load(Ordering::SeqCst), 1);

        let unknown = sign_with(test_support::primary(), Some("never-published"), &payload(None));
        let err = guard
            .authorize(Some(bearer(&unknown).as_str()), "get:actors")
            .await
            .expect_err("unknown kid");
        assert_eq!(err, AuthError::InvalidHeaderKeyNotFound("never-published".into()));
        assert_eq!(source.refreshes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn decisions_are_counted_by_kind() {
        let metrics = AuthMetrics::new().expect("metrics");
        let guard = guard().with_metrics(metrics.clone());

        let mut expired = payload(Some(&["get:actors"]));
        expired["exp"] = json!(chrono::Utc::now().timestamp() - 60);
        let _ = guard
            .authorize(Some(bearer(&sign(&expired)).as_str()), "get:actors")
            .await;
        let ok = sign(&payload(Some(&["get:actors"])));
        let _ = guard.authorize(Some(bearer(&ok).as_str()), "get:actors").await;

        assert_eq!(metrics.decision_count("rejected", "token_expired"), 1);
        assert_eq!(metrics.decision_count("authorized", "none"), 1);

        let down = AuthGuard::new(config(), Arc::new(DownSource)).with_metrics(metrics.clone());
        let _ = down.authorize(Some(bearer(&ok).as_str()), "get:actors").await;
        assert_eq!(
            metrics.decision_count("upstream_error", "key_set_unavailable"),
            1
        );
    }

    #[tokio::test]
    async fn authorize_headers_keeps_raw_token() {
        let token = sign(&payload(Some(&["get:movies"])));
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            bearer(&token).parse().expect("header"),
        );

        let context = guard()
            .authorize_headers(&headers, "get:movies")
            .await
            .expect("authorized");
        assert_eq!(context.token, token);
        assert!(context.has_permission("get:movies"));
    }
}
