use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::Request;
use axum::response::Response;
use tower::{Layer, Service};

use crate::guard::AuthGuard;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Runs the guard before the wrapped service and stores the resulting
/// [`crate::AuthContext`] in the request extensions.
#[derive(Clone)]
pub struct RequirePermissionLayer {
    guard: AuthGuard,
    permission: Arc<str>,
}

impl RequirePermissionLayer {
    pub fn new(guard: AuthGuard, permission: impl Into<String>) -> Self {
        Self {
            guard,
            permission: Arc::from(permission.into()),
        }
    }
}

impl<S> Layer<S> for RequirePermissionLayer {
    type Service = RequirePermission<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequirePermission {
            inner,
            guard: self.guard.clone(),
            permission: self.permission.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RequirePermission<S> {
    inner: S,
    guard: AuthGuard,
    permission: Arc<str>,
}

impl<S> Service<Request> for RequirePermission<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request) -> Self::Future {
        // The readied service handles this request; the clone waits for the next.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let guard = self.guard.clone();
        let permission = self.permission.clone();

        Box::pin(async move {
            let outcome = guard.authorize_headers(request.headers(), &permission).await;
            match outcome {
                Ok(context) => {
                    request.extensions_mut().insert(context);
                    inner.call(request).await
                }
                Err(err) => Ok(guard.reject(err)),
            }
        })
    }
}
