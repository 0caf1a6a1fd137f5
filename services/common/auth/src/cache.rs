//! Time-bounded key-set cache with single-flight refresh.
//!
//! Readers share an `RwLock`; refreshes serialize on a separate `Mutex` so
//! that callers arriving while a fetch is in flight wait for its outcome
//! instead of issuing their own request.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::JwtConfig;
use crate::error::{AuthError, AuthResult};
use crate::jwks::{KeySet, KeySetSource};

struct CachedKeys {
    keys: Arc<KeySet>,
    fetched_at: Instant,
}

#[derive(Default)]
struct CacheState {
    entry: Option<CachedKeys>,
    /// Completed fetch attempts, successful or not.
    attempts: u64,
    last_error: Option<AuthError>,
}

impl CacheState {
    fn younger_than(&self, max_age: Duration) -> Option<Arc<KeySet>> {
        self.entry
            .as_ref()
            .filter(|entry| entry.fetched_at.elapsed() < max_age)
            .map(|entry| entry.keys.clone())
    }

    fn stale(&self) -> Option<Arc<KeySet>> {
        self.entry.as_ref().map(|entry| entry.keys.clone())
    }
}

pub struct CachedKeySet<S> {
    source: S,
    ttl: Duration,
    min_refresh_interval: Duration,
    state: RwLock<CacheState>,
    in_flight: Mutex<()>,
}

impl<S: KeySetSource> CachedKeySet<S> {
    pub fn new(source: S, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            min_refresh_interval: Duration::from_secs(30),
            state: RwLock::new(CacheState::default()),
            in_flight: Mutex::new(()),
        }
    }

    pub fn from_config(source: S, config: &JwtConfig) -> Self {
        Self::new(source, config.cache_ttl).with_min_refresh_interval(config.min_refresh_interval)
    }

    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Drop the cached set; the next lookup fetches.
    pub async fn invalidate(&self) {
        let mut state = self.state.write().await;
        state.entry = None;
    }

    async fn load(&self, max_age: Duration) -> AuthResult<Arc<KeySet>> {
        let observed = {
            let state = self.state.read().await;
            if let Some(keys) = state.younger_than(max_age) {
                return Ok(keys);
            }
            state.attempts
        };

        let _flight = self.in_flight.lock().await;

        {
            let state = self.state.read().await;
            if let Some(keys) = state.younger_than(max_age) {
                debug!("key set refreshed by a concurrent caller");
                return Ok(keys);
            }
            if state.attempts != observed {
                if let Some(err) = &state.last_error {
                    return match state.stale() {
                        Some(keys) => Ok(keys),
                        None => Err(err.clone()),
                    };
                }
            }
        }

        let result = self.source.key_set().await;

        let mut state = self.state.write().await;
        state.attempts += 1;
        match result {
            Ok(keys) => {
                info!(count = keys.len(), "signing key set cached");
                state.entry = Some(CachedKeys {
                    keys: keys.clone(),
                    fetched_at: Instant::now(),
                });
                state.last_error = None;
                Ok(keys)
            }
            Err(err) => {
                state.last_error = Some(err.clone());
                match state.stale() {
                    Some(keys) => {
                        warn!(error = %err, kind = err.kind(), "key set refresh failed; serving stale keys");
                        Ok(keys)
                    }
                    None => Err(err),
                }
            }
        }
    }
}

#[async_trait]
impl<S: KeySetSource> KeySetSource for CachedKeySet<S> {
    async fn key_set(&self) -> AuthResult<Arc<KeySet>> {
        self.load(self.ttl).await
    }

    async fn refresh(&self) -> AuthResult<Option<Arc<KeySet>>> {
        self.load(self.min_refresh_interval.min(self.ttl)).await.map(Some)
    }
}
