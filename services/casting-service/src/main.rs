use std::net::SocketAddr;

use anyhow::Context;
use casting_service::{build_router, cors_layer, load_service_config, AppState};
use common_auth::AuthGuard;
use common_observability::AuthMetrics;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let config = load_service_config()?;
    let metrics = AuthMetrics::new().context("registering auth metrics")?;

    info!(jwks_url = %config.jwt.jwks_url(), issuer = %config.jwt.issuer(), "configuring auth guard");
    let guard = AuthGuard::from_config_with_metrics(config.jwt.clone(), Some(metrics.clone()));
    match guard.warm().await {
        Ok(count) => info!(count, "signing keys loaded"),
        Err(err) => warn!(error = %err, "initial signing key fetch failed; keys will load on first request"),
    }

    let app = build_router(AppState::new(guard, metrics)).layer(cors_layer(&config.allowed_origins));

    let addr = SocketAddr::from((config.host, config.port));
    info!(%addr, "starting casting-service");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
