use std::env;
use std::net::IpAddr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use common_auth::{ErrorDetail, JwtConfig};

const DEFAULT_ORIGINS: &[&str] = &["http://localhost:3000", "http://localhost:8080"];

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub jwt: JwtConfig,
    pub host: IpAddr,
    pub port: u16,
    pub allowed_origins: Vec<String>,
}

pub fn load_service_config() -> Result<ServiceConfig> {
    parse_service_config(|key| env::var(key).ok())
}

pub(crate) fn parse_service_config<F>(lookup: F) -> Result<ServiceConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let jwt = parse_jwt_config(&lookup)?;

    let host = lookup("HOST")
        .unwrap_or_else(|| "0.0.0.0".to_string())
        .parse::<IpAddr>()
        .context("HOST must be an IP address")?;
    let port = match lookup("PORT") {
        Some(value) => value.parse::<u16>().context("PORT must be a port number")?,
        None => 8080,
    };

    let allowed_origins = lookup("CORS_ALLOWED_ORIGINS")
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_else(|| DEFAULT_ORIGINS.iter().map(|origin| origin.to_string()).collect());

    Ok(ServiceConfig {
        jwt,
        host,
        port,
        allowed_origins,
    })
}

fn parse_jwt_config<F>(lookup: &F) -> Result<JwtConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let domain = lookup("AUTH0_DOMAIN").context("AUTH0_DOMAIN must be set")?;
    let audience = lookup("API_AUDIENCE").context("API_AUDIENCE must be set")?;

    let mut config = JwtConfig::new(domain, audience);
    if let Some(value) = lookup("JWT_LEEWAY_SECONDS") {
        let leeway = value
            .parse::<u32>()
            .context("JWT_LEEWAY_SECONDS must be a whole number")?;
        config = config.with_leeway(leeway);
    }
    if let Some(url) = lookup("JWT_JWKS_URL") {
        config = config.with_jwks_url(url);
    }
    if let Some(value) = lookup("JWKS_CACHE_TTL_SECONDS") {
        let secs = value
            .parse::<u64>()
            .context("JWKS_CACHE_TTL_SECONDS must be a whole number")?;
        config = config.with_cache_ttl(Duration::from_secs(secs.max(1)));
    }
    if let Some(value) = lookup("JWKS_FETCH_TIMEOUT_MS") {
        let millis = value
            .parse::<u64>()
            .context("JWKS_FETCH_TIMEOUT_MS must be a whole number")?;
        config = config.with_fetch_timeout(Duration::from_millis(millis));
    }
    if let Some(value) = lookup("AUTH_ERROR_DETAIL") {
        let detail = ErrorDetail::parse(&value)
            .ok_or_else(|| anyhow!("AUTH_ERROR_DETAIL must be 'specific' or 'generic'"))?;
        config = config.with_error_detail(detail);
    }

    Ok(config)
}
