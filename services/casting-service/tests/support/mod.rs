#![allow(dead_code)]

use std::sync::OnceLock;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use casting_service::{build_router, AppState};
use chrono::Utc;
use common_auth::{AuthGuard, ErrorDetail, JwtConfig};
use common_observability::AuthMetrics;
use httpmock::prelude::*;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
use rsa::rand_core::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde_json::{json, Value};

pub const DOMAIN: &str = "casting.example.com";
pub const AUDIENCE: &str = "Casting";
pub const KID: &str = "casting-key";
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

pub const DIRECTOR: &[&str] = &[
    "get:actors",
    "post:actors",
    "patch:actors",
    "delete:actors",
    "get:movies",
    "post:movies",
    "patch:movies",
    "delete:movies",
];
pub const ASSISTANT: &[&str] = &["get:actors", "get:movies"];

pub struct SigningMaterial {
    encoding: EncodingKey,
    modulus: String,
    exponent: String,
}

pub fn signing_material() -> &'static SigningMaterial {
    static MATERIAL: OnceLock<SigningMaterial> = OnceLock::new();
    MATERIAL.get_or_init(|| {
        let private_key = RsaPrivateKey::new(&mut OsRng, 2048).expect("key generation");
        let public_key = private_key.to_public_key();
        let pem = private_key
            .to_pkcs1_pem(LineEnding::LF)
            .expect("private pem");
        SigningMaterial {
            encoding: EncodingKey::from_rsa_pem(pem.as_bytes()).expect("encoding key"),
            modulus: URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
            exponent: URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
        }
    })
}

pub fn jwks_body() -> Value {
    let material = signing_material();
    json!({
        "keys": [{
            "kty": "RSA",
            "use": "sig",
            "alg": "RS256",
            "kid": KID,
            "n": material.modulus,
            "e": material.exponent,
        }]
    })
}

pub fn claims(permissions: Option<&[&str]>, expires_in: i64) -> Value {
    let now = Utc::now().timestamp();
    let mut claims = json!({
        "iss": format!("https://{DOMAIN}/"),
        "sub": "auth0|casting-test",
        "aud": [AUDIENCE, format!("https://{DOMAIN}/userinfo")],
        "iat": now,
        "exp": now + expires_in,
    });
    if let Some(permissions) = permissions {
        claims["permissions"] = json!(permissions);
    }
    claims
}

pub fn mint(claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(KID.to_string());
    encode(&header, claims, &signing_material().encoding).expect("sign token")
}

pub fn bearer_for(permissions: &[&str]) -> String {
    format!("Bearer {}", mint(&claims(Some(permissions), 600)))
}

pub fn jwt_config(server: &MockServer) -> JwtConfig {
    JwtConfig::new(DOMAIN, AUDIENCE)
        .with_jwks_url(server.url(JWKS_PATH))
        .with_fetch_timeout(Duration::from_secs(2))
        .with_retry(1, Duration::from_millis(10))
}

pub struct TestApp {
    pub router: Router,
    pub metrics: AuthMetrics,
}

pub fn app_with(config: JwtConfig) -> TestApp {
    let metrics = AuthMetrics::new().expect("metrics");
    let guard = AuthGuard::from_config_with_metrics(config, Some(metrics.clone()));
    TestApp {
        router: build_router(AppState::new(guard, metrics.clone())),
        metrics,
    }
}

pub fn app(server: &MockServer) -> TestApp {
    app_with(jwt_config(server))
}

pub fn generic_app(server: &MockServer) -> TestApp {
    app_with(jwt_config(server).with_error_detail(ErrorDetail::Generic))
}

pub fn get(uri: &str, authorization: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(value) = authorization {
        builder = builder.header("authorization", value);
    }
    builder.body(Body::empty()).expect("request")
}

pub fn post_json(uri: &str, authorization: &str, body: Value) -> Request<Body> {
    json_request("POST", uri, authorization, body)
}

pub fn patch_json(uri: &str, authorization: &str, body: Value) -> Request<Body> {
    json_request("PATCH", uri, authorization, body)
}

fn json_request(method: &str, uri: &str, authorization: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", authorization)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

pub fn delete(uri: &str, authorization: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .header("authorization", authorization)
        .body(Body::empty())
        .expect("request")
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}
