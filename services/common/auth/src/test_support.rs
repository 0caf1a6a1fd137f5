use std::sync::OnceLock;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
use rsa::rand_core::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde_json::{json, Value};

use crate::config::JwtConfig;
use crate::jwks::{KeySet, SigningKey};

pub(crate) const DOMAIN: &str = "casting.example.com";
pub(crate) const AUDIENCE: &str = "Casting";
pub(crate) const KID: &str = "test-key";

pub(crate) struct KeyMaterial {
    pub encoding: EncodingKey,
    pub modulus: String,
    pub exponent: String,
}

fn generate_key_material() -> KeyMaterial {
    let mut rng = OsRng;
    let private_key = RsaPrivateKey::new(&mut rng, 2048).expect("key generation");
    let public_key = private_key.to_public_key();
    let private_pem = private_key
        .to_pkcs1_pem(LineEnding::LF)
        .expect("private pem");

    KeyMaterial {
        encoding: EncodingKey::from_rsa_pem(private_pem.as_bytes()).expect("encoding key"),
        modulus: URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
        exponent: URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
    }
}

/// Key published in the test key set.
pub(crate) fn primary() -> &'static KeyMaterial {
    static MATERIAL: OnceLock<KeyMaterial> = OnceLock::new();
    MATERIAL.get_or_init(generate_key_material)
}

/// Key never published anywhere.
pub(crate) fn rogue() -> &'static KeyMaterial {
    static MATERIAL: OnceLock<KeyMaterial> = OnceLock::new();
    MATERIAL.get_or_init(generate_key_material)
}

pub(crate) fn config() -> JwtConfig {
    JwtConfig::new(DOMAIN, AUDIENCE)
}

pub(crate) fn signing_key(kid: &str, material: &KeyMaterial) -> SigningKey {
    SigningKey {
        kid: kid.to_string(),
        key_type: "RSA".to_string(),
        key_use: "sig".to_string(),
        modulus: material.modulus.clone(),
        exponent: material.exponent.clone(),
    }
}

pub(crate) fn key_set() -> KeySet {
    KeySet::new(vec![signing_key(KID, primary())])
}

pub(crate) fn payload(permissions: Option<&[&str]>) -> Value {
    let now = Utc::now().timestamp();
    let mut claims = json!({
        "iss": format!("https://{DOMAIN}/"),
        "sub": "auth0|casting-director",
        "aud": AUDIENCE,
        "iat": now,
        "exp": now + 600,
    });
    if let Some(permissions) = permissions {
        claims["permissions"] = json!(permissions);
    }
    claims
}

pub(crate) fn sign_with(material: &KeyMaterial, kid: Option<&str>, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    encode(&header, claims, &material.encoding).expect("sign token")
}

pub(crate) fn sign(claims: &Value) -> String {
    sign_with(primary(), Some(KID), claims)
}
