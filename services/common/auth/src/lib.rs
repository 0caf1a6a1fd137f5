pub mod cache;
pub mod claims;
pub mod config;
pub mod error;
pub mod extractors;
pub mod guard;
pub mod jwks;
pub mod layer;
pub mod permissions;
pub mod verifier;

#[cfg(test)]
mod test_support;

pub use cache::CachedKeySet;
pub use claims::Claims;
pub use config::{ErrorDetail, JwtConfig};
pub use error::{AuthError, AuthResult};
pub use extractors::{bearer_from_headers, extract_bearer, AuthContext};
pub use guard::{AuthGuard, Protected};
pub use jwks::{JwksFetcher, KeySet, KeySetSource, SigningKey, StaticKeySet};
pub use layer::{RequirePermission, RequirePermissionLayer};
pub use permissions::ensure_permission;
pub use verifier::{JwtVerifier, SIGNING_ALGORITHM};
