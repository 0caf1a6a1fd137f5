use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::config::ErrorDetail;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("authorization header missing")]
    AuthorizationHeaderMissing,
    #[error("authorization header does not use the bearer scheme")]
    InvalidHeaderScheme,
    #[error("authorization header carries no token")]
    InvalidHeaderNoToken,
    #[error("authorization header has more than two parts")]
    InvalidHeaderTooManyParts,
    #[error("malformed token: {0}")]
    InvalidHeader(String),
    #[error("no signing key published for kid '{0}'")]
    InvalidHeaderKeyNotFound(String),
    #[error("token signature rejected: {0}")]
    InvalidSignature(String),
    #[error("malformed claim payload: {0}")]
    MalformedClaims(String),
    #[error("token expired")]
    TokenExpired,
    #[error("invalid claims: {0}")]
    InvalidClaims(String),
    #[error("token carries no permissions claim")]
    PermissionsClaimMissing,
    #[error("permission '{0}' not granted")]
    PermissionDenied(String),
    #[error("signing key set unavailable: {0}")]
    KeySetUnavailable(String),
    #[error("timed out resolving signing key set")]
    KeySetTimeout,
    #[error("auth context requested on a route without an auth guard")]
    AuthContextMissing,
}

impl AuthError {
    /// Wire code returned to the caller.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::AuthorizationHeaderMissing => "authorization_header_missing",
            AuthError::InvalidHeaderScheme
            | AuthError::InvalidHeaderNoToken
            | AuthError::InvalidHeaderTooManyParts
            | AuthError::InvalidHeader(_)
            | AuthError::InvalidHeaderKeyNotFound(_)
            | AuthError::InvalidSignature(_) => "invalid_header",
            AuthError::TokenExpired => "token_expired",
            AuthError::MalformedClaims(_)
            | AuthError::InvalidClaims(_)
            | AuthError::PermissionsClaimMissing => "invalid_claims",
            AuthError::PermissionDenied(_) => "unauthorized",
            AuthError::KeySetUnavailable(_) => "key_set_unavailable",
            AuthError::KeySetTimeout => "key_set_timeout",
            AuthError::AuthContextMissing => "auth_context_missing",
        }
    }

    /// Stable label distinguishing every variant, for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::AuthorizationHeaderMissing => "authorization_header_missing",
            AuthError::InvalidHeaderScheme => "invalid_header_scheme",
            AuthError::InvalidHeaderNoToken => "invalid_header_no_token",
            AuthError::InvalidHeaderTooManyParts => "invalid_header_too_many_parts",
            AuthError::InvalidHeader(_) => "invalid_header",
            AuthError::InvalidHeaderKeyNotFound(_) => "invalid_header_key_not_found",
            AuthError::InvalidSignature(_) => "invalid_signature",
            AuthError::MalformedClaims(_) => "malformed_claims",
            AuthError::TokenExpired => "token_expired",
            AuthError::InvalidClaims(_) => "invalid_claims",
            AuthError::PermissionsClaimMissing => "permissions_claim_missing",
            AuthError::PermissionDenied(_) => "permission_denied",
            AuthError::KeySetUnavailable(_) => "key_set_unavailable",
            AuthError::KeySetTimeout => "key_set_timeout",
            AuthError::AuthContextMissing => "auth_context_missing",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            AuthError::AuthorizationHeaderMissing => "Authorization header is expected.",
            AuthError::InvalidHeaderScheme => "Authorization header must start with \"Bearer\".",
            AuthError::InvalidHeaderNoToken => "Token not found.",
            AuthError::InvalidHeaderTooManyParts => "Authorization header must be bearer token.",
            AuthError::InvalidHeader(_) => "Authorization malformed.",
            AuthError::InvalidHeaderKeyNotFound(_) => "Unable to find the appropriate key.",
            AuthError::InvalidSignature(_) => "Unable to parse authentication token.",
            AuthError::MalformedClaims(_) => "Token claims are malformed.",
            AuthError::TokenExpired => "Token expired.",
            AuthError::InvalidClaims(_) => {
                "Incorrect claims. Please, check the audience and issuer."
            }
            AuthError::PermissionsClaimMissing => "Permissions not included in JWT.",
            AuthError::PermissionDenied(_) => "Permission not found.",
            AuthError::KeySetUnavailable(_) => "Signing keys could not be retrieved.",
            AuthError::KeySetTimeout => "Timed out retrieving signing keys.",
            AuthError::AuthContextMissing => "Authorization context unavailable.",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::AuthorizationHeaderMissing
            | AuthError::InvalidHeaderScheme
            | AuthError::InvalidHeaderNoToken
            | AuthError::InvalidHeaderTooManyParts
            | AuthError::InvalidHeader(_)
            | AuthError::TokenExpired
            | AuthError::InvalidClaims(_) => StatusCode::UNAUTHORIZED,
            AuthError::InvalidHeaderKeyNotFound(_)
            | AuthError::InvalidSignature(_)
            | AuthError::MalformedClaims(_)
            | AuthError::PermissionsClaimMissing => StatusCode::BAD_REQUEST,
            AuthError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            AuthError::KeySetUnavailable(_) => StatusCode::BAD_GATEWAY,
            AuthError::KeySetTimeout => StatusCode::GATEWAY_TIMEOUT,
            AuthError::AuthContextMissing => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Failures caused by the upstream key publisher rather than the caller's credential.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            AuthError::KeySetUnavailable(_) | AuthError::KeySetTimeout
        )
    }

    /// Failures raised while verifying the token itself.
    pub fn is_verification(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidHeader(_)
                | AuthError::InvalidHeaderKeyNotFound(_)
                | AuthError::InvalidSignature(_)
                | AuthError::MalformedClaims(_)
                | AuthError::TokenExpired
                | AuthError::InvalidClaims(_)
        )
    }

    /// Render the error honouring the configured exposure mode.
    pub fn into_response_with(self, detail: ErrorDetail) -> Response {
        if detail == ErrorDetail::Generic && self.is_verification() {
            return render(StatusCode::UNAUTHORIZED, "invalid_token", "JWT is not valid.");
        }
        render(self.status(), self.code(), self.description())
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match value.kind() {
            ErrorKind::ExpiredSignature => Self::TokenExpired,
            ErrorKind::InvalidIssuer | ErrorKind::InvalidAudience => {
                Self::InvalidClaims(value.to_string())
            }
            ErrorKind::InvalidSignature
            | ErrorKind::InvalidRsaKey(_)
            | ErrorKind::InvalidKeyFormat
            | ErrorKind::RsaFailedSigning => Self::InvalidSignature(value.to_string()),
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                Self::InvalidSignature("signing algorithm not accepted".to_string())
            }
            ErrorKind::MissingRequiredClaim(claim) => {
                Self::MalformedClaims(format!("missing required claim '{claim}'"))
            }
            _ => Self::InvalidHeader(value.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    description: &'a str,
}

fn render(status: StatusCode, code: &'static str, description: &str) -> Response {
    let body = ErrorBody { code, description };
    let mut response = (status, Json(body)).into_response();
    response
        .headers_mut()
        .insert("X-Error-Code", HeaderValue::from_static(code));
    response
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        self.into_response_with(ErrorDetail::Specific)
    }
}
