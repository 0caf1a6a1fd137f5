use crate::claims::Claims;
use crate::error::{AuthError, AuthResult};

/// Succeeds when `required` is a member of the token's `permissions` claim.
pub fn ensure_permission(required: &str, claims: &Claims) -> AuthResult<()> {
    let granted = claims
        .permissions()
        .ok_or(AuthError::PermissionsClaimMissing)?;

    if granted.contains(required) {
        Ok(())
    } else {
        Err(AuthError::PermissionDenied(required.to_string()))
    }
}
