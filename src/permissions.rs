use crate::{AuthError, VerifiedClaims};

/// Checks that `claims` grant `permission`.
pub fn check_permission(permission: &str, claims: &VerifiedClaims) -> Result<(), AuthError> {
    let granted = claims
        .permissions()
        .ok_or(AuthError::PermissionsClaimMissing)?;

    if granted.iter().any(|p| p == permission) {
        Ok(())
    } else {
        Err(AuthError::PermissionDenied {
            permission: permission.to_string(),
        })
    }
}
