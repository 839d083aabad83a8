use http::{header::AUTHORIZATION, HeaderMap};

use crate::AuthError;

/// Extracts the raw token from an `Authorization: Bearer <token>` header.
///
/// The scheme is matched case-insensitively and the value must consist of exactly two whitespace separated parts.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers.get(AUTHORIZATION).ok_or(AuthError::MissingHeader)?;
    let value = value.to_str().map_err(|_| AuthError::MalformedHeader)?;

    let mut parts = value.split_whitespace();
    match parts.next() {
        Some(scheme) if scheme.eq_ignore_ascii_case("bearer") => {}
        _ => return Err(AuthError::MalformedScheme),
    }

    match (parts.next(), parts.next()) {
        (Some(token), None) => Ok(token),
        _ => Err(AuthError::MalformedHeader),
    }
}
