use std::sync::Arc;

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use http::StatusCode;
use serde_json::json;

/// Failure of the authorization pipeline.
///
/// Every variant is terminal for the request it was raised for. The HTTP status it maps to is given by
/// [`AuthError::status_code`], and the `Display` output is the description sent back to the client.
#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("missing authorization header")]
    MissingHeader,
    #[error("authorization header must start with \"Bearer\"")]
    MalformedScheme,
    #[error("authorization header must be of the form \"Bearer <token>\"")]
    MalformedHeader,
    #[error("missing kid in token header")]
    MissingKeyId,
    #[error("token is signed with an unknown key")]
    UnknownSigningKey,
    #[error("no token was provided")]
    NoTokenProvided,
    #[error("unable to parse authentication token")]
    TokenUnparseable(#[source] jsonwebtoken::errors::Error),
    #[error("token has expired")]
    TokenExpired,
    #[error("incorrect claims, please check the audience and issuer")]
    ClaimsInvalid(#[source] jsonwebtoken::errors::Error),
    #[error("permissions not included in token")]
    PermissionsClaimMissing,
    #[error("not authorized to {permission}")]
    PermissionDenied { permission: String },
    #[error("identity provider key set is unavailable")]
    KeySetUnavailable(#[source] Arc<KeySetError>),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingHeader
            | AuthError::MalformedScheme
            | AuthError::MalformedHeader
            | AuthError::MissingKeyId
            | AuthError::UnknownSigningKey
            | AuthError::TokenExpired
            | AuthError::ClaimsInvalid(_)
            | AuthError::PermissionDenied { .. } => StatusCode::UNAUTHORIZED,
            AuthError::NoTokenProvided
            | AuthError::TokenUnparseable(_)
            | AuthError::PermissionsClaimMissing => StatusCode::BAD_REQUEST,
            AuthError::KeySetUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<Arc<KeySetError>> for AuthError {
    fn from(error: Arc<KeySetError>) -> Self {
        AuthError::KeySetUnavailable(error)
    }
}

impl From<KeySetError> for AuthError {
    fn from(error: KeySetError) -> Self {
        AuthError::KeySetUnavailable(Arc::new(error))
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        let body = Json(json!({
            "success": false,
            "error": status_code.as_u16(),
            "message": self.to_string(),
        }));
        (status_code, body).into_response()
    }
}

/// Reason the identity provider's JWK set could not be retrieved.
#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum KeySetError {
    #[error("failed to fetch JWK set")]
    FailedRequest(#[from] reqwest::Error),
    #[error("received error response when fetching JWK set: {status_code}")]
    ErrorResponse { status_code: StatusCode },
}

/// Renders an error followed by each of its sources, separated by `: `.
pub(crate) fn error_chain(error: &dyn std::error::Error) -> String {
    let mut chain = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}
