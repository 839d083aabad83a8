use jsonwebtoken::{
    decode, decode_header,
    errors::ErrorKind,
    jwk::{AlgorithmParameters, Jwk},
    Algorithm, DecodingKey, Validation,
};
use serde::{Deserialize, Serialize};

use crate::{jwk_set::KeySet, AuthConfig, AuthError};

/// The only signing algorithm accepted.
pub const ALGORITHMS: [Algorithm; 1] = [Algorithm::RS256];

/// Claims of a token whose signature, expiry, audience and issuer have been verified.
///
/// Values of this type are only ever produced by [`TokenVerifier::verify`]; there is no way to build one from
/// untrusted input.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct VerifiedClaims(pub(crate) ClaimSet);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ClaimSet {
    pub(crate) iss: String,
    pub(crate) aud: Audience,
    pub(crate) exp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) permissions: Option<Vec<String>>,
    #[serde(flatten)]
    pub(crate) other: serde_json::Map<String, serde_json::Value>,
}

/// The `aud` claim may hold a single audience or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Audience::Single(aud) => aud == audience,
            Audience::Multiple(auds) => auds.iter().any(|aud| aud == audience),
        }
    }
}

impl VerifiedClaims {
    pub fn issuer(&self) -> &str {
        &self.0.iss
    }

    pub fn audience(&self) -> &Audience {
        &self.0.aud
    }

    /// Expiry as seconds since the Unix epoch.
    pub fn expiry(&self) -> u64 {
        self.0.exp
    }

    pub fn subject(&self) -> Option<&str> {
        self.0.sub.as_deref()
    }

    /// The `permissions` claim, `None` if the token carries none.
    pub fn permissions(&self) -> Option<&[String]> {
        self.0.permissions.as_deref()
    }

    /// Any claim by name, including the registered ones.
    pub fn get(&self, name: &str) -> Option<serde_json::Value> {
        match self.0.other.get(name) {
            Some(value) => Some(value.clone()),
            None => serde_json::to_value(&self.0).ok()?.get(name).cloned(),
        }
    }
}

/// Verifies bearer tokens against the identity provider's signing keys.
pub struct TokenVerifier {
    key_set: KeySet,
    validation: Validation,
    strict_key_match: bool,
}

impl TokenVerifier {
    pub fn new(config: &AuthConfig, key_set: impl Into<KeySet>) -> Self {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.algorithms = ALGORITHMS.to_vec();
        validation.leeway = config.leeway_secs;
        validation.set_audience(&[&config.audience]);
        validation.set_issuer(&[config.issuer()]);
        validation.set_required_spec_claims(&["exp", "aud", "iss"]);

        Self {
            key_set: key_set.into(),
            validation,
            strict_key_match: config.strict_key_match,
        }
    }

    pub async fn verify(&self, token: &str) -> Result<VerifiedClaims, AuthError> {
        // First, just decode the header part of the token, without validating the token, to get the kid.
        let header = decode_header(token).map_err(AuthError::TokenUnparseable)?;
        let kid = header.kid.ok_or(AuthError::MissingKeyId)?;

        let Some(jwk) = self.key_set.find(&kid).await? else {
            tracing::debug!(kid = %kid, "no signing key matches token kid");
            return Err(if self.strict_key_match {
                AuthError::UnknownSigningKey
            } else {
                AuthError::NoTokenProvided
            });
        };

        let decoding_key = decoding_key(&jwk)?;
        let token_data =
            decode::<serde_json::Value>(token, &decoding_key, &self.validation).map_err(classify)?;

        // Registered claims are validated by now; this only fails on ill-typed claims such as `permissions`.
        let claims = serde_json::from_value::<ClaimSet>(token_data.claims)
            .map_err(|error| AuthError::TokenUnparseable(error.into()))?;
        Ok(VerifiedClaims(claims))
    }
}

fn decoding_key(jwk: &Jwk) -> Result<DecodingKey, AuthError> {
    match &jwk.algorithm {
        AlgorithmParameters::RSA(rsa) => {
            DecodingKey::from_rsa_components(&rsa.n, &rsa.e).map_err(AuthError::TokenUnparseable)
        }
        _ => Err(AuthError::TokenUnparseable(ErrorKind::InvalidKeyFormat.into())),
    }
}

fn classify(error: jsonwebtoken::errors::Error) -> AuthError {
    match error.kind() {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        ErrorKind::InvalidAudience | ErrorKind::InvalidIssuer | ErrorKind::MissingRequiredClaim(_) => {
            AuthError::ClaimsInvalid(error)
        }
        _ => AuthError::TokenUnparseable(error),
    }
}
