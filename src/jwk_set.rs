use jsonwebtoken::jwk::{Jwk, JwkSet, PublicKeyUse};

use crate::{remote_jwk_set::RemoteJwkSet, AuthError};

/// Source of the signing keys tokens are verified against: either a fixed local [`JwkSet`] or the identity
/// provider's published [`RemoteJwkSet`].
#[derive(Clone)]
pub enum KeySet {
    Local(JwkSet),
    Remote(RemoteJwkSet),
}

impl KeySet {
    /// Looks up the signing key with the given `kid`.
    pub async fn find(&self, kid: &str) -> Result<Option<Jwk>, AuthError> {
        match self {
            KeySet::Local(jwk_set) => Ok(find_signing_key(jwk_set, kid).cloned()),
            KeySet::Remote(remote_jwk_set) => remote_jwk_set.find(kid).await,
        }
    }
}

impl From<JwkSet> for KeySet {
    fn from(jwk_set: JwkSet) -> Self {
        KeySet::Local(jwk_set)
    }
}

impl From<RemoteJwkSet> for KeySet {
    fn from(remote_jwk_set: RemoteJwkSet) -> Self {
        KeySet::Remote(remote_jwk_set)
    }
}

/// Finds the key with the given `kid`, skipping keys published for encryption only.
pub(crate) fn find_signing_key<'a>(jwk_set: &'a JwkSet, kid: &str) -> Option<&'a Jwk> {
    jwk_set.keys.iter().find(|jwk| {
        jwk.common.key_id.as_deref() == Some(kid)
            && !matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption))
    })
}
