use std::time::Duration;

use url::Url;

/// Path under which Auth0 (and most other providers) publish their signing keys.
pub const JWKS_ENDPOINT: &str = ".well-known/jwks.json";

/// Static settings of the authorization layer, constructed once at startup.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Identity provider domain, e.g. `starbucks-app.eu.auth0.com`.
    pub domain: String,
    /// Expected `aud` claim.
    pub audience: String,
    /// Overrides the JWK set location derived from `domain`.
    pub jwks_url: Option<Url>,
    /// Time-to-live of the cached JWK set. `None` re-fetches the set for every verification.
    pub jwks_cache_ttl: Option<Duration>,
    /// Minimum age of a cached JWK set before a token with an unknown `kid` may trigger a refresh.
    pub jwks_min_refresh_interval: Duration,
    /// Upper bound on a single JWK set request.
    pub jwks_fetch_timeout: Duration,
    /// Clock skew tolerated when checking `exp`.
    pub leeway_secs: u64,
    /// Reject tokens whose `kid` is missing from the key set with `UnknownSigningKey` instead of
    /// `NoTokenProvided`.
    pub strict_key_match: bool,
}

impl AuthConfig {
    pub fn new(domain: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            audience: audience.into(),
            jwks_url: None,
            jwks_cache_ttl: Some(Duration::from_secs(600)),
            jwks_min_refresh_interval: Duration::from_secs(30),
            jwks_fetch_timeout: Duration::from_secs(5),
            leeway_secs: 0,
            strict_key_match: true,
        }
    }

    /// The `iss` value tokens must carry: `https://<domain>/`.
    pub fn issuer(&self) -> String {
        format!("https://{}/", self.domain)
    }

    pub fn jwks_url(&self) -> Result<Url, url::ParseError> {
        match &self.jwks_url {
            Some(url) => Ok(url.clone()),
            None => Url::parse(&self.issuer())?.join(JWKS_ENDPOINT),
        }
    }
}
