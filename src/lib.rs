//! Drinks API for a coffee shop, guarded by permissions carried in bearer tokens issued by
//! [Auth0](https://auth0.com/docs/secure/tokens/access-tokens).
//!
//! ## Overview
//!
//! Reading the menu is public. Everything else requires an RS256-signed
//! [JSON Web Token (JWT)](https://datatracker.ietf.org/doc/html/rfc7519) whose `permissions` claim grants the action:
//!
//! | route                  | permission          |
//! |------------------------|---------------------|
//! | `GET /drinks`          | none                |
//! | `GET /drinks-detail`   | `get:drinks-detail` |
//! | `POST /drinks`         | `post:drinks`       |
//! | `PATCH /drinks/{id}`   | `patch:drinks`      |
//! | `DELETE /drinks/{id}`  | `delete:drinks`     |
//!
//! Authorizing a request goes through the following steps, each of which may end the request with an [`AuthError`]:
//!
//! 1. **Extraction**: the token is taken from the `Authorization: Bearer <token>` header.
//! 2. **Key lookup**: the `kid` in the token header selects a key from the identity provider's
//!    [JSON Web Key Set (JWKS)](https://datatracker.ietf.org/doc/html/rfc7517), fetched from
//!    `https://<domain>/.well-known/jwks.json`. The set is cached for a configurable time-to-live and refreshed early
//!    when a token names a key that is not in the cached set (e.g. after a key rotation).
//! 3. **Verification**: signature, expiry, audience and issuer are checked, yielding [`VerifiedClaims`].
//! 4. **Permission check**: the route's permission must be part of the `permissions` claim.
//!
//! ## Quickstart
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use coffee_shop::{api, drinks::DrinkStore, AuthConfig, Authorizer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AuthConfig::new("starbucks-app.eu.auth0.com", "coffee");
//!     let authorizer = Authorizer::from_config(&config)?;
//!
//!     let router = api::router(Arc::new(DrinkStore::new()), &authorizer);
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod authorization;
pub mod bearer;
pub mod config;
pub mod drinks;
pub mod permissions;
pub mod verifier;

pub use authorization::{AuthorizationLayer, Authorizer};
pub use config::AuthConfig;
pub use error::{AuthError, KeySetError};
pub use jwk_set::KeySet;
pub use remote_jwk_set::RemoteJwkSet;
pub use verifier::{TokenVerifier, VerifiedClaims};

mod error;
mod jwk_set;
mod remote_jwk_set;

#[cfg(test)]
mod test_support;
