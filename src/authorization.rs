use std::{
    sync::Arc,
    task::{Context, Poll},
};

use axum::{
    extract::Request,
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use http::HeaderMap;
use tower::{Layer, Service};

use crate::{
    bearer::extract_bearer_token, error::error_chain, permissions::check_permission, remote_jwk_set::RemoteJwkSet,
    verifier::TokenVerifier, AuthConfig, AuthError, VerifiedClaims,
};

/// Guard in front of every protected operation.
///
/// Runs the bearer token through extraction, verification and the permission check, stopping at the first failure.
#[derive(Clone)]
pub struct Authorizer {
    verifier: Arc<TokenVerifier>,
}

impl Authorizer {
    pub fn new(verifier: TokenVerifier) -> Self {
        Self {
            verifier: Arc::new(verifier),
        }
    }

    /// Builds an authorizer verifying tokens against the remote JWK set of the configured identity provider.
    pub fn from_config(config: &AuthConfig) -> Result<Self, url::ParseError> {
        let mut builder =
            RemoteJwkSet::builder(config.jwks_url()?).with_timeout(config.jwks_fetch_timeout);
        if let Some(time_to_live) = config.jwks_cache_ttl {
            builder = builder.with_cache(time_to_live, config.jwks_min_refresh_interval);
        }
        Ok(Self::new(TokenVerifier::new(config, builder.build())))
    }

    pub async fn authorize(
        &self,
        headers: &HeaderMap,
        permission: &str,
    ) -> Result<VerifiedClaims, AuthError> {
        let token = extract_bearer_token(headers)?;
        let claims = self.verifier.verify(token).await?;
        check_permission(permission, &claims)?;
        Ok(claims)
    }

    /// Layer guarding a handler with `permission`.
    pub fn require(&self, permission: &'static str) -> AuthorizationLayer {
        AuthorizationLayer {
            authorizer: self.clone(),
            permission,
        }
    }
}

/// Rejects requests lacking `permission` and hands the [`VerifiedClaims`] of accepted ones to the inner service
/// through the request extensions, where handlers take them as an `Extension<VerifiedClaims>` argument.
#[derive(Clone)]
pub struct AuthorizationLayer {
    authorizer: Authorizer,
    permission: &'static str,
}

impl<S> Layer<S> for AuthorizationLayer {
    type Service = AuthorizationService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthorizationService {
            inner,
            authorizer: self.authorizer.clone(),
            permission: self.permission,
        }
    }
}

#[derive(Clone)]
pub struct AuthorizationService<S> {
    inner: S,
    authorizer: Authorizer,
    permission: &'static str,
}

impl<S> Service<Request> for AuthorizationService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        // Move the original service into the closure instead of its clone. This makes sure that the original service is
        // `call`ed instead of the cloned one, which might not be ready yet (`poll_ready` hasn't been called on the
        // clone yet).
        // See [docs](https://docs.rs/tower/latest/tower/trait.Service.html#be-careful-when-cloning-inner-services).
        let inner_clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, inner_clone);

        let authorizer = self.authorizer.clone();
        let permission = self.permission;
        Box::pin(async move {
            match authorizer.authorize(req.headers(), permission).await {
                Ok(claims) => {
                    tracing::debug!(permission, subject = ?claims.subject(), "request authorized");
                    req.extensions_mut().insert(claims);
                    inner.call(req).await
                }
                Err(auth_error) => {
                    match &auth_error {
                        AuthError::KeySetUnavailable(source) => {
                            tracing::warn!(permission, error = %error_chain(&**source), "cannot authorize request")
                        }
                        _ => tracing::debug!(permission, error = %auth_error, "request rejected"),
                    }
                    Ok(auth_error.into_response())
                }
            }
        })
    }
}
