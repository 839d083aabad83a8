use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use jsonwebtoken::jwk::{Jwk, JwkSet};
use reqwest::Client;
use tokio::sync::Mutex;
use url::Url;

use crate::{error::KeySetError, jwk_set::find_signing_key, AuthError};

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

struct CacheConfig {
    time_to_live: Duration,
    min_refresh_interval: Duration,
}

/// Builder for configuring a [`RemoteJwkSet`] with optional caching.
pub struct RemoteJwkSetBuilder {
    url: Url,
    cache_config: Option<CacheConfig>,
    timeout: Duration,
}

impl RemoteJwkSetBuilder {
    /// Creates a new builder with the given JWKS URL.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            cache_config: None,
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Enables caching to avoid re-fetching the remote JWK set on every verification.
    ///
    /// A token carrying a `kid` that is not part of the cached set triggers a refresh, unless the cached set is younger
    /// than `min_refresh_interval`.
    pub fn with_cache(mut self, time_to_live: Duration, min_refresh_interval: Duration) -> Self {
        self.cache_config = Some(CacheConfig {
            time_to_live,
            min_refresh_interval,
        });
        self
    }

    /// Bounds each request to the JWKS endpoint. A request exceeding it fails with `KeySetUnavailable`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> RemoteJwkSet {
        let request = JwkSetRequest {
            http_client: Client::new(),
            url: self.url,
            timeout: self.timeout,
        };

        let cache = self.cache_config.map(|cache_config| JwkSetCache {
            entries: moka::future::Cache::builder()
                .max_capacity(1)
                .time_to_live(cache_config.time_to_live)
                .build(),
            min_refresh_interval: cache_config.min_refresh_interval,
            refresh_lock: Arc::new(Mutex::new(())),
        });

        RemoteJwkSet { request, cache }
    }
}

/// JWK set published by the identity provider, fetched over HTTP(S).
///
/// Can safely be cloned and shared across tasks: the HTTP client and the cache are reference counted internally.
#[derive(Clone)]
pub struct RemoteJwkSet {
    request: JwkSetRequest,
    cache: Option<JwkSetCache>,
}

impl RemoteJwkSet {
    pub fn builder(url: Url) -> RemoteJwkSetBuilder {
        RemoteJwkSetBuilder::new(url)
    }

    pub async fn find(&self, kid: &str) -> Result<Option<Jwk>, AuthError> {
        let Some(cache) = &self.cache else {
            let jwk_set = self.request.send().await?;
            return Ok(find_signing_key(&jwk_set, kid).cloned());
        };

        let cached = cache.get(&self.request).await?;
        if let Some(jwk) = find_signing_key(&cached.jwk_set, kid) {
            return Ok(Some(jwk.clone()));
        }
        if cached.fetched_at.elapsed() < cache.min_refresh_interval {
            return Ok(None);
        }

        // The provider may have rotated its keys since the set was cached.
        tracing::debug!(kid, "kid not found in cached JWK set, refreshing");
        let refreshed = cache.refresh(&self.request, &cached).await?;
        Ok(find_signing_key(&refreshed.jwk_set, kid).cloned())
    }
}

struct CachedJwkSet {
    jwk_set: Arc<JwkSet>,
    fetched_at: Instant,
}

#[derive(Clone)]
struct JwkSetCache {
    entries: moka::future::Cache<(), Arc<CachedJwkSet>>,
    min_refresh_interval: Duration,
    refresh_lock: Arc<Mutex<()>>,
}

impl JwkSetCache {
    /// Concurrent callers missing the cache share a single request.
    async fn get(&self, request: &JwkSetRequest) -> Result<Arc<CachedJwkSet>, Arc<KeySetError>> {
        self.entries
            .try_get_with((), async {
                let jwk_set = request.send().await?;
                Ok::<_, KeySetError>(Arc::new(CachedJwkSet {
                    jwk_set: Arc::new(jwk_set),
                    fetched_at: Instant::now(),
                }))
            })
            .await
    }

    /// Replaces `stale` with a freshly fetched set.
    ///
    /// Callers holding the same stale set wait for the first one's refresh and share its result instead of fetching
    /// again.
    async fn refresh(
        &self,
        request: &JwkSetRequest,
        stale: &Arc<CachedJwkSet>,
    ) -> Result<Arc<CachedJwkSet>, Arc<KeySetError>> {
        let _guard = self.refresh_lock.lock().await;
        if let Some(current) = self.entries.get(&()).await {
            if !Arc::ptr_eq(&current, stale) {
                return Ok(current);
            }
        }
        self.entries.invalidate(&()).await;
        self.get(request).await
    }
}

/// Wraps a `reqwest::Client` to fetch a JWK set from a given URL.
#[derive(Clone)]
struct JwkSetRequest {
    http_client: Client,
    url: Url,
    timeout: Duration,
}

impl JwkSetRequest {
    async fn send(&self) -> Result<JwkSet, KeySetError> {
        tracing::debug!(url = %self.url, "fetching JWK set");

        let response = self
            .http_client
            .get(self.url.clone())
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(KeySetError::ErrorResponse {
                status_code: response.status(),
            });
        }

        let jwk_set: JwkSet = response.json().await?;
        tracing::info!(url = %self.url, keys = jwk_set.keys.len(), "fetched JWK set");
        Ok(jwk_set)
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use futures::future::join_all;
    use http::StatusCode;
    use jsonwebtoken::jwk::JwkSet;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::RemoteJwkSet;
    use crate::{
        error::{error_chain, KeySetError},
        test_support::{jwks_url, SigningKey, JWKS_PATH},
        AuthError,
    };

    fn jwk_set(keys: &[&SigningKey]) -> JwkSet {
        JwkSet {
            keys: keys.iter().map(|key| key.jwk()).collect(),
        }
    }

    #[tokio::test]
    async fn test_fetches_jwk_set() {
        let key = SigningKey::shared();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwk_set(&[key])))
            .expect(1)
            .mount(&server)
            .await;

        let remote_jwk_set = RemoteJwkSet::builder(jwks_url(&server)).build();

        let jwk = remote_jwk_set.find(key.kid()).await.unwrap().unwrap();
        assert_eq!(jwk.common.key_id.as_deref(), Some(key.kid()));
    }

    #[tokio::test]
    async fn test_without_cache_every_lookup_fetches() {
        let key = SigningKey::shared();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwk_set(&[key])))
            .expect(2)
            .mount(&server)
            .await;

        let remote_jwk_set = RemoteJwkSet::builder(jwks_url(&server)).build();

        remote_jwk_set.find(key.kid()).await.unwrap();
        remote_jwk_set.find(key.kid()).await.unwrap();
    }

    #[tokio::test]
    async fn test_cache_avoids_refetching() {
        let key = SigningKey::shared();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwk_set(&[key])))
            .expect(1)
            .mount(&server)
            .await;

        let remote_jwk_set = RemoteJwkSet::builder(jwks_url(&server))
            .with_cache(Duration::from_secs(60), Duration::from_secs(60))
            .build();

        for _ in 0..3 {
            assert!(remote_jwk_set.find(key.kid()).await.unwrap().is_some());
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_misses_share_one_fetch() {
        let key = SigningKey::shared();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(jwk_set(&[key]))
                    .set_delay(Duration::from_millis(300)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let remote_jwk_set = RemoteJwkSet::builder(jwks_url(&server))
            .with_cache(Duration::from_secs(60), Duration::from_secs(60))
            .build();

        let lookups = (0..8).map(|_| {
            let remote_jwk_set = remote_jwk_set.clone();
            tokio::spawn(async move { remote_jwk_set.find(key.kid()).await })
        });
        for result in join_all(lookups).await {
            assert!(result.unwrap().unwrap().is_some());
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_unknown_kids_share_one_refresh() {
        let key = SigningKey::shared();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwk_set(&[key])))
            .up_to_n_times(1)
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(jwk_set(&[key]))
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let remote_jwk_set = RemoteJwkSet::builder(jwks_url(&server))
            .with_cache(Duration::from_secs(60), Duration::from_millis(100))
            .build();
        assert!(remote_jwk_set.find(key.kid()).await.unwrap().is_some());
        tokio::time::sleep(Duration::from_millis(150)).await;

        let lookups = (0..8).map(|_| {
            let remote_jwk_set = remote_jwk_set.clone();
            tokio::spawn(async move { remote_jwk_set.find("unknown").await })
        });
        for result in join_all(lookups).await {
            assert!(result.unwrap().unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn test_unknown_kid_refreshes_cache() {
        let old_key = SigningKey::shared();
        let rotated_key = SigningKey::generate("rotated");
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwk_set(&[old_key])))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(jwk_set(&[old_key, &rotated_key])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let remote_jwk_set = RemoteJwkSet::builder(jwks_url(&server))
            .with_cache(Duration::from_secs(60), Duration::ZERO)
            .build();

        assert!(remote_jwk_set.find(old_key.kid()).await.unwrap().is_some());
        assert!(remote_jwk_set.find("rotated").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unknown_kid_refresh_is_rate_limited() {
        let key = SigningKey::shared();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwk_set(&[key])))
            .expect(1)
            .mount(&server)
            .await;

        let remote_jwk_set = RemoteJwkSet::builder(jwks_url(&server))
            .with_cache(Duration::from_secs(60), Duration::from_secs(60))
            .build();

        assert!(remote_jwk_set.find("unknown").await.unwrap().is_none());
        assert!(remote_jwk_set.find("unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_error_response_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let remote_jwk_set = RemoteJwkSet::builder(jwks_url(&server)).build();

        let error = remote_jwk_set.find("42").await.unwrap_err();
        match error {
            AuthError::KeySetUnavailable(source) => assert!(matches!(
                *source,
                KeySetError::ErrorResponse { status_code } if status_code == StatusCode::INTERNAL_SERVER_ERROR
            )),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_is_unavailable() {
        let key = SigningKey::shared();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(jwk_set(&[key]))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let remote_jwk_set = RemoteJwkSet::builder(jwks_url(&server))
            .with_cache(Duration::from_secs(60), Duration::ZERO)
            .with_timeout(Duration::from_millis(100))
            .build();

        match remote_jwk_set.find(key.kid()).await {
            Err(AuthError::KeySetUnavailable(source)) => {
                let chain = error_chain(&*source);
                assert!(chain.starts_with("failed to fetch JWK set: "), "{chain}");
                assert!(chain.contains("timed out"), "{chain}");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_body_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("not a key set"))
            .mount(&server)
            .await;

        let remote_jwk_set = RemoteJwkSet::builder(jwks_url(&server)).build();

        assert!(matches!(
            remote_jwk_set.find("42").await,
            Err(AuthError::KeySetUnavailable(_))
        ));
    }
}
