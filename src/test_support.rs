use std::{
    sync::OnceLock,
    time::{Duration, SystemTime},
};

use jsonwebtoken::{
    jwk::{AlgorithmParameters, CommonParameters, Jwk, JwkSet, KeyAlgorithm, PublicKeyUse},
    Algorithm, EncodingKey, Header,
};
use url::Url;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use crate::AuthConfig;

pub const DOMAIN: &str = "coffee.test";
pub const AUDIENCE: &str = "coffee";
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// RSA key pair used to sign test tokens, published as a JWK.
pub struct SigningKey {
    kid: String,
    encoding_key: EncodingKey,
    jwk: Jwk,
}

impl SigningKey {
    pub fn generate(kid: &str) -> Self {
        let rsa_private_key = openssl::rsa::Rsa::generate(2048).unwrap();

        let jwk = Jwk {
            common: CommonParameters {
                public_key_use: Some(PublicKeyUse::Signature),
                key_algorithm: Some(KeyAlgorithm::RS256),
                key_id: Some(kid.to_string()),
                ..CommonParameters::default()
            },
            algorithm: AlgorithmParameters::RSA(jsonwebtoken::jwk::RSAKeyParameters {
                n: base64_url::encode(&rsa_private_key.n().to_vec()),
                e: base64_url::encode(&rsa_private_key.e().to_vec()),
                key_type: jsonwebtoken::jwk::RSAKeyType::RSA,
            }),
        };
        let encoding_key =
            EncodingKey::from_rsa_der(&rsa_private_key.private_key_to_der().unwrap());

        SigningKey {
            kid: kid.to_string(),
            encoding_key,
            jwk,
        }
    }

    /// Key shared by all tests, generated once.
    pub fn shared() -> &'static SigningKey {
        static KEY: OnceLock<SigningKey> = OnceLock::new();
        KEY.get_or_init(|| SigningKey::generate("42"))
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn jwk(&self) -> Jwk {
        self.jwk.clone()
    }

    pub fn jwk_set(&self) -> JwkSet {
        JwkSet {
            keys: vec![self.jwk()],
        }
    }

    /// Signs `claims` with RS256, naming this key in the `kid` header.
    pub fn sign(&self, claims: &serde_json::Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.clone());
        self.sign_with_header(&header, claims)
    }

    pub fn sign_with_header(&self, header: &Header, claims: &serde_json::Value) -> String {
        jsonwebtoken::encode(header, claims, &self.encoding_key).unwrap()
    }
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// Claims of a valid, unexpired token for [`DOMAIN`] and [`AUDIENCE`].
pub fn claims(permissions: &[&str]) -> serde_json::Value {
    let issued_at = unix_now();
    let expires_at = issued_at + Duration::from_secs(3600).as_secs();
    serde_json::json!({
        "sub": "auth0|barista",
        "iss": format!("https://{DOMAIN}/"),
        "aud": AUDIENCE,
        "iat": issued_at,
        "exp": expires_at,
        "permissions": permissions,
    })
}

pub fn jwks_url(server: &MockServer) -> Url {
    Url::parse(&server.uri()).unwrap().join(JWKS_PATH).unwrap()
}

/// Starts an identity provider mock serving `jwk_set` at [`JWKS_PATH`].
pub async fn mock_identity_provider(jwk_set: &JwkSet) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwk_set))
        .mount(&server)
        .await;
    server
}

pub fn config(server: &MockServer) -> AuthConfig {
    let mut config = AuthConfig::new(DOMAIN, AUDIENCE);
    config.jwks_url = Some(jwks_url(server));
    config
}
