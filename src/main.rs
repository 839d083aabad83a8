use std::{net::SocketAddr, sync::Arc, time::Duration};

use clap::Parser;
use coffee_shop::{api, drinks::DrinkStore, AuthConfig, Authorizer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

/// Coffee shop drinks API.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Address to listen on.
    #[arg(long, env = "BIND", default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Auth0 tenant domain issuing the access tokens.
    #[arg(long, env = "AUTH0_DOMAIN")]
    auth0_domain: String,

    /// Audience the access tokens must be issued for.
    #[arg(long, env = "API_AUDIENCE", default_value = "coffee")]
    api_audience: String,

    /// How long the identity provider's key set is cached; 0 fetches it for every request.
    #[arg(long, env = "JWKS_CACHE_TTL_SECS", default_value_t = 600)]
    jwks_cache_ttl_secs: u64,

    /// Upper bound on fetching the key set.
    #[arg(long, env = "JWKS_TIMEOUT_SECS", default_value_t = 5)]
    jwks_timeout_secs: u64,

    /// Clock skew tolerated when checking token expiry.
    #[arg(long, env = "TOKEN_LEEWAY_SECS", default_value_t = 0)]
    leeway_secs: u64,

    /// Answer tokens signed with an unknown key with 400 "no token was provided" instead of 401.
    #[arg(long)]
    lenient_key_match: bool,
}

impl Cli {
    fn auth_config(&self) -> AuthConfig {
        let mut config = AuthConfig::new(&self.auth0_domain, &self.api_audience);
        config.jwks_cache_ttl =
            (self.jwks_cache_ttl_secs > 0).then(|| Duration::from_secs(self.jwks_cache_ttl_secs));
        config.jwks_fetch_timeout = Duration::from_secs(self.jwks_timeout_secs);
        config.leeway_secs = self.leeway_secs;
        config.strict_key_match = !self.lenient_key_match;
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = cli.auth_config();
    let authorizer = Authorizer::from_config(&config)?;

    let app = api::router(Arc::new(DrinkStore::new()), &authorizer).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(cli.bind).await?;
    tracing::info!(
        addr = %cli.bind,
        issuer = %config.issuer(),
        audience = %config.audience,
        "coffee-shop listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
