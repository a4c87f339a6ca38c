//! Octofeed service entrypoint.

use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use ortho_config::OrthoConfig;

use octofeed::activity::{Aggregator, ForkResolver, PullRequestResolver, resolver_limiter};
use octofeed::cache::{CacheStore, EdgeCache, MemoryStore};
use octofeed::github::EventSource;
use octofeed::{
    AppState, OctofeedConfig, UpstreamClient, UpstreamClientConfig, router, telemetry,
};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            if writeln!(io::stderr().lock(), "{error}").is_err() {
                return ExitCode::FAILURE;
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = OctofeedConfig::load()?;
    config.validate()?;
    let username = config.require_username()?.to_owned();

    telemetry::init();

    let client = UpstreamClient::new(&UpstreamClientConfig {
        token: config.resolve_token(),
        timeout: std::time::Duration::from_secs(config.upstream_timeout_seconds),
        ..UpstreamClientConfig::default()
    })?;

    // One in-process store backs the edge cache, the revalidation leases,
    // and the resolvers' cross-run caches.
    let store = MemoryStore::shared();
    let shared: Arc<dyn CacheStore> = store.clone();
    let limiter = resolver_limiter(config.resolver_concurrency);

    let aggregator = Aggregator::new(
        EventSource::new(client.clone(), config.api_base.clone()),
        ForkResolver::new(client.clone(), limiter.clone(), Some(shared.clone())),
        PullRequestResolver::new(client.clone(), limiter, Some(shared)),
        config.aggregator_options(),
    );
    let edge = EdgeCache::new(store, config.cache_policy());

    let state = Arc::new(AppState {
        edge,
        aggregator,
        client,
        api_base: config.api_base.clone(),
        username: username.clone(),
    });

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    tracing::info!(address = %config.bind_address, username, "octofeed listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
