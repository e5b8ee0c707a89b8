//! Caching strategies applied to intercepted requests.
//!
//! | Route       | Strategy                                   | Cache       |
//! |-------------|--------------------------------------------|-------------|
//! | navigation  | network first, shell document fallback     | precache (read), runtime (refresh) |
//! | shell asset | cache first, network on miss, no write     | precache    |
//! | runtime     | stale-while-revalidate                     | runtime     |
//!
//! Cache read failures never fail a request: they are logged and treated as
//! a miss. Background writes are detached and their failures only logged.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Serialize;
use url::Url;

use crate::Error;
use crate::cache::{CacheHandle, CacheStore};
use crate::http::{Request, RequestKey, Response};
use crate::network::Network;
use crate::tasks::BackgroundTasks;
use crate::version::{AgentManifest, CacheName};

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Network,
    Cache,
    /// Synthetic offline notice.
    Offline,
}

/// A response chosen by a strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Served {
    pub response: Response,
    pub source: Source,
}

impl Served {
    fn network(response: Response) -> Self {
        Self { response, source: Source::Network }
    }

    fn cache(response: Response) -> Self {
        Self { response, source: Source::Cache }
    }
}

/// Everything a strategy needs. Cheap to clone into detached tasks.
#[derive(Clone)]
pub struct StrategyContext {
    pub store: Arc<dyn CacheStore>,
    pub network: Arc<dyn Network>,
    pub manifest: Arc<AgentManifest>,
    pub origin: Url,
    /// Identity of the shell document under `origin`.
    pub shell_key: RequestKey,
    pub background: BackgroundTasks,
}

impl StrategyContext {
    /// Look up `key`, treating store failures as a miss.
    async fn lookup(&self, cache: &CacheName, key: &RequestKey) -> Option<Response> {
        let result = match CacheHandle::open(self.store.clone(), cache.clone()).await {
            Ok(handle) => handle.match_request(key).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(cache = %cache, key = %key, error = %e, "cache read failed; treating as miss");
                None
            }
        }
    }

    /// Write `response` under `key` in a detached task if it is cacheable.
    async fn spawn_put(&self, cache: CacheName, key: RequestKey, response: Response) {
        if !response.is_cacheable() {
            tracing::debug!(key = %key, status = response.status, "response not cacheable; skipping write");
            return;
        }

        let store = self.store.clone();
        self.background
            .spawn(async move {
                if let Err(e) = write(store, &cache, &key, &response).await {
                    tracing::warn!(cache = %cache, key = %key, error = %e, "background cache write failed");
                }
            })
            .await;
    }
}

async fn write(store: Arc<dyn CacheStore>, cache: &CacheName, key: &RequestKey, response: &Response) -> Result<(), Error> {
    CacheHandle::open(store, cache.clone()).await?.put(key, response).await
}

/// Network first; on success refresh the runtime copy of the shell document,
/// on failure fall back to the precached shell or a 503 offline notice.
pub async fn network_first_with_shell(ctx: &StrategyContext, request: &Request) -> Served {
    let shell_key = ctx.shell_key.clone();

    match ctx.network.fetch(request).await {
        Ok(response) => {
            ctx.spawn_put(ctx.manifest.runtime_cache(), shell_key, response.clone())
                .await;
            Served::network(response)
        }
        Err(e) => {
            tracing::debug!(url = %request.url, error = %e, "navigation failed; serving shell");
            match ctx.lookup(&ctx.manifest.precache_cache(), &shell_key).await {
                Some(shell) => Served::cache(shell),
                None => Served { response: Response::offline(), source: Source::Offline },
            }
        }
    }
}

/// Precached copy if present, otherwise the network. Nothing is written back.
pub async fn cache_first(ctx: &StrategyContext, request: &Request) -> Result<Served, Error> {
    if let Some(cached) = ctx
        .lookup(&ctx.manifest.precache_cache(), &request.key())
        .await
    {
        return Ok(Served::cache(cached));
    }

    tracing::debug!(url = %request.url, "shell asset not precached; fetching");
    ctx.network.fetch(request).await.map(Served::network)
}

/// Cached copy at once with a detached refresh, or the network when nothing
/// is cached yet.
pub async fn stale_while_revalidate(ctx: &StrategyContext, request: &Request) -> Result<Served, Error> {
    let cache = ctx.manifest.runtime_cache();
    let key = request.key();

    if let Some(cached) = ctx.lookup(&cache, &key).await {
        let refresh = ctx.clone();
        let request = request.clone();
        ctx.background
            .spawn(async move { revalidate(refresh, request, cache, key).await })
            .await;
        return Ok(Served::cache(cached));
    }

    let response = ctx.network.fetch(request).await?;
    ctx.spawn_put(cache, key, response.clone()).await;
    Ok(Served::network(response))
}

async fn revalidate(ctx: StrategyContext, request: Request, cache: CacheName, key: RequestKey) {
    match ctx.network.fetch(&request).await {
        Ok(response) if response.is_cacheable() => {
            if let Err(e) = write(ctx.store.clone(), &cache, &key, &response).await {
                tracing::warn!(cache = %cache, key = %key, error = %e, "revalidation write failed");
            }
        }
        Ok(response) => {
            tracing::debug!(key = %key, status = response.status, "revalidation response not cacheable");
        }
        Err(e) => {
            tracing::debug!(key = %key, error = %e, "revalidation fetch failed");
        }
    }
}
