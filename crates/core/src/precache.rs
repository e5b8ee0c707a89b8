//! Install-time population of the shell cache.

use futures_util::future::try_join_all;
use url::Url;

use crate::Error;
use crate::cache::CacheStore;
use crate::http::{Request, RequestKey, Response};
use crate::network::Network;
use crate::version::CacheName;

/// Fetch every path in `manifest` and store the responses under `cache`,
/// keyed by path.
///
/// All-or-nothing: every fetch must succeed with a 2xx status before
/// anything is written. On failure the cache is not created at all.
/// Returns the number of entries written.
pub async fn populate(
    store: &dyn CacheStore, network: &dyn Network, origin: &Url, manifest: &[String], cache: &CacheName,
) -> Result<usize, Error> {
    let fetches = manifest.iter().map(|path| fetch_entry(network, origin, path));
    let entries = try_join_all(fetches).await?;

    store.put_all(cache, &entries).await?;

    tracing::info!(cache = %cache, entries = entries.len(), "precache populated");
    Ok(entries.len())
}

async fn fetch_entry(network: &dyn Network, origin: &Url, path: &str) -> Result<(RequestKey, Response), Error> {
    let request = Request::parse("GET", path, Default::default(), origin)?;

    let response = network
        .fetch(&request)
        .await
        .map_err(|e| Error::PrecacheFailed { url: path.to_string(), reason: e.to_string() })?;

    if !response.is_ok() {
        return Err(Error::PrecacheFailed { url: path.to_string(), reason: format!("status {}", response.status) });
    }

    tracing::debug!(path, bytes = response.body.len(), "fetched precache entry");
    Ok((request.key(), response))
}
