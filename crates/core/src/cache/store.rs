//! The cache storage contract the agent is written against.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::Error;
use crate::http::{RequestKey, Response};
use crate::version::CacheName;

/// A stored request/response pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: RequestKey,
    pub response: Response,
    /// SHA-256 of the body at write time.
    pub digest: String,
    pub stored_at: String,
}

/// Storage for named request/response caches.
///
/// All operations may fail (I/O, quota). Looking up a missing entry or a
/// missing cache is not a failure and yields `None`.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Create the named cache if it does not exist yet.
    async fn open(&self, name: &CacheName) -> Result<(), Error>;

    /// Look up the entry stored for `key`.
    async fn match_entry(&self, name: &CacheName, key: &RequestKey) -> Result<Option<CacheEntry>, Error>;

    /// Store `response` under `key`, replacing any previous entry whole.
    /// Creates the cache if needed.
    async fn put(&self, name: &CacheName, key: &RequestKey, response: &Response) -> Result<(), Error>;

    /// Create the cache and store every entry, or nothing at all.
    async fn put_all(&self, name: &CacheName, entries: &[(RequestKey, Response)]) -> Result<(), Error>;

    /// Delete a cache and all its entries. Returns whether it existed.
    async fn delete(&self, name: &CacheName) -> Result<bool, Error>;

    /// Names of all existing caches.
    async fn list_names(&self) -> Result<BTreeSet<CacheName>, Error>;

    /// Request identities stored in a cache, in URL order.
    async fn keys(&self, name: &CacheName) -> Result<Vec<RequestKey>, Error>;
}

/// An opened cache: a store bound to one cache name.
#[derive(Clone)]
pub struct CacheHandle {
    store: Arc<dyn CacheStore>,
    name: CacheName,
}

impl CacheHandle {
    /// Open (creating if necessary) the named cache.
    pub async fn open(store: Arc<dyn CacheStore>, name: CacheName) -> Result<Self, Error> {
        store.open(&name).await?;
        Ok(Self { store, name })
    }

    pub async fn match_request(&self, key: &RequestKey) -> Result<Option<Response>, Error> {
        Ok(self
            .store
            .match_entry(&self.name, key)
            .await?
            .map(|entry| entry.response))
    }

    pub async fn put(&self, key: &RequestKey, response: &Response) -> Result<(), Error> {
        self.store.put(&self.name, key, response).await
    }
}

impl std::fmt::Debug for CacheHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheHandle").field("name", &self.name).finish()
    }
}
