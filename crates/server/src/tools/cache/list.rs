//! cache_list tool implementation.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shellcache_core::{Agent, CacheName};

use crate::tools::json_result;

/// One cache in the listing.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheSummary {
    pub name: CacheName,
    pub entries: usize,
    /// Stored request identities, e.g. `GET https://app.example/index.html`.
    pub keys: Vec<String>,
}

/// Output from the cache_list tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheListOutput {
    pub caches: Vec<CacheSummary>,
}

pub async fn list_impl(agent: &Agent) -> Result<CallToolResult, McpError> {
    let store = agent.store();
    let mut caches = Vec::new();
    for name in store.list_names().await? {
        let keys: Vec<String> = store.keys(&name).await?.iter().map(ToString::to_string).collect();
        caches.push(CacheSummary { name, entries: keys.len(), keys });
    }

    json_result(&CacheListOutput { caches })
}
