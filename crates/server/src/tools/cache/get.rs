//! cache_get tool implementation.
//!
//! Retrieves one stored response by cache name and request URL.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shellcache_core::{Agent, CacheName, Error, Request, RequestMode, ResponseType};

use crate::tools::json_result;

/// Parameters for the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetParams {
    /// Cache name, e.g. `zerolog-v1.0.0-precache`.
    pub cache: String,

    /// Absolute URL, or a path resolved against the agent origin.
    pub url: String,

    /// HTTP method of the stored request (default: GET).
    #[serde(default = "default_method")]
    pub method: String,
}

fn default_method() -> String {
    "GET".into()
}

/// Output from the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetOutput {
    pub cache: CacheName,
    pub key: String,
    pub status: u16,
    pub status_text: String,
    pub response_type: ResponseType,
    pub headers: Vec<(String, String)>,
    /// Body as UTF-8 (lossy).
    pub body: String,
    /// SHA-256 of the body, hex encoded.
    pub digest: String,
    pub stored_at: String,
}

pub async fn get_impl(agent: &Agent, params: CacheGetParams) -> Result<CallToolResult, McpError> {
    let cache = CacheName::from_raw(params.cache);
    let key = Request::parse(&params.method, &params.url, RequestMode::SameOrigin, agent.origin())?.key();

    let entry = agent
        .store()
        .match_entry(&cache, &key)
        .await?
        .ok_or_else(|| Error::CacheMiss(format!("{key} in {cache}")))?;

    let output = CacheGetOutput {
        cache,
        key: entry.key.to_string(),
        status: entry.response.status,
        body: entry.response.text(),
        status_text: entry.response.status_text,
        response_type: entry.response.response_type,
        headers: entry.response.headers,
        digest: entry.digest,
        stored_at: entry.stored_at,
    };

    json_result(&output)
}
