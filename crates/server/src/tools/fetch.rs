//! sw_fetch tool implementation.
//!
//! Delivers one intercepted request to the agent and reports what it would
//! hand back to the page.

use std::collections::BTreeMap;

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shellcache_core::{Agent, FetchOutcome, Request, RequestMode, ResponseType, Route, Source};

use super::json_result;

/// Input parameters for sw_fetch.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwFetchParams {
    /// Absolute URL, or a path resolved against the agent origin.
    pub url: String,

    /// HTTP method (default: GET).
    #[serde(default = "default_method")]
    pub method: String,

    /// Request mode: "navigate" for page loads, "same-origin" (default),
    /// "no-cors" or "cors".
    #[serde(default)]
    pub mode: RequestMode,

    /// Extra request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_method() -> String {
    "GET".into()
}

/// Output structure for sw_fetch.
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SwFetchOutput {
    /// The agent did not intercept; the page goes to the network itself.
    Passthrough { url: String },
    /// The agent answered.
    Respond {
        url: String,
        route: Route,
        source: Source,
        status: u16,
        status_text: String,
        response_type: ResponseType,
        headers: Vec<(String, String)>,
        /// Body as UTF-8 (lossy).
        body: String,
    },
}

pub async fn fetch_impl(agent: &Agent, params: SwFetchParams) -> Result<CallToolResult, McpError> {
    let mut request = Request::parse(&params.method, &params.url, params.mode, agent.origin())?;
    for (name, value) in &params.headers {
        request = request.with_header(name, value);
    }

    let url = request.url.to_string();
    let output = match agent.handle_fetch(&request).await? {
        FetchOutcome::Passthrough => SwFetchOutput::Passthrough { url },
        FetchOutcome::Respond { route, served } => {
            let body = served.response.text();
            SwFetchOutput::Respond {
                url,
                route,
                source: served.source,
                status: served.response.status,
                status_text: served.response.status_text,
                response_type: served.response.response_type,
                headers: served.response.headers,
                body,
            }
        }
    };

    json_result(&output)
}
