//! Request classification.

use schemars::JsonSchema;
use serde::Serialize;
use url::Url;

use crate::http::Request;
use crate::version::AgentManifest;

/// How an intercepted request will be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Not ours: non-GET or another origin. Left to the network untouched.
    Passthrough,
    /// Top-level page load: network first, shell fallback.
    Navigation,
    /// Precached shell asset: cache first.
    ShellAsset,
    /// Any other same-origin GET: stale-while-revalidate.
    Runtime,
}

/// Pick the route for `request`. Pure.
pub fn classify(request: &Request, origin: &Url, manifest: &AgentManifest) -> Route {
    if !request.is_get() || request.url.origin() != origin.origin() {
        return Route::Passthrough;
    }

    if request.is_navigation() {
        Route::Navigation
    } else if manifest.is_shell_asset(request.url.path()) {
        Route::ShellAsset
    } else {
        Route::Runtime
    }
}
