//! Deployment generation and the cache names derived from it.
//!
//! `VERSION` and `PRECACHE_URLS` are fixed at build time. A new deployment
//! bumps `VERSION`, which renames both caches and lets activation evict the
//! previous generation's.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::Error;

/// Current deployment generation.
pub const VERSION: &str = "zerolog-v1.0.0";

/// Shell assets required to render the app offline. Keep this list small and stable.
pub const PRECACHE_URLS: &[&str] = &["/", "/index.html", "/manifest.json", "/icons/icon-192.png", "/icons/icon-512.png"];

/// Document served as the fallback for failed navigations.
pub const SHELL_DOCUMENT: &str = "/index.html";

/// Role of a version-tagged cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CacheRole {
    /// Populated once at install.
    Precache,
    /// Populated opportunistically while serving requests.
    Runtime,
}

impl CacheRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheRole::Precache => "precache",
            CacheRole::Runtime => "runtime",
        }
    }
}

/// Name of an isolated cache, `{version}-{role}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct CacheName(String);

impl CacheName {
    pub fn new(version: &str, role: CacheRole) -> Self {
        Self(format!("{version}-{}", role.as_str()))
    }

    /// Wrap an arbitrary stored name, e.g. one left behind by an older deployment.
    pub fn from_raw(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Immutable description of one deployed agent: its version and shell manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentManifest {
    version: String,
    precache_urls: Vec<String>,
    shell_document: String,
}

impl AgentManifest {
    /// Build a manifest, rejecting an empty version or non root-relative paths.
    pub fn new(
        version: impl Into<String>, precache_urls: impl IntoIterator<Item = impl Into<String>>,
        shell_document: impl Into<String>,
    ) -> Result<Self, Error> {
        let version = version.into();
        if version.trim().is_empty() {
            return Err(Error::InvalidInput("version cannot be empty".into()));
        }

        let precache_urls: Vec<String> = precache_urls.into_iter().map(Into::into).collect();
        if let Some(bad) = precache_urls.iter().find(|p| !p.starts_with('/')) {
            return Err(Error::InvalidInput(format!("precache path must be root-relative: {bad}")));
        }

        let shell_document = shell_document.into();
        if !shell_document.starts_with('/') {
            return Err(Error::InvalidInput(format!("shell document must be root-relative: {shell_document}")));
        }

        Ok(Self { version, precache_urls, shell_document })
    }

    /// The manifest compiled into this binary.
    pub fn builtin() -> Self {
        Self {
            version: VERSION.to_string(),
            precache_urls: PRECACHE_URLS.iter().map(|p| (*p).to_string()).collect(),
            shell_document: SHELL_DOCUMENT.to_string(),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn precache_urls(&self) -> &[String] {
        &self.precache_urls
    }

    pub fn shell_document(&self) -> &str {
        &self.shell_document
    }

    pub fn precache_cache(&self) -> CacheName {
        CacheName::new(&self.version, CacheRole::Precache)
    }

    pub fn runtime_cache(&self) -> CacheName {
        CacheName::new(&self.version, CacheRole::Runtime)
    }

    /// The only cache names that survive activation.
    pub fn allowed_caches(&self) -> [CacheName; 2] {
        [self.precache_cache(), self.runtime_cache()]
    }

    /// Whether `path` is one of the precached shell assets.
    pub fn is_shell_asset(&self, path: &str) -> bool {
        self.precache_urls.iter().any(|p| p == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_names() {
        let manifest = AgentManifest::builtin();
        assert_eq!(manifest.precache_cache().as_str(), "zerolog-v1.0.0-precache");
        assert_eq!(manifest.runtime_cache().as_str(), "zerolog-v1.0.0-runtime");
    }

    #[test]
    fn test_allowed_caches_distinct() {
        let manifest = AgentManifest::new("v2", ["/"], "/index.html").unwrap();
        let [a, b] = manifest.allowed_caches();
        assert_ne!(a, b);
    }

    #[test]
    fn test_is_shell_asset() {
        let manifest = AgentManifest::builtin();
        assert!(manifest.is_shell_asset("/"));
        assert!(manifest.is_shell_asset("/icons/icon-512.png"));
        assert!(!manifest.is_shell_asset("/app.js"));
    }

    #[test]
    fn test_rejects_relative_paths() {
        let result = AgentManifest::new("v1", ["index.html"], "/index.html");
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_rejects_empty_version() {
        let result = AgentManifest::new("  ", ["/"], "/index.html");
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}
