//! Core types for shellcache, an offline-first cache agent.
//!
//! This crate provides:
//! - Versioned caches with a SQLite backend
//! - The install/activate lifecycle and the [`Agent`] controller
//! - Per-request caching strategies
//! - Unified error types and host configuration

pub mod agent;
pub mod cache;
pub mod clients;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod network;
pub mod precache;
pub mod router;
pub mod strategy;
pub mod tasks;
pub mod version;

#[cfg(test)]
mod testing;

pub use agent::{ActivationReport, Agent, AgentStatus, FetchOutcome, InstallReport};
pub use cache::{CacheDb, CacheEntry, CacheHandle, CacheStore};
pub use clients::{AgentMessage, ClientId, ClientInfo, ClientMessage, ClientRegistry};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use http::{Request, RequestKey, RequestMode, Response, ResponseType};
pub use lifecycle::{Lifecycle, LifecycleEvent, Phase, Transition};
pub use network::Network;
pub use router::Route;
pub use strategy::{Served, Source};
pub use version::{AgentManifest, CacheName, CacheRole};
