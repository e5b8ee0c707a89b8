//! Network client for shellcache.
//!
//! Provides the reqwest-backed [`shellcache_core::Network`] the server hands
//! to the agent.

pub mod fetch;

pub use fetch::{FetchClient, FetchConfig};
