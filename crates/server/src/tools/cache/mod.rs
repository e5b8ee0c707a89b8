//! Cache inspection tools.
//!
//! Read-only views of the agent's named caches.

pub mod get;
pub mod list;

pub use get::{CacheGetParams, get_impl};
pub use list::list_impl;
