//! Named request/response caches backed by SQLite.
//!
//! Mirrors the browser Cache Storage model: any number of independently
//! named caches, each mapping a request identity to a full response
//! snapshot. Provides:
//!
//! - The [`CacheStore`] trait the agent is written against
//! - A SQLite implementation ([`CacheDb`]) with WAL mode and migrations
//! - Body digests so a read returns exactly the bytes that were written

pub mod connection;
pub mod entries;
pub mod hash;
pub mod migrations;
pub mod store;

pub use crate::Error;

pub use connection::CacheDb;
pub use store::{CacheEntry, CacheHandle, CacheStore};
