//! Request-level caching for offline support.
//!
//! This module provides:
//! - Named response caches backed by SQLite, each enumerable and deletable
//! - A data-driven route table selecting a caching strategy per request class
//! - A router applying cache-first, network-first (optionally with a timeout)
//!   and stale-while-revalidate, degrading to offline documents on failure

mod router;
mod storage;
mod strategy;
mod traits;

pub use router::CacheRouter;
pub use storage::{CacheStorage, SqliteStorage};
pub use strategy::RouterConfig;
pub use traits::{request_key, ServeSource, Served};
