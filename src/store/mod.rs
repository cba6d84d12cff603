//! Backing store adapter with pluggable backends.
//!
//! Exposes the atomic primitives the queue engine is built from: list
//! push/pop/move/range, blocking move with timeout, sorted sets scored by
//! due time, hashes with atomic increment, counters, sets, and atomic
//! multi-key batches.
//!
//! - **RedisBackend**: the production backend, shared by any number of
//!   processes (feature `redis`, enabled by default)
//! - **MemoryBackend**: fast, in-process keyspace (testing/embedding)
//!
//! # Example
//!
//! ```ignore
//! use relq::store::{Op, Store};
//!
//! let store = Store::memory();
//! store.exec(vec![Op::rpush("jobs", 1), Op::set("jobs:data:1", "hello")]).await?;
//! ```
//!
//! # Custom Backends
//!
//! Implement the `StoreBackend` trait to use another store:
//!
//! ```ignore
//! use relq::store::{Store, StoreBackend};
//!
//! struct KeyDbBackend { /* ... */ }
//! impl StoreBackend for KeyDbBackend { /* ... */ }
//!
//! let store = Store::custom(KeyDbBackend::new());
//! ```

mod backend;
mod memory;
#[cfg(feature = "redis")]
mod redis;
#[allow(clippy::module_inception)]
mod store;

// Re-export the public API
pub use backend::{End, Guard, Op, StoreBackend};
pub use memory::MemoryBackend;
#[cfg(feature = "redis")]
pub use self::redis::RedisBackend;
pub use store::Store;

/// Default number of dedicated connections for blocking moves.
pub const DEFAULT_BLOCKING_POOL_SIZE: usize = 16;
