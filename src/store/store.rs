//! High-level `Store` handle over backend implementations.
//!
//! Queues hold a `Store` and never talk to a backend directly.

use super::backend::StoreBackend;
use super::memory::MemoryBackend;
use std::ops::Deref;
use std::sync::Arc;

/// Shared handle to a backing store.
///
/// Wraps a `StoreBackend` implementation and dereferences to it, so every
/// primitive is available directly on the handle.
///
/// # Thread Safety
///
/// `Store` is `Clone` and can be shared across tasks. Each call acquires
/// whatever connection the backend needs for its duration only.
///
/// # Example
///
/// ```ignore
/// use relq::store::Store;
///
/// // In-process store (testing/embedding)
/// let store = Store::memory();
///
/// // Redis (production)
/// let store = Store::redis("redis://localhost:6379/0").await?;
/// ```
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn StoreBackend>,
}

impl Store {
    /// Creates a new `Store` backed by an in-memory keyspace.
    ///
    /// All data is lost when the process exits.
    pub fn memory() -> Self {
        Self::custom(MemoryBackend::new())
    }

    /// Creates a new `Store` connected to a Redis server.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the server is unreachable.
    #[cfg(feature = "redis")]
    pub async fn redis(url: &str) -> anyhow::Result<Self> {
        let backend = super::redis::RedisBackend::connect(url).await?;
        Ok(Self::custom(backend))
    }

    /// Like [`redis`](Self::redis), capping the connections held by
    /// blocked consumers at `blocking_pool_size`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the server is unreachable.
    #[cfg(feature = "redis")]
    pub async fn redis_with_pool(url: &str, blocking_pool_size: usize) -> anyhow::Result<Self> {
        let backend = super::redis::RedisBackend::connect_with_pool(url, blocking_pool_size).await?;
        Ok(Self::custom(backend))
    }

    /// Creates a new `Store` with a custom backend.
    ///
    /// A [`MemoryBackend`] passed here keeps its shared keyspace, so the
    /// caller can hold on to a clone for inspection.
    pub fn custom<B: StoreBackend>(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// Creates a new `Store` from a shared backend.
    pub fn from_arc(backend: Arc<dyn StoreBackend>) -> Self {
        Self { backend }
    }
}

impl Deref for Store {
    type Target = dyn StoreBackend;

    fn deref(&self) -> &Self::Target {
        self.backend.as_ref()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}
