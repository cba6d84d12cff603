//! FIFO list of message identifiers.

use super::keys::Keys;
use crate::error::Result;
use crate::store::{Op, Store};
use anyhow::Context;
use std::sync::Arc;
use tracing::debug;

pub(crate) fn parse_id(raw: &str) -> anyhow::Result<u64> {
    raw.parse()
        .with_context(|| format!("Invalid message identifier: {raw:?}"))
}

pub(crate) fn parse_ids(raw: Vec<String>) -> anyhow::Result<Vec<u64>> {
    raw.iter().map(|id| parse_id(id)).collect()
}

/// Ordered list of message identifiers backed by a store list.
///
/// Holds identifiers only; payloads live under the message keys. Used for
/// the pending, processing and dead containers of a queue.
#[derive(Debug, Clone)]
pub struct SubQueue {
    store: Store,
    keys: Arc<Keys>,
    key: String,
    kind: &'static str,
}

impl SubQueue {
    pub(crate) fn new(store: Store, keys: Arc<Keys>, key: String, kind: &'static str) -> Self {
        Self {
            store,
            keys,
            key,
            kind,
        }
    }

    /// Store key of the underlying list.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Container name: `pending`, `processing` or `dead`.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Appends an identifier at the tail.
    ///
    /// Duplicates are not detected; callers must not add an id twice.
    pub async fn add(&self, id: u64) -> Result<()> {
        self.store.exec(vec![Op::rpush(&self.key, id)]).await?;
        Ok(())
    }

    /// Inserts an identifier at the head.
    pub async fn add_head(&self, id: u64) -> Result<()> {
        self.store.exec(vec![Op::lpush(&self.key, id)]).await?;
        Ok(())
    }

    /// Removes an identifier. Absent ids are ignored.
    pub async fn remove(&self, id: u64) -> Result<()> {
        self.store.exec(vec![Op::lrem(&self.key, id)]).await?;
        Ok(())
    }

    /// Returns the identifier at `index` (negative counts from the tail).
    pub async fn peek(&self, index: i64) -> Result<Option<u64>> {
        let raw = self.store.lindex(&self.key, index).await?;
        Ok(raw.as_deref().map(parse_id).transpose()?)
    }

    /// Returns identifiers between `start` and `stop`, both inclusive.
    pub async fn range(&self, start: i64, stop: i64) -> Result<Vec<u64>> {
        let raw = self.store.lrange(&self.key, start, stop).await?;
        Ok(parse_ids(raw)?)
    }

    /// Returns every identifier, head first.
    pub async fn ids(&self) -> Result<Vec<u64>> {
        self.range(0, -1).await
    }

    /// Removes every identifier and deletes the messages they refer to.
    ///
    /// Identifiers added while the clear is in progress are left alone.
    pub async fn clear(&self) -> Result<Vec<u64>> {
        let ids = self.ids().await?;
        if ids.is_empty() {
            return Ok(ids);
        }

        let mut ops = Vec::with_capacity(ids.len() * 2);
        for &id in &ids {
            ops.push(Op::lrem(&self.key, id));
            ops.push(Op::del([self.keys.data(id), self.keys.message_metadata(id)]));
        }
        self.store.exec(ops).await?;

        debug!(key = %self.key, count = ids.len(), "Cleared {}", self.kind);
        Ok(ids)
    }

    pub async fn size(&self) -> Result<usize> {
        Ok(self.store.llen(&self.key).await?)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.size().await? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(store: &Store) -> SubQueue {
        let keys = Arc::new(Keys::new(Some("test"), "jobs"));
        SubQueue::new(store.clone(), keys.clone(), keys.pending.clone(), "pending")
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let store = Store::memory();
        let list = pending(&store);

        list.add(1).await.unwrap();
        list.add(2).await.unwrap();
        list.add_head(0).await.unwrap();

        assert_eq!(list.ids().await.unwrap(), vec![0, 1, 2]);
        assert_eq!(list.peek(0).await.unwrap(), Some(0));
        assert_eq!(list.peek(-1).await.unwrap(), Some(2));
        assert_eq!(list.peek(5).await.unwrap(), None);
        assert_eq!(list.range(1, 5).await.unwrap(), vec![1, 2]);
        assert_eq!(list.size().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_remove_absent_is_noop() {
        let store = Store::memory();
        let list = pending(&store);

        list.add(1).await.unwrap();
        list.remove(7).await.unwrap();
        list.remove(1).await.unwrap();

        assert!(list.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_deletes_messages() {
        let store = Store::memory();
        let list = pending(&store);

        store
            .exec(vec![
                Op::set("test/jobs:data:1", "a"),
                Op::hset("test/jobs:metadata:1", [("status", "pending")]),
                Op::set("test/jobs:data:2", "b"),
                Op::rpush("test/jobs", 1),
                Op::rpush("test/jobs", 2),
            ])
            .await
            .unwrap();

        assert_eq!(list.clear().await.unwrap(), vec![1, 2]);
        assert!(list.is_empty().await.unwrap());
        assert!(!store.exists("test/jobs:data:1").await.unwrap());
        assert!(!store.exists("test/jobs:metadata:1").await.unwrap());
        assert!(!store.exists("test/jobs:data:2").await.unwrap());
    }

    #[tokio::test]
    async fn test_invalid_identifier_is_an_error() {
        let store = Store::memory();
        let list = pending(&store);

        store.exec(vec![Op::rpush("test/jobs", "x")]).await.unwrap();
        assert!(list.peek(0).await.is_err());
    }
}
