//! Score-ordered set of message identifiers.

use super::keys::Keys;
use super::subqueue::parse_ids;
use crate::error::Result;
use crate::store::{Op, Store};
use std::sync::Arc;
use tracing::debug;

/// Message identifiers ordered by score, backed by a store sorted set.
///
/// The score is the unix time at which the message becomes eligible to be
/// consumed again. Used for the scheduled container of a queue.
#[derive(Debug, Clone)]
pub struct SubSet {
    store: Store,
    keys: Arc<Keys>,
    key: String,
}

impl SubSet {
    pub(crate) fn new(store: Store, keys: Arc<Keys>, key: String) -> Self {
        Self { store, keys, key }
    }

    /// Store key of the underlying sorted set.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> &'static str {
        "scheduled"
    }

    /// Inserts an identifier, or moves it if already present.
    pub async fn add(&self, id: u64, score: i64) -> Result<()> {
        self.store.exec(vec![Op::zadd(&self.key, score, id)]).await?;
        Ok(())
    }

    /// Removes an identifier. Absent ids are ignored.
    pub async fn remove(&self, id: u64) -> Result<()> {
        self.store.exec(vec![Op::zrem(&self.key, id)]).await?;
        Ok(())
    }

    /// Returns the identifier at rank `index` (negative counts from the end).
    pub async fn peek(&self, index: i64) -> Result<Option<u64>> {
        Ok(self.range(index, index).await?.into_iter().next())
    }

    /// Returns identifiers ranked `start..=stop`, lowest score first.
    pub async fn range(&self, start: i64, stop: i64) -> Result<Vec<u64>> {
        let raw = self.store.zrange(&self.key, start, stop).await?;
        Ok(parse_ids(raw)?)
    }

    /// Returns every identifier, lowest score first.
    pub async fn ids(&self) -> Result<Vec<u64>> {
        self.range(0, -1).await
    }

    /// Returns at most `limit` identifiers with a score of `now` or less.
    pub async fn due(&self, now: i64, limit: usize) -> Result<Vec<u64>> {
        let raw = self
            .store
            .zrangebyscore(&self.key, i64::MIN, now, Some((0, limit)))
            .await?;
        Ok(parse_ids(raw)?)
    }

    /// Removes every identifier and deletes the messages they refer to.
    pub async fn clear(&self) -> Result<Vec<u64>> {
        let ids = self.ids().await?;
        if ids.is_empty() {
            return Ok(ids);
        }

        let mut ops = Vec::with_capacity(ids.len() * 2);
        for &id in &ids {
            ops.push(Op::zrem(&self.key, id));
            ops.push(Op::del([self.keys.data(id), self.keys.message_metadata(id)]));
        }
        self.store.exec(ops).await?;

        debug!(key = %self.key, count = ids.len(), "Cleared scheduled");
        Ok(ids)
    }

    pub async fn size(&self) -> Result<usize> {
        Ok(self.store.zcard(&self.key).await?)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.size().await? == 0)
    }
}
