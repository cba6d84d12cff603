//! Handle to a single message.

use super::keys::Keys;
use super::metadata::{self, MessageMetadata, Status};
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::store::{Op, Store};
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A message of a queue, identified by its numeric id.
///
/// Cheap to create: it holds no payload, every accessor reads the store.
/// Obtained from [`Queue::message`](super::Queue::message) or
/// [`Queue::find`](super::Queue::find).
#[derive(Clone)]
pub struct Message {
    store: Store,
    keys: Arc<Keys>,
    clock: Arc<dyn Clock>,
    id: u64,
}

impl Message {
    pub(crate) fn new(store: Store, keys: Arc<Keys>, clock: Arc<dyn Clock>, id: u64) -> Self {
        Self {
            store,
            keys,
            clock,
            id,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Name of the queue the message belongs to.
    pub fn queue(&self) -> &str {
        &self.keys.name
    }

    pub(crate) fn keys(&self) -> &Keys {
        &self.keys
    }

    pub(crate) fn now(&self) -> i64 {
        self.clock.current()
    }

    pub(crate) fn data_key(&self) -> String {
        self.keys.data(self.id)
    }

    pub(crate) fn metadata_key(&self) -> String {
        self.keys.message_metadata(self.id)
    }

    /// Whether the payload exists.
    pub async fn exists(&self) -> Result<bool> {
        Ok(self.store.exists(&self.data_key()).await?)
    }

    /// Loads the payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MessageNotFound`] if the message does not exist.
    pub async fn data(&self) -> Result<Bytes> {
        self.store
            .get(&self.data_key())
            .await?
            .map(Bytes::from)
            .ok_or_else(|| Error::message_not_found(&self.keys.name, self.id))
    }

    /// Payload length in bytes (zero if the message does not exist).
    pub async fn size(&self) -> Result<usize> {
        Ok(self.store.get(&self.data_key()).await?.map_or(0, |d| d.len()))
    }

    pub async fn metadata(&self) -> Result<MessageMetadata> {
        let hash = self.store.hgetall(&self.metadata_key()).await?;
        Ok(MessageMetadata::parse(&hash))
    }

    pub async fn status(&self) -> Result<Status> {
        let status = self.store.hget(&self.metadata_key(), metadata::STATUS).await?;
        Ok(status
            .map(|s| s.parse().unwrap_or_default())
            .unwrap_or_default())
    }

    /// Writes the payload and fresh metadata.
    pub(crate) fn create_ops(&self, data: &[u8], status: Status, now: i64) -> Vec<Op> {
        vec![
            Op::set(self.data_key(), data),
            Op::hset(
                self.metadata_key(),
                [
                    (metadata::STATUS, status.to_string()),
                    (metadata::RETRIES, "0".to_string()),
                    (metadata::CREATED_AT, now.to_string()),
                    (metadata::UPDATED_AT, now.to_string()),
                ],
            ),
        ]
    }

    /// Sets the status and bumps `updated_at`.
    pub(crate) fn status_op(&self, status: Status, now: i64) -> Op {
        Op::hset(
            self.metadata_key(),
            [
                (metadata::STATUS, status.to_string()),
                (metadata::UPDATED_AT, now.to_string()),
            ],
        )
    }

    /// Moves the id to the tail of dead, out of every other container, and
    /// resets the retry count.
    pub(crate) fn kill_ops(&self, now: i64) -> Vec<Op> {
        let id = self.id;
        vec![
            Op::lrem(&self.keys.pending, id),
            Op::lrem(&self.keys.processing, id),
            Op::zrem(&self.keys.scheduled, id),
            Op::lrem(&self.keys.dead, id),
            Op::rpush(&self.keys.dead, id),
            Op::hdel(self.metadata_key(), [metadata::RETRIES]),
            self.status_op(Status::Dead, now),
        ]
    }

    /// Removes the id from every container and deletes payload and metadata.
    pub(crate) fn delete_ops(&self) -> Vec<Op> {
        let id = self.id;
        vec![
            Op::lrem(&self.keys.pending, id),
            Op::lrem(&self.keys.processing, id),
            Op::zrem(&self.keys.scheduled, id),
            Op::lrem(&self.keys.dead, id),
            Op::del([self.data_key(), self.metadata_key()]),
        ]
    }

    /// Moves the message to the dead container.
    pub async fn kill(&self) -> Result<()> {
        debug!(queue = %self.keys.name, id = self.id, "Killing message");
        self.store.exec(self.kill_ops(self.now())).await?;
        Ok(())
    }

    /// Removes the message from its queue and deletes it.
    pub async fn delete(&self) -> Result<()> {
        debug!(queue = %self.keys.name, id = self.id, "Deleting message");
        self.store.exec(self.delete_ops()).await?;
        Ok(())
    }

    pub(crate) fn store(&self) -> &Store {
        &self.store
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("queue", &self.keys.name)
            .field("id", &self.id)
            .finish()
    }
}
