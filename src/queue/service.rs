//! Main queue implementation.
//!
//! Provides the public `Queue` API that ties the containers, message
//! handles, retry strategy and hooks together.

use super::keys::{self, Keys};
use super::message::Message;
use super::metadata::{self, QueueMetadata, Status};
use super::strategy::{RetryStrategy, Strategy};
use super::subqueue::SubQueue;
use super::subset::SubSet;
use crate::clock::{Clock, SystemClock};
use crate::error::{Error, HandlerError, Result};
use crate::hooks::{Event, Hooks, Phase};
use crate::store::{End, Guard, Op, Store};
use anyhow::Context;
use bytes::Bytes;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Protocol version written to the metadata of new queues.
pub const PROTOCOL: i64 = 1;

/// Options a queue is opened with.
#[derive(Clone)]
pub struct QueueOptions {
    /// Namespace for all keys. `None` uses bare queue names.
    pub prefix: Option<String>,
    pub retry_strategy: RetryStrategy,
    /// Failures tolerated before a message is killed (`-1` for unlimited).
    pub max_retries: i64,
    /// Delay before a failed message is retried (zero requeues immediately).
    pub retry_delay: Duration,
    pub protocol_version: i64,
    /// Identifiers promoted per scan in [`Queue::schedule`].
    pub schedule_batch_size: usize,
    pub clock: Arc<dyn Clock>,
    pub hooks: Hooks,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            prefix: Some("relq".to_string()),
            retry_strategy: RetryStrategy::Linear,
            max_retries: 3,
            retry_delay: Duration::ZERO,
            protocol_version: PROTOCOL,
            schedule_batch_size: 100,
            clock: Arc::new(SystemClock),
            hooks: Hooks::default(),
        }
    }
}

impl QueueOptions {
    #[must_use]
    pub fn with_prefix(mut self, prefix: Option<&str>) -> Self {
        self.prefix = prefix.map(str::to_string);
        self
    }

    #[must_use]
    pub fn with_retry_strategy(mut self, strategy: RetryStrategy) -> Self {
        self.retry_strategy = strategy;
        self
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: i64) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    #[must_use]
    pub fn with_protocol_version(mut self, version: i64) -> Self {
        self.protocol_version = version;
        self
    }

    #[must_use]
    pub fn with_schedule_batch_size(mut self, size: usize) -> Self {
        self.schedule_batch_size = size;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    #[must_use]
    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }
}

impl fmt::Debug for QueueOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueOptions")
            .field("prefix", &self.prefix)
            .field("retry_strategy", &self.retry_strategy)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("protocol_version", &self.protocol_version)
            .field("schedule_batch_size", &self.schedule_batch_size)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

struct QueueInner {
    store: Store,
    keys: Arc<Keys>,
    options: QueueOptions,
    strategy: Box<dyn Strategy>,
    pending: SubQueue,
    processing: SubQueue,
    scheduled: SubSet,
    dead: SubQueue,
}

/// A reliable queue stored in a shared backing store.
///
/// Any number of processes may open the same queue; all coordination goes
/// through the store's atomic operations. Consumption is at least once: a
/// message leaves the queue only after a successful [`pop`](Self::pop), or
/// an explicit delete or clear.
///
/// # Example
///
/// ```
/// use relq::queue::{Queue, QueueOptions};
/// use relq::store::Store;
///
/// # #[tokio::main]
/// # async fn main() -> relq::Result<()> {
/// let queue = Queue::open(Store::memory(), "jobs", QueueOptions::default()).await?;
///
/// queue.push("hello").await?;
/// assert_eq!(queue.pop().await?, "hello");
/// assert!(queue.is_empty().await?);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Queue {
    inner: Arc<QueueInner>,
}

impl Queue {
    /// Opens a queue, registering it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VersionMismatch`] without writing anything if the
    /// queue was created with another protocol version. The version is read
    /// again after registering, so of two concurrent first opens with
    /// different versions only the one whose stamp landed succeeds.
    pub async fn open(store: Store, name: &str, options: QueueOptions) -> Result<Self> {
        let keys = Arc::new(Keys::new(options.prefix.as_deref(), name));

        check_version(&store, &keys, name, options.protocol_version).await?;

        let now = options.clock.current();
        store
            .exec(vec![
                Op::sadd(&keys.registry, name),
                Op::hsetnx(&keys.metadata, metadata::CREATED_AT, now),
                Op::hsetnx(&keys.metadata, metadata::UPDATED_AT, now),
                Op::hsetnx(&keys.metadata, metadata::VERSION, options.protocol_version),
            ])
            .await?;

        // A concurrent first open may have stamped its version between our
        // check and our HSETNX, which then wrote nothing.
        check_version(&store, &keys, name, options.protocol_version).await?;

        let strategy = options
            .retry_strategy
            .build(options.max_retries, options.retry_delay);
        let list = |key: &str, kind| SubQueue::new(store.clone(), keys.clone(), key.to_string(), kind);
        let pending = list(&keys.pending, "pending");
        let processing = list(&keys.processing, "processing");
        let dead = list(&keys.dead, "dead");
        let scheduled = SubSet::new(store.clone(), keys.clone(), keys.scheduled.clone());

        let queue = Self {
            inner: Arc::new(QueueInner {
                pending,
                processing,
                scheduled,
                dead,
                store,
                keys,
                options,
                strategy,
            }),
        };

        info!(
            queue = name,
            strategy = %queue.inner.options.retry_strategy,
            max_retries = queue.inner.options.max_retries,
            "Queue opened"
        );
        queue.hooks(Event::Initialize, Phase::After, &[]);

        Ok(queue)
    }

    /// Opens a queue that must already be registered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueueNotFound`] if no queue with this name exists.
    pub async fn open_existing(store: Store, name: &str, options: QueueOptions) -> Result<Self> {
        if !Self::exists(&store, options.prefix.as_deref(), name).await? {
            return Err(Error::queue_not_found(name));
        }
        Self::open(store, name, options).await
    }

    /// Names of every registered queue, sorted.
    pub async fn all(store: &Store, prefix: Option<&str>) -> Result<Vec<String>> {
        let mut names = store.smembers(&keys::registry(prefix)).await?;
        names.sort();
        Ok(names)
    }

    /// Number of registered queues.
    pub async fn count(store: &Store, prefix: Option<&str>) -> Result<usize> {
        Ok(Self::all(store, prefix).await?.len())
    }

    /// Whether a queue with this name is registered.
    pub async fn exists(store: &Store, prefix: Option<&str>, name: &str) -> Result<bool> {
        Ok(store.sismember(&keys::registry(prefix), name).await?)
    }

    pub fn name(&self) -> &str {
        &self.inner.keys.name
    }

    /// Store identifier of the queue (`<prefix>/<name>`).
    pub fn id(&self) -> &str {
        &self.inner.keys.pending
    }

    pub fn options(&self) -> &QueueOptions {
        &self.inner.options
    }

    pub fn pending(&self) -> &SubQueue {
        &self.inner.pending
    }

    pub fn processing(&self) -> &SubQueue {
        &self.inner.processing
    }

    pub fn scheduled(&self) -> &SubSet {
        &self.inner.scheduled
    }

    pub fn dead(&self) -> &SubQueue {
        &self.inner.dead
    }

    /// Handle to a message of this queue. The message may not exist.
    pub fn message(&self, id: u64) -> Message {
        Message::new(
            self.inner.store.clone(),
            self.inner.keys.clone(),
            self.inner.options.clock.clone(),
            id,
        )
    }

    /// Handle to an existing message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MessageNotFound`] if the message does not exist.
    pub async fn find(&self, id: u64) -> Result<Message> {
        let message = self.message(id);
        if !message.exists().await? {
            return Err(Error::message_not_found(self.name(), id));
        }
        Ok(message)
    }

    fn now(&self) -> i64 {
        self.inner.options.clock.current()
    }

    fn hooks(&self, event: Event, phase: Phase, ids: &[u64]) {
        self.inner.options.hooks.run(self.name(), event, phase, ids);
    }

    fn touch(&self, now: i64) -> Op {
        Op::hset(&self.inner.keys.metadata, [(metadata::UPDATED_AT, now)])
    }

    /// Pushes one message to the tail of pending, returning its id.
    pub async fn push(&self, data: impl Into<Bytes>) -> Result<u64> {
        let data = data.into();
        self.hooks(Event::Push, Phase::Before, &[]);

        let id = self.create(&data).await?;

        self.hooks(Event::Push, Phase::After, &[id]);
        Ok(id)
    }

    /// Pushes several messages, returning their ids in input order.
    pub async fn push_many<I, D>(&self, data: I) -> Result<Vec<u64>>
    where
        I: IntoIterator<Item = D>,
        D: Into<Bytes>,
    {
        self.hooks(Event::Push, Phase::Before, &[]);

        let mut ids = Vec::new();
        for data in data {
            ids.push(self.create(&data.into()).await?);
        }

        self.hooks(Event::Push, Phase::After, &ids);
        Ok(ids)
    }

    async fn create(&self, data: &[u8]) -> Result<u64> {
        let keys = &self.inner.keys;
        let raw = self.inner.store.incr(&keys.counter).await?;
        let id = u64::try_from(raw).with_context(|| format!("Invalid message id: {raw}"))?;
        let now = self.now();

        let message = self.message(id);
        let mut ops = message.create_ops(data, Status::Pending, now);
        ops.push(Op::rpush(&keys.pending, id));
        ops.push(self.touch(now));
        self.inner.store.exec(ops).await?;

        debug!(queue = self.name(), id, size = data.len(), "Pushed message");
        Ok(id)
    }

    /// Waits for a message and consumes it.
    ///
    /// The message is deleted before its payload is returned, so a crash
    /// after this call loses it. Use [`pop_with`](Self::pop_with) to delete
    /// only after the payload has been processed.
    pub async fn pop(&self) -> Result<Bytes> {
        loop {
            if let Some(data) = self.pop_timeout(None).await? {
                return Ok(data);
            }
        }
    }

    /// Like [`pop`](Self::pop), giving up after `timeout`.
    ///
    /// `None` waits forever.
    pub async fn pop_timeout(&self, timeout: Option<Duration>) -> Result<Option<Bytes>> {
        self.pop_with_timeout(timeout, |_| async { Ok::<(), HandlerError>(()) })
            .await
    }

    /// Waits for a message and hands its payload to `handler`.
    ///
    /// - `Ok(())`: the message is deleted and its payload returned.
    /// - [`HandlerError::Failed`]: the retry strategy decides where the
    ///   message goes next and `Ok(None)` is returned.
    /// - [`HandlerError::Other`]: returned as [`Error::Handler`]; the message
    ///   stays in processing until [`refill`](Self::refill) is called.
    pub async fn pop_with<F, Fut>(&self, handler: F) -> Result<Option<Bytes>>
    where
        F: FnOnce(Bytes) -> Fut,
        Fut: Future<Output = std::result::Result<(), HandlerError>>,
    {
        self.pop_with_timeout(None, handler).await
    }

    /// Like [`pop_with`](Self::pop_with), giving up after `timeout`.
    ///
    /// Returns `Ok(None)` on timeout without calling `handler`, and also
    /// when the message was deleted or killed between leaving pending and
    /// being marked as processing.
    pub async fn pop_with_timeout<F, Fut>(
        &self,
        timeout: Option<Duration>,
        handler: F,
    ) -> Result<Option<Bytes>>
    where
        F: FnOnce(Bytes) -> Fut,
        Fut: Future<Output = std::result::Result<(), HandlerError>>,
    {
        let keys = &self.inner.keys;
        self.hooks(Event::Pop, Phase::Before, &[]);

        let Some(raw) = self
            .inner
            .store
            .blmove(&keys.pending, &keys.processing, End::Left, End::Right, timeout)
            .await?
        else {
            return Ok(None);
        };
        let id = super::subqueue::parse_id(&raw)?;
        let message = self.message(id);
        let now = self.now();

        let retries = message
            .store()
            .hget(&message.metadata_key(), metadata::RETRIES)
            .await?
            .and_then(|r| r.parse::<i64>().ok())
            .unwrap_or_default();

        let mut ops = vec![
            message.status_op(Status::Processing, now),
            Op::hincrby(&keys.metadata, metadata::PROCESSED, 1),
            self.touch(now),
        ];
        if retries > 0 {
            ops.push(Op::hincrby(&keys.metadata, metadata::RETRIED, 1));
        }
        let guard = Guard::LMember {
            key: keys.processing.clone(),
            member: id.to_string(),
        };
        if !self.inner.store.exec_if(guard, ops).await? {
            // Deleted or killed after the move: nothing left to consume
            debug!(queue = self.name(), id, "Message removed before consumption");
            return Ok(None);
        }

        let data = message.data().await?;
        debug!(queue = self.name(), id, retries, "Consuming message");

        match handler(data.clone()).await {
            Ok(()) => {
                self.hooks(Event::Pop, Phase::After, &[id]);
                message.delete().await?;
                Ok(Some(data))
            }
            Err(HandlerError::Failed(reason)) => {
                self.inner
                    .store
                    .exec(vec![Op::hincrby(&keys.metadata, metadata::FAILED, 1)])
                    .await?;
                let status = self.inner.strategy.retry(&message, &reason).await?;
                debug!(queue = self.name(), id, %status, error = %reason, "Message failed");
                Ok(None)
            }
            Err(HandlerError::Other(error)) => Err(Error::Handler(error)),
        }
    }

    /// Returns the payload at position `index` of pending without
    /// consuming it.
    pub async fn peek(&self, index: i64) -> Result<Option<Bytes>> {
        self.hooks(Event::Peek, Phase::Before, &[]);

        let Some(id) = self.inner.pending.peek(index).await? else {
            return Ok(None);
        };
        let data = self.inner.store.get(&self.inner.keys.data(id)).await?;

        self.hooks(Event::Peek, Phase::After, &[id]);
        Ok(data.map(Bytes::from))
    }

    /// Returns the payloads at positions `start..=stop` of pending without
    /// consuming them.
    pub async fn range(&self, start: i64, stop: i64) -> Result<Vec<Bytes>> {
        self.hooks(Event::Range, Phase::Before, &[]);

        let ids = self.inner.pending.range(start, stop).await?;
        let mut data = Vec::with_capacity(ids.len());
        for &id in &ids {
            if let Some(payload) = self.inner.store.get(&self.inner.keys.data(id)).await? {
                data.push(Bytes::from(payload));
            }
        }

        self.hooks(Event::Range, Phase::After, &ids);
        Ok(data)
    }

    async fn clear_containers(&self) -> Result<Vec<u64>> {
        let mut ids = self.inner.pending.clear().await?;
        ids.extend(self.inner.processing.clear().await?);
        ids.extend(self.inner.scheduled.clear().await?);
        ids.extend(self.inner.dead.clear().await?);
        Ok(ids)
    }

    /// Deletes every message and resets the statistics.
    ///
    /// The queue stays registered and the id counter is kept, so ids are
    /// never reused. Returns the ids of the deleted messages.
    pub async fn clear(&self) -> Result<Vec<u64>> {
        self.hooks(Event::Clear, Phase::Before, &[]);

        let ids = self.clear_containers().await?;
        let now = self.now();
        self.inner
            .store
            .exec(vec![Op::hset(
                &self.inner.keys.metadata,
                [
                    (metadata::PROCESSED, 0),
                    (metadata::FAILED, 0),
                    (metadata::RETRIED, 0),
                    (metadata::UPDATED_AT, now),
                ],
            )])
            .await?;

        info!(queue = self.name(), count = ids.len(), "Queue cleared");
        self.hooks(Event::Clear, Phase::After, &ids);
        Ok(ids)
    }

    /// Deletes every message, the queue metadata, and the registration.
    ///
    /// The id counter is kept, so a queue recreated under the same name
    /// never reuses ids.
    pub async fn delete(&self) -> Result<Vec<u64>> {
        self.hooks(Event::Delete, Phase::Before, &[]);

        let ids = self.clear_containers().await?;
        let keys = &self.inner.keys;
        self.inner
            .store
            .exec(vec![
                Op::del([keys.metadata.clone()]),
                Op::srem(&keys.registry, self.name()),
            ])
            .await?;

        info!(queue = self.name(), count = ids.len(), "Queue deleted");
        self.hooks(Event::Delete, Phase::After, &ids);
        Ok(ids)
    }

    /// Moves ids from the tail of `from` to the head of pending, updating
    /// each status in the same transaction as the move.
    async fn requeue(&self, from: &SubQueue) -> Result<Vec<u64>> {
        let keys = &self.inner.keys;
        let mut ids = Vec::new();

        while let Some(id) = from.peek(-1).await? {
            let guard = Guard::LMember {
                key: from.key().to_string(),
                member: id.to_string(),
            };
            let now = self.now();
            let ops = vec![
                Op::lrem(from.key(), id),
                Op::lpush(&keys.pending, id),
                self.message(id).status_op(Status::Pending, now),
            ];
            if self.inner.store.exec_if(guard, ops).await? {
                ids.push(id);
            } else {
                debug!(queue = self.name(), id, "Already moved elsewhere");
            }
        }

        if !ids.is_empty() {
            self.inner.store.exec(vec![self.touch(self.now())]).await?;
        }
        Ok(ids)
    }

    /// Moves every message in processing back to the head of pending.
    ///
    /// Recovers messages abandoned by crashed consumers. Relative order is
    /// preserved. Returns the moved ids, last in-flight first.
    pub async fn refill(&self) -> Result<Vec<u64>> {
        self.hooks(Event::Refill, Phase::Before, &[]);

        let ids = self.requeue(&self.inner.processing).await?;

        info!(queue = self.name(), count = ids.len(), "Refilled messages");
        self.hooks(Event::Refill, Phase::After, &ids);
        Ok(ids)
    }

    /// Moves every dead message back to the head of pending.
    pub async fn revive(&self) -> Result<Vec<u64>> {
        self.hooks(Event::Revive, Phase::Before, &[]);

        let ids = self.requeue(&self.inner.dead).await?;

        info!(queue = self.name(), count = ids.len(), "Revived messages");
        self.hooks(Event::Revive, Phase::After, &ids);
        Ok(ids)
    }

    /// Promotes scheduled messages that are due to the head of pending.
    ///
    /// Safe to call from several processes at once: each message is
    /// promoted exactly once. Returns the promoted ids.
    pub async fn schedule(&self) -> Result<Vec<u64>> {
        self.hooks(Event::Schedule, Phase::Before, &[]);

        let keys = &self.inner.keys;
        let batch_size = self.inner.options.schedule_batch_size.max(1);
        let now = self.now();
        let mut promoted = Vec::new();

        loop {
            let batch = self.inner.scheduled.due(now, batch_size).await?;
            for &id in &batch {
                let guard = Guard::ZMember {
                    key: keys.scheduled.clone(),
                    member: id.to_string(),
                };
                let ops = vec![
                    self.message(id).status_op(Status::Pending, now),
                    Op::lpush(&keys.pending, id),
                    Op::zrem(&keys.scheduled, id),
                ];
                if self.inner.store.exec_if(guard, ops).await? {
                    promoted.push(id);
                } else {
                    debug!(queue = self.name(), id, "Already promoted elsewhere");
                }
            }

            // Every scanned id has left the set, so the next scan starts
            // from the lowest remaining score.
            if batch.len() < batch_size {
                break;
            }
        }

        if !promoted.is_empty() {
            self.inner.store.exec(vec![self.touch(now)]).await?;
            info!(queue = self.name(), count = promoted.len(), "Scheduled messages");
        }
        self.hooks(Event::Schedule, Phase::After, &promoted);
        Ok(promoted)
    }

    /// Kills the given messages.
    ///
    /// Every id is looked up first; nothing is killed if one is missing.
    pub async fn kill_ids(&self, ids: &[u64]) -> Result<()> {
        let mut messages = Vec::with_capacity(ids.len());
        for &id in ids {
            messages.push(self.find(id).await?);
        }
        for message in messages {
            message.kill().await?;
        }
        Ok(())
    }

    /// Deletes the given messages.
    ///
    /// Every id is looked up first; nothing is deleted if one is missing.
    pub async fn delete_ids(&self, ids: &[u64]) -> Result<()> {
        let mut messages = Vec::with_capacity(ids.len());
        for &id in ids {
            messages.push(self.find(id).await?);
        }
        for message in messages {
            message.delete().await?;
        }
        Ok(())
    }

    /// Number of pending messages.
    pub async fn size(&self) -> Result<usize> {
        self.inner.pending.size().await
    }

    pub async fn is_empty(&self) -> Result<bool> {
        self.inner.pending.is_empty().await
    }

    pub async fn metadata(&self) -> Result<QueueMetadata> {
        let hash = self.inner.store.hgetall(&self.inner.keys.metadata).await?;
        Ok(QueueMetadata::parse(&hash))
    }
}

/// Fails if `keys` belong to a queue stamped with another protocol version.
async fn check_version(store: &Store, keys: &Keys, name: &str, expected: i64) -> Result<()> {
    let Some(stored) = store.hget(&keys.metadata, metadata::VERSION).await? else {
        return Ok(());
    };
    let actual = stored
        .parse::<i64>()
        .with_context(|| format!("Invalid protocol version: {stored:?}"))?;
    if actual != expected {
        warn!(queue = name, expected, actual, "Protocol version mismatch");
        return Err(Error::VersionMismatch {
            queue: keys.pending.clone(),
            expected,
            actual,
        });
    }
    Ok(())
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("id", &self.id())
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}
