//! Backend trait for the backing store.
//!
//! Defines the atomic primitives every queue operation is composed from,
//! enabling pluggable storage (Redis, memory, etc.).

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// End of a list, used by move operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum End {
    Left,
    Right,
}

impl End {
    /// Redis keyword for this end.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
        }
    }
}

/// A single write command, executed as part of an atomic batch.
///
/// Values are stored as strings (identifiers, counters, timestamps) except
/// for [`Op::Set`], which carries an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Set { key: String, value: Vec<u8> },
    Del { keys: Vec<String> },
    HSet { key: String, fields: Vec<(String, String)> },
    HSetNx { key: String, field: String, value: String },
    HDel { key: String, fields: Vec<String> },
    HIncrBy { key: String, field: String, delta: i64 },
    RPush { key: String, value: String },
    LPush { key: String, value: String },
    /// Removes every occurrence of `value` (`LREM key 0 value`).
    LRem { key: String, value: String },
    ZAdd { key: String, score: i64, member: String },
    ZRem { key: String, member: String },
    SAdd { key: String, member: String },
    SRem { key: String, member: String },
}

impl Op {
    pub fn set(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self::Set {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn del<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Del {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn hset<I, F, V>(key: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = (F, V)>,
        F: Into<String>,
        V: ToString,
    {
        Self::HSet {
            key: key.into(),
            fields: fields
                .into_iter()
                .map(|(f, v)| (f.into(), v.to_string()))
                .collect(),
        }
    }

    pub fn hsetnx(key: impl Into<String>, field: impl Into<String>, value: impl ToString) -> Self {
        Self::HSetNx {
            key: key.into(),
            field: field.into(),
            value: value.to_string(),
        }
    }

    pub fn hdel<I, S>(key: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::HDel {
            key: key.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn hincrby(key: impl Into<String>, field: impl Into<String>, delta: i64) -> Self {
        Self::HIncrBy {
            key: key.into(),
            field: field.into(),
            delta,
        }
    }

    pub fn rpush(key: impl Into<String>, value: impl ToString) -> Self {
        Self::RPush {
            key: key.into(),
            value: value.to_string(),
        }
    }

    pub fn lpush(key: impl Into<String>, value: impl ToString) -> Self {
        Self::LPush {
            key: key.into(),
            value: value.to_string(),
        }
    }

    pub fn lrem(key: impl Into<String>, value: impl ToString) -> Self {
        Self::LRem {
            key: key.into(),
            value: value.to_string(),
        }
    }

    pub fn zadd(key: impl Into<String>, score: i64, member: impl ToString) -> Self {
        Self::ZAdd {
            key: key.into(),
            score,
            member: member.to_string(),
        }
    }

    pub fn zrem(key: impl Into<String>, member: impl ToString) -> Self {
        Self::ZRem {
            key: key.into(),
            member: member.to_string(),
        }
    }

    pub fn sadd(key: impl Into<String>, member: impl ToString) -> Self {
        Self::SAdd {
            key: key.into(),
            member: member.to_string(),
        }
    }

    pub fn srem(key: impl Into<String>, member: impl ToString) -> Self {
        Self::SRem {
            key: key.into(),
            member: member.to_string(),
        }
    }
}

/// Precondition checked atomically before a guarded batch is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    /// `member` is present in the sorted set at `key`.
    ZMember { key: String, member: String },
    /// `member` is an element of the list at `key`.
    LMember { key: String, member: String },
}

/// Backend trait for the backing store.
///
/// All backends must be thread-safe (`Send + Sync`) for use with tokio.
/// Range and index arguments follow Redis semantics: inclusive bounds, and
/// negative values count from the tail. Empty containers cease to exist.
///
/// # Example
///
/// ```ignore
/// use relq::store::{MemoryBackend, Op, StoreBackend};
///
/// let backend = MemoryBackend::new();
/// backend.exec(vec![Op::rpush("list", 1), Op::rpush("list", 2)]).await?;
/// assert_eq!(backend.lrange("list", 0, -1).await?, vec!["1", "2"]);
/// ```
#[async_trait]
pub trait StoreBackend: Send + Sync + 'static {
    /// Retrieves a string value.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Checks whether a key exists, whatever its type.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Atomically increments a counter, returning the new value.
    async fn incr(&self, key: &str) -> Result<i64>;

    /// Retrieves a single hash field.
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>>;

    /// Retrieves all fields of a hash. Missing hashes are empty.
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>>;

    /// Atomically increments a hash field, returning the new value.
    async fn hincrby(&self, key: &str, field: &str, delta: i64) -> Result<i64>;

    /// Returns list elements between `start` and `stop` (inclusive).
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>>;

    /// Returns the list element at `index`.
    async fn lindex(&self, key: &str, index: i64) -> Result<Option<String>>;

    /// Returns the length of a list.
    async fn llen(&self, key: &str) -> Result<usize>;

    /// Atomically pops an element from one end of `src` and pushes it onto
    /// one end of `dst`. Returns `None` if `src` is empty.
    async fn lmove(&self, src: &str, dst: &str, from: End, to: End) -> Result<Option<String>>;

    /// Blocking variant of [`lmove`](Self::lmove).
    ///
    /// Waits until an element is available or `timeout` elapses. A `None`
    /// timeout waits forever.
    async fn blmove(
        &self,
        src: &str,
        dst: &str,
        from: End,
        to: End,
        timeout: Option<Duration>,
    ) -> Result<Option<String>>;

    /// Returns sorted-set members by rank, ordered by ascending score.
    async fn zrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>>;

    /// Returns sorted-set members with `min <= score <= max`, ordered by
    /// ascending score. `limit` is an `(offset, count)` pair.
    async fn zrangebyscore(
        &self,
        key: &str,
        min: i64,
        max: i64,
        limit: Option<(usize, usize)>,
    ) -> Result<Vec<String>>;

    /// Returns the cardinality of a sorted set.
    async fn zcard(&self, key: &str) -> Result<usize>;

    /// Returns all members of a set.
    async fn smembers(&self, key: &str) -> Result<Vec<String>>;

    /// Checks set membership.
    async fn sismember(&self, key: &str, member: &str) -> Result<bool>;

    /// Applies a batch of writes atomically.
    ///
    /// No other client observes a state in which only part of the batch
    /// has been applied.
    async fn exec(&self, ops: Vec<Op>) -> Result<()>;

    /// Applies a batch of writes atomically if `guard` holds.
    ///
    /// Returns `Ok(false)` without writing anything when it does not.
    async fn exec_if(&self, guard: Guard, ops: Vec<Op>) -> Result<bool>;
}
