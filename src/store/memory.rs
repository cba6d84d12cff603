//! In-memory storage backend.
//!
//! Provides a fast, non-persistent keyspace with Redis list, hash, set and
//! sorted-set semantics. Ideal for testing, development, and single-process
//! deployments where queues do not need to outlive the process.

use super::backend::{End, Guard, Op, StoreBackend};
use anyhow::{Result, bail};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Value stored under a key.
#[derive(Debug, Clone)]
enum Value {
    Str(Vec<u8>),
    List(VecDeque<String>),
    Hash(HashMap<String, String>),
    Set(BTreeSet<String>),
    ZSet(HashMap<String, i64>),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::Hash(_) => "hash",
            Self::Set(_) => "set",
            Self::ZSet(_) => "zset",
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Self::Str(_) => false,
            Self::List(l) => l.is_empty(),
            Self::Hash(h) => h.is_empty(),
            Self::Set(s) => s.is_empty(),
            Self::ZSet(z) => z.is_empty(),
        }
    }
}

fn wrong_type(key: &str, expected: &str, found: &Value) -> anyhow::Error {
    anyhow::anyhow!(
        "WRONGTYPE key '{key}' holds a {} value, expected {expected}",
        found.type_name()
    )
}

/// Resolves an inclusive Redis-style range against a container length.
pub(crate) fn normalize_range(start: i64, stop: i64, len: usize) -> Option<(usize, usize)> {
    let len = i64::try_from(len).ok()?;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };

    if start >= len || start > stop {
        return None;
    }

    Some((usize::try_from(start).ok()?, usize::try_from(stop).ok()?))
}

/// Resolves a Redis-style index against a container length.
fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let index = if index < 0 { len + index } else { index };
    if (0..len).contains(&index) {
        usize::try_from(index).ok()
    } else {
        None
    }
}

/// The keyspace guarded by the backend mutex.
#[derive(Debug, Default)]
struct Keyspace {
    data: HashMap<String, Value>,
}

macro_rules! typed {
    ($name:ident, $name_mut:ident, $variant:ident, $ty:ty, $label:literal) => {
        fn $name(&self, key: &str) -> Result<Option<&$ty>> {
            match self.data.get(key) {
                None => Ok(None),
                Some(Value::$variant(v)) => Ok(Some(v)),
                Some(other) => Err(wrong_type(key, $label, other)),
            }
        }

        fn $name_mut(&mut self, key: &str) -> Result<&mut $ty> {
            let value = self
                .data
                .entry(key.to_string())
                .or_insert_with(|| Value::$variant(Default::default()));
            match value {
                Value::$variant(v) => Ok(v),
                other => Err(wrong_type(key, $label, other)),
            }
        }
    };
}

impl Keyspace {
    typed!(list, list_mut, List, VecDeque<String>, "list");
    typed!(hash, hash_mut, Hash, HashMap<String, String>, "hash");
    typed!(set, set_mut, Set, BTreeSet<String>, "set");
    typed!(zset, zset_mut, ZSet, HashMap<String, i64>, "zset");

    /// Drops the key if it holds an empty container.
    fn prune(&mut self, key: &str) {
        if self.data.get(key).is_some_and(Value::is_empty) {
            self.data.remove(key);
        }
    }

    fn hincrby(&mut self, key: &str, field: &str, delta: i64) -> Result<i64> {
        let hash = self.hash_mut(key)?;
        let current = match hash.get(field) {
            Some(v) => v
                .parse::<i64>()
                .map_err(|_| anyhow::anyhow!("hash value at '{key}'.'{field}' is not an integer"))?,
            None => 0,
        };
        let Some(next) = current.checked_add(delta) else {
            bail!("increment of '{key}'.'{field}' would overflow");
        };
        hash.insert(field.to_string(), next.to_string());
        Ok(next)
    }

    fn lmove(&mut self, src: &str, dst: &str, from: End, to: End) -> Result<Option<String>> {
        // Type-check the destination before mutating the source
        if let Some(other) = self.data.get(dst)
            && !matches!(other, Value::List(_))
        {
            return Err(wrong_type(dst, "list", other));
        }

        let element = match self.data.get_mut(src) {
            None => None,
            Some(Value::List(list)) => match from {
                End::Left => list.pop_front(),
                End::Right => list.pop_back(),
            },
            Some(other) => return Err(wrong_type(src, "list", other)),
        };
        let Some(element) = element else {
            return Ok(None);
        };

        let target = self.list_mut(dst)?;
        match to {
            End::Left => target.push_front(element.clone()),
            End::Right => target.push_back(element.clone()),
        }
        self.prune(src);

        Ok(Some(element))
    }

    fn sorted(&self, key: &str) -> Result<Vec<(i64, String)>> {
        let mut members: Vec<(i64, String)> = self
            .zset(key)?
            .map(|z| z.iter().map(|(m, s)| (*s, m.clone())).collect())
            .unwrap_or_default();
        members.sort();
        Ok(members)
    }

    fn guard_holds(&self, guard: &Guard) -> Result<bool> {
        match guard {
            Guard::ZMember { key, member } => {
                Ok(self.zset(key)?.is_some_and(|z| z.contains_key(member)))
            },
            Guard::LMember { key, member } => {
                Ok(self.list(key)?.is_some_and(|l| l.contains(member)))
            },
        }
    }

    fn apply(&mut self, op: Op) -> Result<()> {
        match op {
            Op::Set { key, value } => {
                self.data.insert(key, Value::Str(value));
            },
            Op::Del { keys } => {
                for key in keys {
                    self.data.remove(&key);
                }
            },
            Op::HSet { key, fields } => {
                self.hash_mut(&key)?.extend(fields);
            },
            Op::HSetNx { key, field, value } => {
                self.hash_mut(&key)?.entry(field).or_insert(value);
            },
            Op::HDel { key, fields } => {
                if self.hash(&key)?.is_some() {
                    let hash = self.hash_mut(&key)?;
                    for field in &fields {
                        hash.remove(field);
                    }
                    self.prune(&key);
                }
            },
            Op::HIncrBy { key, field, delta } => {
                self.hincrby(&key, &field, delta)?;
            },
            Op::RPush { key, value } => self.list_mut(&key)?.push_back(value),
            Op::LPush { key, value } => self.list_mut(&key)?.push_front(value),
            Op::LRem { key, value } => {
                if self.list(&key)?.is_some() {
                    self.list_mut(&key)?.retain(|v| *v != value);
                    self.prune(&key);
                }
            },
            Op::ZAdd { key, score, member } => {
                self.zset_mut(&key)?.insert(member, score);
            },
            Op::ZRem { key, member } => {
                if self.zset(&key)?.is_some() {
                    self.zset_mut(&key)?.remove(&member);
                    self.prune(&key);
                }
            },
            Op::SAdd { key, member } => {
                self.set_mut(&key)?.insert(member);
            },
            Op::SRem { key, member } => {
                if self.set(&key)?.is_some() {
                    self.set_mut(&key)?.remove(&member);
                    self.prune(&key);
                }
            },
        }
        Ok(())
    }
}

struct Inner {
    keyspace: Mutex<Keyspace>,
    /// Woken whenever a batch or move may have added list elements.
    pushed: Notify,
}

/// In-memory storage backend.
///
/// All data is lost when the process exits. Every operation runs under a
/// single mutex, which makes each call and each [`exec`](StoreBackend::exec)
/// batch atomic with respect to every other caller.
///
/// # Thread Safety
///
/// `MemoryBackend` is `Clone`; clones share the same keyspace, so they can
/// stand in for independent clients of one Redis server.
///
/// # Example
///
/// ```ignore
/// use relq::store::MemoryBackend;
///
/// let backend = MemoryBackend::new();
/// backend.incr("counter").await?;
/// ```
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self {
            inner: Arc::new(Inner {
                keyspace: Mutex::new(Keyspace::default()),
                pushed: Notify::new(),
            }),
        }
    }
}

impl MemoryBackend {
    /// Creates a new empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all keys currently present, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.keyspace.lock().data.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Returns the number of keys in the store.
    pub fn len(&self) -> usize {
        self.inner.keyspace.lock().data.len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every key (`FLUSHDB`).
    pub fn flush(&self) {
        self.inner.keyspace.lock().data.clear();
    }

    fn lmove_now(&self, src: &str, dst: &str, from: End, to: End) -> Result<Option<String>> {
        let moved = self.inner.keyspace.lock().lmove(src, dst, from, to)?;
        if moved.is_some() {
            self.inner.pushed.notify_waiters();
        }
        Ok(moved)
    }
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.inner.keyspace.lock().data.get(key) {
            None => Ok(None),
            Some(Value::Str(v)) => Ok(Some(v.clone())),
            Some(other) => Err(wrong_type(key, "string", other)),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.inner.keyspace.lock().data.contains_key(key))
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut keyspace = self.inner.keyspace.lock();
        let current = match keyspace.data.get(key) {
            None => 0,
            Some(Value::Str(v)) => std::str::from_utf8(v)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or_else(|| anyhow::anyhow!("value at '{key}' is not an integer"))?,
            Some(other) => return Err(wrong_type(key, "string", other)),
        };
        let Some(next) = current.checked_add(1) else {
            bail!("increment of '{key}' would overflow");
        };
        keyspace
            .data
            .insert(key.to_string(), Value::Str(next.to_string().into_bytes()));
        Ok(next)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let keyspace = self.inner.keyspace.lock();
        Ok(keyspace.hash(key)?.and_then(|h| h.get(field).cloned()))
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let keyspace = self.inner.keyspace.lock();
        Ok(keyspace.hash(key)?.cloned().unwrap_or_default())
    }

    async fn hincrby(&self, key: &str, field: &str, delta: i64) -> Result<i64> {
        self.inner.keyspace.lock().hincrby(key, field, delta)
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        let keyspace = self.inner.keyspace.lock();
        let Some(list) = keyspace.list(key)? else {
            return Ok(Vec::new());
        };
        Ok(normalize_range(start, stop, list.len())
            .map(|(s, e)| list.range(s..=e).cloned().collect())
            .unwrap_or_default())
    }

    async fn lindex(&self, key: &str, index: i64) -> Result<Option<String>> {
        let keyspace = self.inner.keyspace.lock();
        Ok(keyspace.list(key)?.and_then(|list| {
            normalize_index(index, list.len()).and_then(|i| list.get(i).cloned())
        }))
    }

    async fn llen(&self, key: &str) -> Result<usize> {
        let keyspace = self.inner.keyspace.lock();
        Ok(keyspace.list(key)?.map_or(0, VecDeque::len))
    }

    async fn lmove(&self, src: &str, dst: &str, from: End, to: End) -> Result<Option<String>> {
        self.lmove_now(src, dst, from, to)
    }

    async fn blmove(
        &self,
        src: &str,
        dst: &str,
        from: End,
        to: End,
        timeout: Option<Duration>,
    ) -> Result<Option<String>> {
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            // Register interest before checking, so a push between the check
            // and the wait is not missed
            let notified = self.inner.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(element) = self.lmove_now(src, dst, from, to)? {
                return Ok(Some(element));
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Ok(None);
                    }
                },
                None => notified.await,
            }
        }
    }

    async fn zrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        let members = self.inner.keyspace.lock().sorted(key)?;
        Ok(normalize_range(start, stop, members.len())
            .map(|(s, e)| members[s..=e].iter().map(|(_, m)| m.clone()).collect())
            .unwrap_or_default())
    }

    async fn zrangebyscore(
        &self,
        key: &str,
        min: i64,
        max: i64,
        limit: Option<(usize, usize)>,
    ) -> Result<Vec<String>> {
        let members = self.inner.keyspace.lock().sorted(key)?;
        let (offset, count) = limit.unwrap_or((0, usize::MAX));
        Ok(members
            .into_iter()
            .filter(|(score, _)| (min..=max).contains(score))
            .skip(offset)
            .take(count)
            .map(|(_, m)| m)
            .collect())
    }

    async fn zcard(&self, key: &str) -> Result<usize> {
        let keyspace = self.inner.keyspace.lock();
        Ok(keyspace.zset(key)?.map_or(0, HashMap::len))
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let keyspace = self.inner.keyspace.lock();
        Ok(keyspace
            .set(key)?
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        let keyspace = self.inner.keyspace.lock();
        Ok(keyspace.set(key)?.is_some_and(|s| s.contains(member)))
    }

    async fn exec(&self, ops: Vec<Op>) -> Result<()> {
        {
            let mut keyspace = self.inner.keyspace.lock();
            for op in ops {
                keyspace.apply(op)?;
            }
        }
        self.inner.pushed.notify_waiters();
        Ok(())
    }

    async fn exec_if(&self, guard: Guard, ops: Vec<Op>) -> Result<bool> {
        {
            let mut keyspace = self.inner.keyspace.lock();
            if !keyspace.guard_holds(&guard)? {
                return Ok(false);
            }
            for op in ops {
                keyspace.apply(op)?;
            }
        }
        self.inner.pushed.notify_waiters();
        Ok(true)
    }
}
