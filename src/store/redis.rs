//! Redis-backed storage backend.
//!
//! Regular commands share one auto-reconnecting multiplexed connection.
//! Blocking moves run on dedicated connections from a bounded pool so a
//! consumer waiting on an empty queue never stalls other callers.

use super::DEFAULT_BLOCKING_POOL_SIZE;
use super::backend::{End, Guard, Op, StoreBackend};
use crate::reliability::retry::{Backoff, with_backoff};
use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::{Client, Cmd, Script};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;

/// Applies the encoded batch only if `ARGV[2]` is a member of `KEYS[1]`.
/// `ARGV[1]` selects the container type: `z` (sorted set) or `l` (list).
///
/// Each command is encoded as its word count followed by its words.
const GUARDED_EXEC: &str = r"
local found
if ARGV[1] == 'z' then
  found = redis.call('ZSCORE', KEYS[1], ARGV[2])
else
  found = redis.call('LPOS', KEYS[1], ARGV[2])
end
if not found then
  return 0
end
local i = 3
while i <= #ARGV do
  local n = tonumber(ARGV[i])
  redis.call(unpack(ARGV, i + 1, i + n))
  i = i + n + 1
end
return 1
";

/// Encodes a write as command words. Returns `None` for no-op writes
/// (Redis rejects variadic commands without arguments).
fn words(op: &Op) -> Option<Vec<Vec<u8>>> {
    fn w(s: impl AsRef<[u8]>) -> Vec<u8> {
        s.as_ref().to_vec()
    }

    let words = match op {
        Op::Set { key, value } => vec![w("SET"), w(key), value.clone()],
        Op::Del { keys } => {
            if keys.is_empty() {
                return None;
            }
            std::iter::once(w("DEL")).chain(keys.iter().map(w)).collect()
        },
        Op::HSet { key, fields } => {
            if fields.is_empty() {
                return None;
            }
            let mut words = vec![w("HSET"), w(key)];
            for (field, value) in fields {
                words.push(w(field));
                words.push(w(value));
            }
            words
        },
        Op::HSetNx { key, field, value } => vec![w("HSETNX"), w(key), w(field), w(value)],
        Op::HDel { key, fields } => {
            if fields.is_empty() {
                return None;
            }
            [w("HDEL"), w(key)]
                .into_iter()
                .chain(fields.iter().map(w))
                .collect()
        },
        Op::HIncrBy { key, field, delta } => {
            vec![w("HINCRBY"), w(key), w(field), w(delta.to_string())]
        },
        Op::RPush { key, value } => vec![w("RPUSH"), w(key), w(value)],
        Op::LPush { key, value } => vec![w("LPUSH"), w(key), w(value)],
        Op::LRem { key, value } => vec![w("LREM"), w(key), w("0"), w(value)],
        Op::ZAdd { key, score, member } => {
            vec![w("ZADD"), w(key), w(score.to_string()), w(member)]
        },
        Op::ZRem { key, member } => vec![w("ZREM"), w(key), w(member)],
        Op::SAdd { key, member } => vec![w("SADD"), w(key), w(member)],
        Op::SRem { key, member } => vec![w("SREM"), w(key), w(member)],
    };

    Some(words)
}

fn command(words: &[Vec<u8>]) -> Cmd {
    let mut cmd = Cmd::new();
    for word in words {
        cmd.arg(word.as_slice());
    }
    cmd
}

fn score_bound(score: i64) -> String {
    match score {
        i64::MIN => "-inf".to_string(),
        i64::MAX => "+inf".to_string(),
        s => s.to_string(),
    }
}

/// Dedicated connections for blocking commands.
///
/// At most `size` connections exist at once; callers beyond that wait for
/// a permit. Idle connections are reused.
struct BlockingPool {
    client: Client,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<MultiplexedConnection>>,
}

impl BlockingPool {
    fn new(client: Client, size: usize) -> Self {
        Self {
            client,
            permits: Arc::new(Semaphore::new(size.max(1))),
            idle: Mutex::new(Vec::new()),
        }
    }

    /// Runs `cmd` on a pooled connection.
    ///
    /// The connection goes back to the pool only when the reply arrived.
    /// A cancelled or failed call drops it, since the server may still be
    /// blocked on its behalf.
    async fn query<T: redis::FromRedisValue>(&self, cmd: &Cmd) -> Result<T> {
        let _permit = self
            .permits
            .acquire()
            .await
            .context("Blocking connection pool closed")?;

        let pooled = self.idle.lock().pop();
        let mut con = match pooled {
            Some(con) => con,
            None => {
                debug!("Opening blocking Redis connection");
                self.client
                    .get_multiplexed_async_connection()
                    .await
                    .context("Failed to open blocking Redis connection")?
            },
        };

        let value = cmd.query_async(&mut con).await?;
        self.idle.lock().push(con);
        Ok(value)
    }
}

/// Redis-backed storage backend.
///
/// # Thread Safety
///
/// `RedisBackend` is `Clone`; clones share the underlying connections.
#[derive(Clone)]
pub struct RedisBackend {
    manager: ConnectionManager,
    blocking: Arc<BlockingPool>,
}

impl RedisBackend {
    /// Connects to the Redis server at `url`, retrying transient failures
    /// with exponential backoff.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the server stays
    /// unreachable after all retries.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_pool(url, DEFAULT_BLOCKING_POOL_SIZE).await
    }

    /// Like [`connect`](Self::connect), allowing at most `blocking_pool_size`
    /// consumers to block on the server at once.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the server stays
    /// unreachable after all retries.
    pub async fn connect_with_pool(url: &str, blocking_pool_size: usize) -> Result<Self> {
        let client =
            Client::open(url).with_context(|| format!("Invalid Redis URL: {url}"))?;

        let manager = with_backoff(Backoff::connect(), "redis connect", || {
            let client = client.clone();
            async move {
                ConnectionManager::new(client)
                    .await
                    .context("Failed to connect to Redis")
            }
        })
        .await?;

        debug!(url = %url, blocking_pool_size, "Connected to Redis");

        Ok(Self {
            manager,
            blocking: Arc::new(BlockingPool::new(client, blocking_pool_size)),
        })
    }

    async fn query<T: redis::FromRedisValue>(&self, cmd: &Cmd) -> Result<T> {
        let mut con = self.manager.clone();
        let value = cmd.query_async(&mut con).await?;
        Ok(value)
    }
}

#[async_trait]
impl StoreBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.query(redis::cmd("GET").arg(key))
            .await
            .with_context(|| format!("Failed to read key '{key}'"))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let count: i64 = self.query(redis::cmd("EXISTS").arg(key)).await?;
        Ok(count > 0)
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        self.query(redis::cmd("INCR").arg(key))
            .await
            .with_context(|| format!("Failed to increment '{key}'"))
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        self.query(redis::cmd("HGET").arg(key).arg(field)).await
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        self.query(redis::cmd("HGETALL").arg(key))
            .await
            .with_context(|| format!("Failed to read hash '{key}'"))
    }

    async fn hincrby(&self, key: &str, field: &str, delta: i64) -> Result<i64> {
        self.query(redis::cmd("HINCRBY").arg(key).arg(field).arg(delta))
            .await
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        self.query(redis::cmd("LRANGE").arg(key).arg(start).arg(stop))
            .await
    }

    async fn lindex(&self, key: &str, index: i64) -> Result<Option<String>> {
        self.query(redis::cmd("LINDEX").arg(key).arg(index)).await
    }

    async fn llen(&self, key: &str) -> Result<usize> {
        self.query(redis::cmd("LLEN").arg(key)).await
    }

    async fn lmove(&self, src: &str, dst: &str, from: End, to: End) -> Result<Option<String>> {
        self.query(
            redis::cmd("LMOVE")
                .arg(src)
                .arg(dst)
                .arg(from.as_str())
                .arg(to.as_str()),
        )
        .await
    }

    async fn blmove(
        &self,
        src: &str,
        dst: &str,
        from: End,
        to: End,
        timeout: Option<Duration>,
    ) -> Result<Option<String>> {
        // Redis treats a zero timeout as "forever"
        if timeout.is_some_and(|t| t.is_zero()) {
            return self.lmove(src, dst, from, to).await;
        }

        let mut cmd = redis::cmd("BLMOVE");
        cmd.arg(src)
            .arg(dst)
            .arg(from.as_str())
            .arg(to.as_str())
            .arg(timeout.map_or(0.0, |t| t.as_secs_f64()));

        self.blocking
            .query(&cmd)
            .await
            .with_context(|| format!("Failed to move from '{src}' to '{dst}'"))
    }

    async fn zrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        self.query(redis::cmd("ZRANGE").arg(key).arg(start).arg(stop))
            .await
    }

    async fn zrangebyscore(
        &self,
        key: &str,
        min: i64,
        max: i64,
        limit: Option<(usize, usize)>,
    ) -> Result<Vec<String>> {
        let mut cmd = redis::cmd("ZRANGEBYSCORE");
        cmd.arg(key).arg(score_bound(min)).arg(score_bound(max));
        if let Some((offset, count)) = limit {
            cmd.arg("LIMIT").arg(offset).arg(count);
        }
        self.query(&cmd).await
    }

    async fn zcard(&self, key: &str) -> Result<usize> {
        self.query(redis::cmd("ZCARD").arg(key)).await
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        self.query(redis::cmd("SMEMBERS").arg(key)).await
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        let found: i64 = self
            .query(redis::cmd("SISMEMBER").arg(key).arg(member))
            .await?;
        Ok(found == 1)
    }

    async fn exec(&self, ops: Vec<Op>) -> Result<()> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        for words in ops.iter().filter_map(words) {
            pipe.add_command(command(&words)).ignore();
        }

        let mut con = self.manager.clone();
        let () = pipe
            .query_async(&mut con)
            .await
            .context("Failed to execute transaction")?;
        Ok(())
    }

    async fn exec_if(&self, guard: Guard, ops: Vec<Op>) -> Result<bool> {
        let (kind, key, member) = match guard {
            Guard::ZMember { key, member } => ("z", key, member),
            Guard::LMember { key, member } => ("l", key, member),
        };

        let script = Script::new(GUARDED_EXEC);
        let mut invocation = script.key(key);
        invocation.arg(kind).arg(member);
        for words in ops.iter().filter_map(words) {
            invocation.arg(words.len());
            for word in words {
                invocation.arg(word);
            }
        }

        let mut con = self.manager.clone();
        let applied: i64 = invocation
            .invoke_async(&mut con)
            .await
            .context("Failed to execute guarded transaction")?;
        Ok(applied == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encodes_commands() {
        assert_eq!(
            words(&Op::lrem("q", 7)).unwrap(),
            vec![b"LREM".to_vec(), b"q".to_vec(), b"0".to_vec(), b"7".to_vec()]
        );
        assert_eq!(
            words(&Op::hset("h", [("a", "1"), ("b", "2")])).unwrap().len(),
            6
        );
    }

    #[test]
    fn test_skips_empty_variadic_commands() {
        assert!(words(&Op::del(Vec::<String>::new())).is_none());
        assert!(words(&Op::hdel("h", Vec::<String>::new())).is_none());
    }

    #[test]
    fn test_score_bounds() {
        assert_eq!(score_bound(i64::MIN), "-inf");
        assert_eq!(score_bound(42), "42");
    }
}
