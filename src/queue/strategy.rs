//! Retry strategies applied to messages whose consumption failed.
//!
//! A strategy runs exactly once per failed consumption and always removes
//! the message id from processing in the same transaction that moves it
//! elsewhere.

use super::message::Message;
use super::metadata::{self, Status};
use crate::error::Result;
use crate::store::Op;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

/// Policy applied to a failed message.
#[async_trait]
pub trait Strategy: Send + Sync + 'static {
    /// Moves a failed message out of processing, recording `error`.
    ///
    /// Returns the status the message ended up in.
    async fn retry(&self, message: &Message, error: &str) -> Result<Status>;
}

/// Selects the strategy a queue is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryStrategy {
    /// Failed messages are killed immediately.
    None,
    /// Failed messages are requeued until `max_retries` is reached.
    #[default]
    Linear,
}

impl RetryStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Linear => "linear",
        }
    }

    /// Instantiates the strategy.
    pub fn build(self, max_retries: i64, retry_delay: Duration) -> Box<dyn Strategy> {
        match self {
            Self::None => Box::new(NoRetry),
            Self::Linear => Box::new(LinearRetry {
                max_retries,
                retry_delay,
            }),
        }
    }
}

impl fmt::Display for RetryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetryStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "linear" => Ok(Self::Linear),
            other => Err(format!(
                "unknown retry strategy '{other}' (expected 'none' or 'linear')"
            )),
        }
    }
}

fn failure_op(message: &Message, error: &str, now: i64) -> Op {
    Op::hset(
        message.metadata_key(),
        [
            (metadata::RETRIED_AT, now.to_string()),
            (metadata::RETRY_ERROR, error.to_string()),
        ],
    )
}

/// Kills failed messages without retrying.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

#[async_trait]
impl Strategy for NoRetry {
    async fn retry(&self, message: &Message, error: &str) -> Result<Status> {
        let now = message.now();

        let mut ops = vec![failure_op(message, error, now)];
        ops.extend(message.kill_ops(now));
        message.store().exec(ops).await?;

        warn!(queue = message.queue(), id = message.id(), error, "Message killed");
        Ok(Status::Dead)
    }
}

/// Requeues failed messages a fixed number of times, optionally after a
/// constant delay.
///
/// With a zero delay the id goes back to the tail of pending. Otherwise it
/// is scheduled `retry_delay` from now and waits for
/// [`Queue::schedule`](super::Queue::schedule). A message that fails
/// `max_retries` times is killed; `-1` retries forever.
#[derive(Debug, Clone, Copy)]
pub struct LinearRetry {
    pub max_retries: i64,
    pub retry_delay: Duration,
}

impl LinearRetry {
    fn exhausted(&self, retries: i64) -> bool {
        self.max_retries != -1 && retries >= self.max_retries
    }
}

#[async_trait]
impl Strategy for LinearRetry {
    async fn retry(&self, message: &Message, error: &str) -> Result<Status> {
        let keys = message.keys();
        let id = message.id();
        let now = message.now();

        let retries = message
            .store()
            .hincrby(&message.metadata_key(), metadata::RETRIES, 1)
            .await?;

        let mut ops = vec![failure_op(message, error, now)];
        let status = if self.exhausted(retries) {
            ops.extend(message.kill_ops(now));
            Status::Dead
        } else if self.retry_delay.is_zero() {
            ops.push(Op::lrem(&keys.processing, id));
            ops.push(Op::rpush(&keys.pending, id));
            ops.push(message.status_op(Status::Pending, now));
            Status::Pending
        } else {
            let due = now.saturating_add_unsigned(self.retry_delay.as_secs());
            ops.push(Op::lrem(&keys.processing, id));
            ops.push(Op::zadd(&keys.scheduled, due, id));
            ops.push(message.status_op(Status::Scheduled, now));
            Status::Scheduled
        };
        message.store().exec(ops).await?;

        match status {
            Status::Dead => warn!(
                queue = message.queue(),
                id,
                retries,
                error,
                "Message killed after exhausting retries"
            ),
            _ => debug!(queue = message.queue(), id, retries, %status, "Message retried"),
        }
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strategy() {
        assert_eq!("none".parse::<RetryStrategy>().unwrap(), RetryStrategy::None);
        assert_eq!(
            "Linear".parse::<RetryStrategy>().unwrap(),
            RetryStrategy::Linear
        );
        assert!("exponential".parse::<RetryStrategy>().is_err());
        assert_eq!(RetryStrategy::default(), RetryStrategy::Linear);
    }

    #[test]
    fn test_linear_budget() {
        let bounded = LinearRetry {
            max_retries: 3,
            retry_delay: Duration::ZERO,
        };
        assert!(!bounded.exhausted(2));
        assert!(bounded.exhausted(3));

        let unlimited = LinearRetry {
            max_retries: -1,
            retry_delay: Duration::ZERO,
        };
        assert!(!unlimited.exhausted(i64::MAX));

        let never = LinearRetry {
            max_retries: 0,
            retry_delay: Duration::ZERO,
        };
        assert!(never.exhausted(1));
    }
}
