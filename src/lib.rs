//! Reliable at-least-once message queues on top of Redis.
//!
//! A [`Queue`] keeps every message in exactly one of four containers:
//! pending, processing, scheduled or dead. Consumers move a message from
//! pending to processing atomically, so a consumer that crashes while
//! handling it leaves it behind in processing where
//! [`Queue::refill`] can pick it up again. Failed messages are retried
//! according to a [`RetryStrategy`] and end up dead once the retry budget
//! is spent.
//!
//! ```
//! use relq::{Queue, QueueOptions, store::Store};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> relq::Result<()> {
//! let queue = Queue::open(Store::memory(), "emails", QueueOptions::default()).await?;
//!
//! queue.push("hello").await?;
//! let data = queue.pop().await?;
//! assert_eq!(data, "hello");
//! # Ok(())
//! # }
//! ```
//!
//! The `relq` binary inspects and administers queues from the command
//! line; see [`commands`].

pub mod clock;
pub mod commands;
pub mod config;
pub mod error;
pub mod hooks;
pub mod queue;
pub mod reliability;
pub mod store;

pub use error::{Error, HandlerError, Result};
pub use queue::{Queue, QueueOptions, RetryStrategy, Status};
