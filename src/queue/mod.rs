//! Reliable message queue on a shared backing store.
//!
//! Each queue owns four containers of message identifiers:
//!
//! - **pending**: ready for consumption, FIFO
//! - **processing**: checked out by a consumer
//! - **scheduled**: waiting for a delayed retry, ordered by due time
//! - **dead**: out of retries, waiting for an operator
//!
//! A message id is in at most one container at any time, and its status
//! mirrors that container.
//!
//! # Examples
//!
//! ## Consuming with retries
//!
//! ```rust
//! use relq::queue::{Queue, QueueOptions, RetryStrategy};
//! use relq::store::Store;
//! use relq::HandlerError;
//!
//! # #[tokio::main]
//! # async fn main() -> relq::Result<()> {
//! let options = QueueOptions::default()
//!     .with_retry_strategy(RetryStrategy::Linear)
//!     .with_max_retries(1);
//! let queue = Queue::open(Store::memory(), "jobs", options).await?;
//!
//! let id = queue.push("work").await?;
//!
//! // A recognized failure hands the message to the retry strategy
//! let result = queue
//!     .pop_with(|_| async { Err(HandlerError::failed("not today")) })
//!     .await?;
//! assert!(result.is_none());
//!
//! // The failure used up the whole budget: the message is now dead
//! assert_eq!(queue.dead().ids().await?, vec![id]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Delayed retries
//!
//! ```rust
//! use relq::clock::MockClock;
//! use relq::queue::{Queue, QueueOptions};
//! use relq::store::Store;
//! use relq::HandlerError;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> relq::Result<()> {
//! let clock = MockClock::new(1_700_000_000);
//! let options = QueueOptions::default()
//!     .with_retry_delay(Duration::from_secs(60))
//!     .with_clock(clock.clone());
//! let queue = Queue::open(Store::memory(), "jobs", options).await?;
//!
//! queue.push("work").await?;
//! queue.pop_with(|_| async { Err(HandlerError::failed("later")) }).await?;
//! assert_eq!(queue.scheduled().size().await?, 1);
//!
//! clock.advance(Duration::from_secs(60));
//! assert_eq!(queue.schedule().await?.len(), 1);
//! assert_eq!(queue.size().await?, 1);
//! # Ok(())
//! # }
//! ```

mod keys;
mod message;
mod metadata;
mod service;
mod strategy;
mod subqueue;
mod subset;

// Re-export public API
pub use message::Message;
pub use metadata::{MessageMetadata, QueueMetadata, Status};
pub use service::{PROTOCOL, Queue, QueueOptions};
pub use strategy::{LinearRetry, NoRetry, RetryStrategy, Strategy};
pub use subqueue::SubQueue;
pub use subset::SubSet;
