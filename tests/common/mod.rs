//! Shared helpers for relq integration tests.

#![allow(dead_code)]

use relq::clock::MockClock;
use relq::store::Store;
use relq::{HandlerError, Queue, QueueOptions};

/// 2023-11-14T22:13:20Z
pub const T0: i64 = 1_700_000_000;

/// A queue over a fresh in-memory store with a frozen clock.
pub struct TestQueue {
    pub store: Store,
    pub clock: MockClock,
    pub options: QueueOptions,
}

impl TestQueue {
    pub fn new() -> Self {
        let clock = MockClock::new(T0);
        let options = QueueOptions::default()
            .with_prefix(Some("it"))
            .with_clock(clock.clone());
        Self {
            store: Store::memory(),
            clock,
            options,
        }
    }

    pub fn with_options(mut self, f: impl FnOnce(QueueOptions) -> QueueOptions) -> Self {
        self.options = f(self.options);
        self
    }

    pub async fn open(&self, name: &str) -> relq::Result<Queue> {
        Queue::open(self.store.clone(), name, self.options.clone()).await
    }
}

/// Pops one message and reports a retryable failure for it.
pub async fn fail(queue: &Queue, reason: &str) -> relq::Result<()> {
    let reason = reason.to_string();
    queue
        .pop_with(|_| async move { Err(HandlerError::failed(reason)) })
        .await?;
    Ok(())
}
