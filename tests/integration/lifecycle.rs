//! Producer/consumer lifecycle across independent queue handles.

use crate::common::{TestQueue, fail};
use relq::queue::Status;
use relq::{Error, HandlerError, Queue};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;

#[tokio::test]
async fn producer_and_consumer_share_a_queue() -> anyhow::Result<()> {
    let env = TestQueue::new();
    let producer = env.open("emails").await?;
    let consumer = env.open("emails").await?;

    let id = producer.push("welcome").await?;
    assert_eq!(consumer.message(id).status().await?, Status::Pending);

    let data = consumer.pop().await?;
    assert_eq!(data, "welcome");
    assert!(producer.is_empty().await?);
    assert!(!producer.message(id).exists().await?);
    assert_eq!(producer.metadata().await?.processed, 1);
    Ok(())
}

#[tokio::test]
async fn crashed_consumer_is_recovered_by_refill() -> anyhow::Result<()> {
    let env = TestQueue::new();
    let queue = env.open("jobs").await?;
    let id = queue.push("payload").await?;

    // A handler error that is not a retryable failure leaves the message
    // where a crashed consumer would have left it
    let result = queue
        .pop_with(|_| async { Err(HandlerError::other(anyhow::anyhow!("segfault"))) })
        .await;
    assert!(matches!(result, Err(Error::Handler(_))));
    assert_eq!(queue.processing().ids().await?, vec![id]);
    assert_eq!(queue.message(id).status().await?, Status::Processing);

    assert_eq!(queue.refill().await?, vec![id]);
    assert_eq!(queue.message(id).status().await?, Status::Pending);
    assert_eq!(queue.pop().await?, "payload");
    Ok(())
}

#[tokio::test]
async fn incompatible_protocol_is_rejected() -> anyhow::Result<()> {
    let env = TestQueue::new();
    env.open("jobs").await?.push("x").await?;

    let newer = env.options.clone().with_protocol_version(relq::queue::PROTOCOL + 1);
    let err = Queue::open(env.store.clone(), "jobs", newer)
        .await
        .unwrap_err();
    match err {
        Error::VersionMismatch {
            expected, actual, ..
        } => {
            assert_eq!(expected, relq::queue::PROTOCOL + 1);
            assert_eq!(actual, relq::queue::PROTOCOL);
        }
        other => panic!("unexpected error: {other}"),
    }

    // Existing data is untouched
    assert_eq!(env.open("jobs").await?.size().await?, 1);
    Ok(())
}

#[tokio::test]
async fn deleted_queue_can_be_recreated() -> anyhow::Result<()> {
    let env = TestQueue::new();
    let queue = env.open("jobs").await?;
    let first = queue.push("a").await?;
    queue.delete().await?;

    assert!(!Queue::exists(&env.store, Some("it"), "jobs").await?);
    let err = Queue::open_existing(env.store.clone(), "jobs", env.options.clone())
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let queue = env.open("jobs").await?;
    let second = queue.push("b").await?;
    assert!(second > first);
    Ok(())
}

#[tokio::test]
async fn blocking_pop_wakes_on_push_from_another_handle() -> anyhow::Result<()> {
    let env = TestQueue::new();
    let consumer = env.open("jobs").await?;
    let producer = env.open("jobs").await?;

    let waiting = tokio::spawn(async move { consumer.pop_timeout(Some(Duration::from_secs(5))).await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    producer.push("late").await?;

    let data = waiting.await??;
    assert_eq!(data.as_deref(), Some(&b"late"[..]));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_message_is_delivered_once_under_contention() -> anyhow::Result<()> {
    let env = TestQueue::new();
    let producer = env.open("jobs").await?;
    producer
        .push_many((0..200).map(|i| format!("job-{i}")))
        .await?;

    let barrier = Arc::new(Barrier::new(6));
    let mut consumers = Vec::new();
    for _ in 0..6 {
        let queue = env.open("jobs").await?;
        let barrier = barrier.clone();
        consumers.push(tokio::spawn(async move {
            barrier.wait().await;
            let mut seen = Vec::new();
            while let Some(data) = queue.pop_timeout(Some(Duration::from_millis(100))).await? {
                seen.push(String::from_utf8(data.to_vec()).unwrap_or_default());
            }
            Ok::<_, Error>(seen)
        }));
    }

    let mut seen = Vec::new();
    for consumer in consumers {
        seen.extend(consumer.await??);
    }
    let unique: HashSet<_> = seen.iter().collect();

    assert_eq!(seen.len(), 200);
    assert_eq!(unique.len(), 200);
    assert!(producer.processing().is_empty().await?);
    assert_eq!(producer.metadata().await?.processed, 200);
    Ok(())
}

#[tokio::test]
async fn failed_message_returns_to_the_tail() -> anyhow::Result<()> {
    let env = TestQueue::new();
    let queue = env.open("jobs").await?;
    let ids = queue.push_many(["first", "second"]).await?;

    fail(&queue, "flaky").await?;
    assert_eq!(queue.pending().ids().await?, vec![ids[1], ids[0]]);

    let meta = queue.message(ids[0]).metadata().await?;
    assert_eq!(meta.retries, 1);
    assert_eq!(meta.retry_error.as_deref(), Some("flaky"));
    assert_eq!(meta.retried_at, Some(crate::common::T0));
    Ok(())
}
