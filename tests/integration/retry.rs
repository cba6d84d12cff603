//! Retry strategies driven end to end.

use crate::common::{TestQueue, fail};
use relq::config::Config;
use relq::queue::Status;
use relq::{Queue, RetryStrategy};
use std::time::Duration;

#[tokio::test]
async fn exhausted_message_dies_and_can_be_revived() -> anyhow::Result<()> {
    let env = TestQueue::new().with_options(|o| o.with_max_retries(2));
    let queue = env.open("jobs").await?;
    let id = queue.push("x").await?;

    fail(&queue, "one").await?;
    assert_eq!(queue.message(id).status().await?, Status::Pending);
    fail(&queue, "two").await?;
    assert_eq!(queue.message(id).status().await?, Status::Dead);
    assert_eq!(queue.dead().ids().await?, vec![id]);

    let stats = queue.metadata().await?;
    assert_eq!((stats.processed, stats.failed, stats.retried), (2, 2, 1));

    assert_eq!(queue.revive().await?, vec![id]);
    assert_eq!(queue.message(id).status().await?, Status::Pending);
    assert_eq!(queue.pop().await?, "x");
    Ok(())
}

#[tokio::test]
async fn delayed_retry_waits_for_the_clock() -> anyhow::Result<()> {
    let env = TestQueue::new().with_options(|o| o.with_retry_delay(Duration::from_secs(30)));
    let queue = env.open("jobs").await?;
    let id = queue.push("x").await?;

    fail(&queue, "later").await?;
    assert_eq!(queue.message(id).status().await?, Status::Scheduled);
    assert!(queue.schedule().await?.is_empty());

    env.clock.advance(Duration::from_secs(29));
    assert!(queue.schedule().await?.is_empty());

    env.clock.advance(Duration::from_secs(1));
    assert_eq!(queue.schedule().await?, vec![id]);
    assert_eq!(queue.message(id).status().await?, Status::Pending);
    assert!(queue.scheduled().is_empty().await?);
    Ok(())
}

#[tokio::test]
async fn no_retry_kills_on_first_failure() -> anyhow::Result<()> {
    let env = TestQueue::new().with_options(|o| o.with_retry_strategy(RetryStrategy::None));
    let queue = env.open("jobs").await?;
    let id = queue.push("x").await?;

    fail(&queue, "fatal").await?;
    assert_eq!(queue.message(id).status().await?, Status::Dead);
    assert!(queue.pending().is_empty().await?);
    Ok(())
}

#[tokio::test]
async fn options_from_config() -> anyhow::Result<()> {
    let config: Config = toml::from_str(
        r#"
        prefix = "cfg"
        retry_strategy = "linear"
        max_retries = 1
        retry_delay = 10
        "#,
    )?;
    assert!(!config.validate()?.has_warnings());

    let env = TestQueue::new();
    let options = config.queue_options().with_clock(env.clock.clone());
    let queue = Queue::open(env.store.clone(), "jobs", options).await?;
    assert_eq!(queue.id(), "cfg/jobs");

    let id = queue.push("x").await?;
    fail(&queue, "once").await?;
    assert_eq!(queue.message(id).status().await?, Status::Dead);
    Ok(())
}
