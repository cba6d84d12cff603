use super::*;
use crate::clock::MockClock;
use crate::error::HandlerError;
use crate::queue::Status;
use clap::Parser;

const T0: i64 = 1_700_000_000;

fn context() -> Context {
    let options = QueueOptions::default()
        .with_prefix(Some("test"))
        .with_clock(MockClock::new(T0));
    Context::new(Store::memory(), options)
}

async fn open(ctx: &Context, name: &str) -> Result<Queue> {
    Ok(Queue::open(ctx.store.clone(), name, ctx.options.clone()).await?)
}

/// Parses and runs a command line, returning its output.
async fn run(ctx: &Context, args: &[&str]) -> Result<String> {
    let cli = Cli::try_parse_from(std::iter::once("relq").chain(args.iter().copied()))?;
    let mut out = Vec::new();
    execute(&cli.command, ctx, &mut out).await?;
    Ok(String::from_utf8(out)?)
}

async fn fail(queue: &Queue) -> Result<()> {
    queue
        .pop_with(|_| async { Err(HandlerError::failed("boom")) })
        .await?;
    Ok(())
}

#[tokio::test]
async fn test_version() -> Result<()> {
    let out = run(&context(), &["version"]).await?;
    assert_eq!(out, format!("relq {}\n", env!("CARGO_PKG_VERSION")));
    Ok(())
}

#[tokio::test]
async fn test_list_and_status() -> Result<()> {
    let ctx = context();
    let err = run(&ctx, &["status"]).await.unwrap_err();
    assert_eq!(err.to_string(), "No queues registered");

    let jobs = open(&ctx, "jobs").await?;
    open(&ctx, "emails").await?;
    jobs.push_many(["a", "b", "c"]).await?;

    assert_eq!(run(&ctx, &["list"]).await?, "emails\njobs\n");
    assert_eq!(
        run(&ctx, &["status"]).await?,
        "emails: empty\njobs  : 3 pending, 0 processing, 0 scheduled, 0 dead\n"
    );
    assert_eq!(
        run(&ctx, &["status", "-q", "jobs"]).await?,
        "jobs: 3 pending, 0 processing, 0 scheduled, 0 dead\n"
    );
    Ok(())
}

#[tokio::test]
async fn test_unknown_queue() -> Result<()> {
    let ctx = context();
    open(&ctx, "jobs").await?;

    let err = run(&ctx, &["show", "-q", "nope"]).await.unwrap_err();
    assert_eq!(err.to_string(), "No queue registered with this name: nope");
    Ok(())
}

#[tokio::test]
async fn test_stats() -> Result<()> {
    let ctx = context();
    let queue = open(&ctx, "jobs").await?;
    queue.push("a").await?;
    queue.pop().await?;

    assert_eq!(
        run(&ctx, &["stats"]).await?,
        "jobs: 1 processed, 0 failed, 0 retried \
         (created: 2023-11-14T22:13:20+00:00, updated: 2023-11-14T22:13:20+00:00)\n"
    );

    let out = run(&ctx, &["stats", "--json"]).await?;
    let value: serde_json::Value = serde_json::from_str(out.trim())?;
    assert_eq!(value["queue"], "jobs");
    assert_eq!(value["processed"], 1);
    assert_eq!(value["version"], crate::queue::PROTOCOL);
    Ok(())
}

#[tokio::test]
async fn test_show_selections() -> Result<()> {
    let ctx = context();
    let queue = open(&ctx, "jobs").await?;
    queue.push_many(["a", "bb", "ccc", "dddd"]).await?;

    assert_eq!(
        run(&ctx, &["show", "-q", "jobs", "--head", "2"]).await?,
        "id = 1 data = 1 bytes\nid = 2 data = 2 bytes\n"
    );
    assert_eq!(
        run(&ctx, &["show", "-q", "jobs", "--tail", "1", "--data"]).await?,
        "dddd\n"
    );
    assert_eq!(
        run(&ctx, &["show", "-q", "jobs", "--range", "1", "2", "-d"]).await?,
        "bb\nccc\n"
    );
    assert_eq!(
        run(&ctx, &["show", "-q", "jobs", "--index", "-1", "--index", "0", "-d"]).await?,
        "dddd\na\n"
    );
    assert_eq!(
        run(&ctx, &["show", "-q", "jobs", "--id", "3", "-d"]).await?,
        "ccc\n"
    );
    assert_eq!(run(&ctx, &["show", "-q", "jobs"]).await?.lines().count(), 4);
    Ok(())
}

#[tokio::test]
async fn test_show_meta() -> Result<()> {
    let ctx = context();
    let queue = open(&ctx, "jobs").await?;
    queue.push("abc").await?;
    fail(&queue).await?;

    let out = run(&ctx, &["show", "-q", "jobs", "--meta"]).await?;
    assert_eq!(
        out,
        "id = 1 retries = 1 retried_at = 2023-11-14 22:13:20 +0000 retry_error = boom \
         created_at = 2023-11-14 22:13:20 +0000 updated_at = 2023-11-14 22:13:20 +0000 \
         data = 3 bytes\n"
    );
    Ok(())
}

#[tokio::test]
async fn test_show_rejects_conflicts() -> Result<()> {
    let ctx = context();
    let queue = open(&ctx, "jobs").await?;
    queue.push("a").await?;

    let cases: [(&[&str], &str); 5] = [
        (
            &["show", "-q", "jobs", "--pending", "--dead"],
            "--pending, --processing, --scheduled, and --dead are mutually exclusive",
        ),
        (
            &["show", "-q", "jobs", "-m", "-d"],
            "--meta and --data are mutually exclusive",
        ),
        (
            &["show", "-q", "jobs", "--head", "1", "--tail", "1"],
            "--head, --tail, --index, and --range are mutually exclusive",
        ),
        (
            &["show", "-q", "jobs", "--range", "1"],
            "--range must be specified as two integers",
        ),
        (
            &["show", "-q", "jobs", "--id", "1", "--head", "1"],
            "--id is mutually exclusive with --head, --tail, --index, and --range",
        ),
    ];

    for (args, expected) in cases {
        let err = run(&ctx, args).await.unwrap_err();
        assert_eq!(err.to_string(), expected, "{args:?}");
    }
    Ok(())
}

#[tokio::test]
async fn test_show_missing_messages() -> Result<()> {
    let ctx = context();
    let queue = open(&ctx, "jobs").await?;
    queue.push("a").await?;

    let err = run(&ctx, &["show", "-q", "jobs", "--index", "5"]).await.unwrap_err();
    assert_eq!(err.to_string(), "No message at index 5");

    let err = run(&ctx, &["show", "-q", "jobs", "--id", "42"]).await.unwrap_err();
    assert_eq!(err.to_string(), "No message with ID 42");
    Ok(())
}

#[tokio::test]
async fn test_delete() -> Result<()> {
    let ctx = context();
    let queue = open(&ctx, "jobs").await?;
    let ids = queue.push_many(["a", "b", "c"]).await?;

    assert_eq!(
        run(&ctx, &["delete", "-q", "jobs", "--head", "2"]).await?,
        "Deleted 2 pending messages from queue jobs\n"
    );
    assert!(!queue.message(ids[0]).exists().await?);
    assert_eq!(queue.pending().ids().await?, vec![ids[2]]);

    assert_eq!(
        run(&ctx, &["delete", "-q", "jobs"]).await?,
        "Deleted 1 pending message from queue jobs\n"
    );
    assert!(queue.is_empty().await?);
    Ok(())
}

#[tokio::test]
async fn test_kill() -> Result<()> {
    let ctx = context();
    let queue = open(&ctx, "jobs").await?;
    let ids = queue.push_many(["a", "b"]).await?;

    assert_eq!(
        run(&ctx, &["kill", "-q", "jobs", "--id", &ids[1].to_string()]).await?,
        "Killed 1 pending message in queue jobs\n"
    );
    assert_eq!(queue.dead().ids().await?, vec![ids[1]]);
    assert_eq!(queue.message(ids[1]).status().await?, Status::Dead);

    let err = run(&ctx, &["kill", "-q", "jobs", "--dead"]).await.unwrap_err();
    assert!(err.to_string().starts_with("--dead cannot be combined with kill"));
    Ok(())
}

#[tokio::test]
async fn test_clear() -> Result<()> {
    let ctx = context();
    let queue = open(&ctx, "jobs").await?;
    let ids = queue.push_many(["a", "b", "c"]).await?;
    queue.message(ids[0]).kill().await?;

    assert_eq!(
        run(&ctx, &["clear", "-q", "jobs", "--dead"]).await?,
        "Cleared 1 dead entry from queue jobs\n"
    );
    assert_eq!(
        run(&ctx, &["clear", "-q", "jobs"]).await?,
        "Cleared 2 entries from queue jobs\n"
    );
    assert!(queue.is_empty().await?);
    Ok(())
}

#[tokio::test]
async fn test_refill_revive_schedule() -> Result<()> {
    let ctx = context();
    let queue = Queue::open(
        ctx.store.clone(),
        "jobs",
        ctx.options
            .clone()
            .with_max_retries(1)
            .with_retry_delay(std::time::Duration::from_secs(0)),
    )
    .await?;
    queue.push_many(["a", "b"]).await?;

    // One failure exhausts the budget
    fail(&queue).await?;
    assert_eq!(
        run(&ctx, &["revive", "-q", "jobs"]).await?,
        "Revived 1 message in queue jobs\n"
    );

    // Simulate a consumer that crashed mid-handling
    ctx.store
        .lmove(
            queue.pending().key(),
            queue.processing().key(),
            crate::store::End::Left,
            crate::store::End::Right,
        )
        .await?;
    assert_eq!(
        run(&ctx, &["refill", "-q", "jobs"]).await?,
        "Refilled 1 message in queue jobs\n"
    );
    assert_eq!(queue.size().await?, 2);

    assert_eq!(
        run(&ctx, &["schedule", "-q", "jobs"]).await?,
        "Scheduled 0 failed messages for a retry in queue jobs\n"
    );
    Ok(())
}
