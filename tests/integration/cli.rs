//! Administration commands against a populated queue.

use crate::common::{TestQueue, fail};
use clap::Parser;
use relq::commands::{self, Cli, Context};
use std::time::Duration;

async fn run(ctx: &Context, line: &str) -> anyhow::Result<String> {
    let cli = Cli::try_parse_from(line.split_whitespace())?;
    let mut out = Vec::new();
    commands::execute(&cli.command, ctx, &mut out).await?;
    Ok(String::from_utf8(out)?)
}

#[tokio::test]
async fn operator_session() -> anyhow::Result<()> {
    let env = TestQueue::new().with_options(|o| o.with_retry_delay(Duration::from_secs(60)));
    let queue = env.open("orders").await?;
    let ctx = Context::new(env.store.clone(), env.options.clone());

    queue.push_many(["a", "b", "c", "d"]).await?;
    fail(&queue, "timeout").await?;

    assert_eq!(
        run(&ctx, "relq status").await?,
        "orders: 3 pending, 0 processing, 1 scheduled, 0 dead\n"
    );
    assert_eq!(
        run(&ctx, "relq show -q orders --scheduled -d").await?,
        "a\n"
    );

    // Promoted messages go to the head of pending
    env.clock.advance(Duration::from_secs(60));
    assert_eq!(
        run(&ctx, "relq schedule -q orders").await?,
        "Scheduled 1 failed message for a retry in queue orders\n"
    );

    assert_eq!(
        run(&ctx, "relq kill -q orders --head 2").await?,
        "Killed 2 pending messages in queue orders\n"
    );
    assert_eq!(
        run(&ctx, "relq show -q orders --dead -d").await?,
        "a\nb\n"
    );
    assert_eq!(
        run(&ctx, "relq revive -q orders").await?,
        "Revived 2 messages in queue orders\n"
    );
    assert_eq!(
        run(&ctx, "relq show -q orders -d").await?,
        "a\nb\nc\nd\n"
    );

    assert_eq!(
        run(&ctx, "relq clear -q orders").await?,
        "Cleared 4 entries from queue orders\n"
    );
    assert_eq!(run(&ctx, "relq status -q orders").await?, "orders: empty\n");
    Ok(())
}
