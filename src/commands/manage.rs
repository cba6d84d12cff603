//! Commands that move or remove messages.

use super::{ClearArgs, Container, Context, SelectArgs, pluralize};
use anyhow::{Result, bail};
use std::io::Write;

/// Delete selected messages, including their data.
///
/// ```text
/// Deleted 10 pending messages from queue jobs
/// ```
pub async fn delete(ctx: &Context, args: &SelectArgs, out: &mut impl Write) -> Result<()> {
    args.container.validate()?;
    args.selection.validate()?;

    let queue = ctx.queue(&args.queue.queue).await?;
    let container = Container::select(&queue, &args.container);
    let ids = container.ids(&queue, &args.selection).await?;

    queue.delete_ids(&ids).await?;

    let kind = container.kind();
    writeln!(
        out,
        "Deleted {} from queue {}",
        pluralize(ids.len(), &format!("{kind} message"), &format!("{kind} messages")),
        queue.name()
    )?;
    Ok(())
}

/// Move selected messages to the dead container.
///
/// ```text
/// Killed 2 pending messages in queue jobs
/// ```
pub async fn kill(ctx: &Context, args: &SelectArgs, out: &mut impl Write) -> Result<()> {
    if args.container.dead {
        bail!("--dead cannot be combined with kill: messages are already dead");
    }
    args.container.validate()?;
    args.selection.validate()?;

    let queue = ctx.queue(&args.queue.queue).await?;
    let container = Container::select(&queue, &args.container);
    let ids = container.ids(&queue, &args.selection).await?;

    queue.kill_ids(&ids).await?;

    let kind = container.kind();
    writeln!(
        out,
        "Killed {} in queue {}",
        pluralize(ids.len(), &format!("{kind} message"), &format!("{kind} messages")),
        queue.name()
    )?;
    Ok(())
}

/// Clear one container, or the whole queue when none is selected.
///
/// ```text
/// Cleared 3 entries from queue jobs
/// Cleared 1 dead entry from queue jobs
/// ```
pub async fn clear(ctx: &Context, args: &ClearArgs, out: &mut impl Write) -> Result<()> {
    args.container.validate()?;

    let queue = ctx.queue(&args.queue.queue).await?;
    let c = &args.container;

    let (ids, label) = if c.pending || c.processing || c.scheduled || c.dead {
        let container = Container::select(&queue, c);
        let ids = match &container {
            Container::List(list) => list.clear().await?,
            Container::Set(set) => set.clear().await?,
        };
        (ids, format!("{} ", container.kind()))
    } else {
        (queue.clear().await?, String::new())
    };

    writeln!(
        out,
        "Cleared {} from queue {}",
        pluralize(ids.len(), &format!("{label}entry"), &format!("{label}entries")),
        queue.name()
    )?;
    Ok(())
}

/// Move processing messages back to pending.
pub async fn refill(ctx: &Context, queue: &str, out: &mut impl Write) -> Result<()> {
    let queue = ctx.queue(queue).await?;
    let ids = queue.refill().await?;

    writeln!(
        out,
        "Refilled {} in queue {}",
        pluralize(ids.len(), "message", "messages"),
        queue.name()
    )?;
    Ok(())
}

/// Move dead messages back to pending.
pub async fn revive(ctx: &Context, queue: &str, out: &mut impl Write) -> Result<()> {
    let queue = ctx.queue(queue).await?;
    let ids = queue.revive().await?;

    writeln!(
        out,
        "Revived {} in queue {}",
        pluralize(ids.len(), "message", "messages"),
        queue.name()
    )?;
    Ok(())
}

/// Promote due scheduled messages to pending.
pub async fn schedule(ctx: &Context, queue: &str, out: &mut impl Write) -> Result<()> {
    let queue = ctx.queue(queue).await?;
    let ids = queue.schedule().await?;

    writeln!(
        out,
        "Scheduled {} for a retry in queue {}",
        pluralize(ids.len(), "failed message", "failed messages"),
        queue.name()
    )?;
    Ok(())
}
