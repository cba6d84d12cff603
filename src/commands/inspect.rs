//! Read-only commands.
//!
//! - `relq version` - Display the version
//! - `relq list` - Display registered queues
//! - `relq status` - Container sizes per queue
//! - `relq stats` - Counters and timestamps per queue
//! - `relq show` - Display messages

use super::{Container, Context, ShowArgs};
use crate::queue::Message;
use anyhow::{Result, bail};
use chrono::{DateTime, SecondsFormat};
use std::io::Write;

/// Display version.
pub fn version(out: &mut impl Write) -> Result<()> {
    writeln!(out, "relq {}", env!("CARGO_PKG_VERSION"))?;
    Ok(())
}

/// Display all registered queues.
pub async fn list(ctx: &Context, out: &mut impl Write) -> Result<()> {
    for name in crate::queue::Queue::all(&ctx.store, ctx.prefix()).await? {
        writeln!(out, "{name}")?;
    }
    Ok(())
}

/// Display container sizes.
///
/// ```text
/// jobs  : 34 pending, 2 processing, 0 scheduled, 5 dead
/// emails: empty
/// ```
pub async fn status(ctx: &Context, queue: Option<&str>, out: &mut impl Write) -> Result<()> {
    let queues = ctx.queues(queue).await?;
    let width = queues.iter().map(|q| q.name().len()).max().unwrap_or(0);

    for queue in &queues {
        let pending = queue.pending().size().await?;
        let processing = queue.processing().size().await?;
        let scheduled = queue.scheduled().size().await?;
        let dead = queue.dead().size().await?;

        if pending + processing + scheduled + dead == 0 {
            writeln!(out, "{:width$}: empty", queue.name())?;
        } else {
            writeln!(
                out,
                "{:width$}: {pending} pending, {processing} processing, {scheduled} scheduled, {dead} dead",
                queue.name()
            )?;
        }
    }
    Ok(())
}

/// Display counters and timestamps.
pub async fn stats(
    ctx: &Context,
    queue: Option<&str>,
    json: bool,
    out: &mut impl Write,
) -> Result<()> {
    let queues = ctx.queues(queue).await?;
    let width = queues.iter().map(|q| q.name().len()).max().unwrap_or(0);

    for queue in &queues {
        let meta = queue.metadata().await?;
        if json {
            let mut value = serde_json::to_value(&meta)?;
            value["queue"] = serde_json::Value::from(queue.name());
            writeln!(out, "{value}")?;
            continue;
        }
        writeln!(
            out,
            "{:width$}: {} processed, {} failed, {} retried (created: {}, updated: {})",
            queue.name(),
            meta.processed,
            meta.failed,
            meta.retried,
            iso8601(meta.created_at),
            iso8601(meta.updated_at),
        )?;
    }
    Ok(())
}

/// Display messages, one per line.
///
/// ```text
/// id = 1 data = 8742 bytes
/// ```
pub async fn show(ctx: &Context, args: &ShowArgs, out: &mut impl Write) -> Result<()> {
    let select = &args.select;
    select.container.validate()?;
    if args.meta && args.data {
        bail!("--meta and --data are mutually exclusive");
    }
    select.selection.validate()?;

    let queue = ctx.queue(&select.queue.queue).await?;
    let container = Container::select(&queue, &select.container);
    let ids = container.ids(&queue, &select.selection).await?;

    for id in ids {
        let message = queue.message(id);
        if args.data {
            out.write_all(&message.data().await?)?;
            writeln!(out)?;
        } else if args.meta {
            writeln!(out, "{}", describe(&message).await?)?;
        } else {
            writeln!(out, "id = {id} data = {} bytes", message.size().await?)?;
        }
    }
    Ok(())
}

async fn describe(message: &Message) -> Result<String> {
    let meta = message.metadata().await?;
    Ok(format!(
        "id = {} retries = {} retried_at = {} retry_error = {} created_at = {} updated_at = {} data = {} bytes",
        message.id(),
        meta.retries,
        meta.retried_at.map_or_else(|| "N/A".to_string(), timestamp),
        meta.retry_error.as_deref().unwrap_or("N/A"),
        timestamp(meta.created_at),
        timestamp(meta.updated_at),
        message.size().await?,
    ))
}

/// `1970-01-01 00:00:00 +0000`
fn timestamp(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S %z").to_string())
        .unwrap_or_else(|| secs.to_string())
}

/// `1970-01-01T00:00:00+00:00`
fn iso8601(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, false))
        .unwrap_or_else(|| secs.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_formats() {
        assert_eq!(timestamp(0), "1970-01-01 00:00:00 +0000");
        assert_eq!(iso8601(1_700_000_000), "2023-11-14T22:13:20+00:00");
    }
}
