//! CLI command implementations for relq.
//!
//! Each command inspects or administers queues stored in the backing
//! store:
//!
//! - [`inspect`] - `version`, `list`, `status`, `stats`, `show`
//! - [`manage`] - `delete`, `kill`, `clear`, `refill`, `revive`, `schedule`
//!
//! Commands write their report to any [`Write`] sink so they can run
//! against an in-memory store in tests.

pub mod inspect;
pub mod manage;

use crate::error::Error;
use crate::queue::{Queue, QueueOptions, SubQueue, SubSet};
use crate::store::Store;
use anyhow::{Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "relq", version)]
#[command(about = "Inspect and administer relq message queues")]
pub struct Cli {
    /// Path to the config file (default: ~/.relq/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Display version
    Version,
    /// Display all queues
    List,
    /// Display queue status
    Status {
        /// Queue name
        #[arg(short, long)]
        queue: Option<String>,
    },
    /// Display queue statistics
    Stats {
        /// Queue name
        #[arg(short, long)]
        queue: Option<String>,
        /// One JSON object per queue
        #[arg(long)]
        json: bool,
    },
    /// Display messages in a queue
    Show(ShowArgs),
    /// Delete messages in a queue
    Delete(SelectArgs),
    /// Kill messages in a queue
    Kill(SelectArgs),
    /// Clear all messages in a queue
    Clear(ClearArgs),
    /// Refill queue (move processing messages to pending)
    Refill(QueueArgs),
    /// Revive queue (move dead messages to pending)
    Revive(QueueArgs),
    /// Schedule failed messages for a retry
    Schedule(QueueArgs),
}

#[derive(Args, Debug, Clone)]
pub struct QueueArgs {
    /// Queue name
    #[arg(short, long)]
    pub queue: String,
}

/// Which container a command operates on. Defaults to pending.
#[derive(Args, Debug, Clone, Default)]
pub struct ContainerArgs {
    /// Only pending messages (default)
    #[arg(long)]
    pub pending: bool,
    /// Only processing messages
    #[arg(long)]
    pub processing: bool,
    /// Only scheduled messages
    #[arg(long)]
    pub scheduled: bool,
    /// Only dead messages
    #[arg(long)]
    pub dead: bool,
}

/// Which messages of the container a command operates on.
#[derive(Args, Debug, Clone, Default)]
pub struct SelectionArgs {
    /// N messages from the head
    #[arg(long, value_name = "N")]
    pub head: Option<i64>,
    /// N messages from the tail
    #[arg(long, value_name = "N")]
    pub tail: Option<i64>,
    /// Message at index N (repeatable)
    #[arg(long, value_name = "N", allow_negative_numbers = true)]
    pub index: Vec<i64>,
    /// Messages at index N to M
    #[arg(long, num_args = 1.., value_names = ["N", "M"], allow_negative_numbers = true)]
    pub range: Option<Vec<i64>>,
    /// Message with ID N (repeatable)
    #[arg(long, value_name = "N")]
    pub id: Vec<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct SelectArgs {
    #[command(flatten)]
    pub queue: QueueArgs,
    #[command(flatten)]
    pub container: ContainerArgs,
    #[command(flatten)]
    pub selection: SelectionArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ShowArgs {
    #[command(flatten)]
    pub select: SelectArgs,
    /// Display raw data
    #[arg(short, long)]
    pub data: bool,
    /// Display additional metadata
    #[arg(short, long)]
    pub meta: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ClearArgs {
    #[command(flatten)]
    pub queue: QueueArgs,
    #[command(flatten)]
    pub container: ContainerArgs,
}

/// Everything a command needs to reach the queues.
#[derive(Debug, Clone)]
pub struct Context {
    pub store: Store,
    pub options: QueueOptions,
}

impl Context {
    pub fn new(store: Store, options: QueueOptions) -> Self {
        Self { store, options }
    }

    fn prefix(&self) -> Option<&str> {
        self.options.prefix.as_deref()
    }

    /// Opens a registered queue.
    async fn queue(&self, name: &str) -> Result<Queue> {
        Queue::open_existing(self.store.clone(), name, self.options.clone())
            .await
            .map_err(|e| match e {
                Error::QueueNotFound { name } => {
                    anyhow!("No queue registered with this name: {name}")
                }
                other => other.into(),
            })
    }

    /// Opens the named queue, or every registered queue.
    async fn queues(&self, name: Option<&str>) -> Result<Vec<Queue>> {
        let names = Queue::all(&self.store, self.prefix()).await?;
        if names.is_empty() {
            bail!("No queues registered");
        }

        match name {
            Some(name) => Ok(vec![self.queue(name).await?]),
            None => {
                let mut queues = Vec::with_capacity(names.len());
                for name in &names {
                    queues.push(Queue::open(self.store.clone(), name, self.options.clone()).await?);
                }
                Ok(queues)
            }
        }
    }
}

/// Runs a command, writing its report to `out`.
///
/// # Errors
///
/// Returns validation and lookup failures with a message meant for the
/// operator, as well as store errors.
pub async fn execute(command: &Command, ctx: &Context, out: &mut impl Write) -> Result<()> {
    match command {
        Command::Version => inspect::version(out),
        Command::List => inspect::list(ctx, out).await,
        Command::Status { queue } => inspect::status(ctx, queue.as_deref(), out).await,
        Command::Stats { queue, json } => inspect::stats(ctx, queue.as_deref(), *json, out).await,
        Command::Show(args) => inspect::show(ctx, args, out).await,
        Command::Delete(args) => manage::delete(ctx, args, out).await,
        Command::Kill(args) => manage::kill(ctx, args, out).await,
        Command::Clear(args) => manage::clear(ctx, args, out).await,
        Command::Refill(args) => manage::refill(ctx, &args.queue, out).await,
        Command::Revive(args) => manage::revive(ctx, &args.queue, out).await,
        Command::Schedule(args) => manage::schedule(ctx, &args.queue, out).await,
    }
}

/// `"1 message"`, `"2 messages"`.
pub(crate) fn pluralize(count: usize, singular: &str, plural: &str) -> String {
    format!("{count} {}", if count == 1 { singular } else { plural })
}

/// A container selected on the command line.
pub(crate) enum Container<'a> {
    List(&'a SubQueue),
    Set(&'a SubSet),
}

impl<'a> Container<'a> {
    pub(crate) fn select(queue: &'a Queue, args: &ContainerArgs) -> Self {
        if args.processing {
            Container::List(queue.processing())
        } else if args.scheduled {
            Container::Set(queue.scheduled())
        } else if args.dead {
            Container::List(queue.dead())
        } else {
            Container::List(queue.pending())
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::List(list) => list.kind(),
            Self::Set(set) => set.kind(),
        }
    }

    async fn peek(&self, index: i64) -> crate::Result<Option<u64>> {
        match self {
            Self::List(list) => list.peek(index).await,
            Self::Set(set) => set.peek(index).await,
        }
    }

    async fn range(&self, start: i64, stop: i64) -> crate::Result<Vec<u64>> {
        match self {
            Self::List(list) => list.range(start, stop).await,
            Self::Set(set) => set.range(start, stop).await,
        }
    }

    /// Resolves a selection to message ids, checking that each exists.
    pub(crate) async fn ids(&self, queue: &Queue, selection: &SelectionArgs) -> Result<Vec<u64>> {
        let ids = if !selection.id.is_empty() {
            selection.id.clone()
        } else if !selection.index.is_empty() {
            let mut ids = Vec::with_capacity(selection.index.len());
            for &index in &selection.index {
                let id = self
                    .peek(index)
                    .await?
                    .ok_or_else(|| anyhow!("No message at index {index}"))?;
                ids.push(id);
            }
            ids
        } else {
            let (start, stop) = selection.bounds();
            self.range(start, stop).await?
        };

        for &id in &ids {
            if !queue.message(id).exists().await? {
                bail!("No message with ID {id}");
            }
        }
        Ok(ids)
    }
}

impl ContainerArgs {
    fn count(&self) -> usize {
        [self.pending, self.processing, self.scheduled, self.dead]
            .into_iter()
            .filter(|&flag| flag)
            .count()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.count() > 1 {
            bail!("--pending, --processing, --scheduled, and --dead are mutually exclusive");
        }
        Ok(())
    }
}

impl SelectionArgs {
    pub(crate) fn validate(&self) -> Result<()> {
        let positional = [
            self.head.is_some(),
            self.tail.is_some(),
            !self.index.is_empty(),
            self.range.is_some(),
        ]
        .into_iter()
        .filter(|&set| set)
        .count();

        if positional > 1 {
            bail!("--head, --tail, --index, and --range are mutually exclusive");
        }
        if self.range.as_ref().is_some_and(|range| range.len() != 2) {
            bail!("--range must be specified as two integers");
        }
        if !self.id.is_empty() && positional > 0 {
            bail!("--id is mutually exclusive with --head, --tail, --index, and --range");
        }
        Ok(())
    }

    /// Inclusive index bounds; everything when nothing is selected.
    fn bounds(&self) -> (i64, i64) {
        if let Some(tail) = self.tail {
            (-tail, -1)
        } else if let Some(range) = &self.range {
            (range[0], range[1])
        } else {
            (0, self.head.unwrap_or(0) - 1)
        }
    }
}

#[cfg(test)]
mod tests;
