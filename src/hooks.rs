//! Lifecycle hooks invoked around queue operations.
//!
//! Callbacks are registered per [`Event`] and [`Phase`] when building
//! [`QueueOptions`](crate::queue::QueueOptions) and run synchronously, in
//! registration order, on the task performing the operation.
//!
//! # Example
//!
//! ```
//! use relq::hooks::{Event, Hooks};
//!
//! let hooks = Hooks::new()
//!     .before(Event::Push, |ctx| tracing::info!(queue = ctx.queue, "pushing"))
//!     .after(Event::Pop, |ctx| tracing::info!(queue = ctx.queue, ids = ?ctx.ids, "popped"));
//!
//! assert_eq!(hooks.len(), 2);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Queue operation a hook is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// Queue opened. Only has an [`Phase::After`] phase.
    Initialize,
    Push,
    Pop,
    Peek,
    Range,
    Clear,
    Delete,
    Refill,
    Revive,
    Schedule,
}

/// Whether a hook runs before or after the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Before,
    After,
}

/// Context handed to every hook.
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
    /// Queue name (without prefix).
    pub queue: &'a str,
    pub event: Event,
    pub phase: Phase,
    /// Message identifiers involved, when known at this phase.
    pub ids: &'a [u64],
}

/// A registered callback.
pub type HookFn = Arc<dyn Fn(&HookContext<'_>) + Send + Sync>;

/// Ordered hook registry.
#[derive(Clone, Default)]
pub struct Hooks {
    hooks: HashMap<(Event, Phase), Vec<HookFn>>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback to run before `event`.
    #[must_use]
    pub fn before<F>(mut self, event: Event, hook: F) -> Self
    where
        F: Fn(&HookContext<'_>) + Send + Sync + 'static,
    {
        self.register(event, Phase::Before, hook);
        self
    }

    /// Registers a callback to run after `event`.
    #[must_use]
    pub fn after<F>(mut self, event: Event, hook: F) -> Self
    where
        F: Fn(&HookContext<'_>) + Send + Sync + 'static,
    {
        self.register(event, Phase::After, hook);
        self
    }

    /// Registers a callback.
    ///
    /// Callbacks for the same event and phase run in registration order.
    pub fn register<F>(&mut self, event: Event, phase: Phase, hook: F)
    where
        F: Fn(&HookContext<'_>) + Send + Sync + 'static,
    {
        self.hooks
            .entry((event, phase))
            .or_default()
            .push(Arc::new(hook));
    }

    /// Runs every callback registered for `event` and `phase`.
    pub fn run(&self, queue: &str, event: Event, phase: Phase, ids: &[u64]) {
        let Some(hooks) = self.hooks.get(&(event, phase)) else {
            return;
        };

        let ctx = HookContext {
            queue,
            event,
            phase,
            ids,
        };
        for hook in hooks {
            hook(&ctx);
        }
    }

    /// Total number of registered callbacks.
    pub fn len(&self) -> usize {
        self.hooks.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks").field("len", &self.len()).finish()
    }
}
