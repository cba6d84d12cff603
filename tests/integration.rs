//! Integration test runner for relq.
//!
//! Every test here runs against the in-memory backend. Tests that need a
//! live Redis server live in `redis_tests.rs` and are ignored by default.
//!
//! ```bash
//! cargo test --test integration
//! ```

mod common;

#[path = "integration/lifecycle.rs"]
mod lifecycle;

#[path = "integration/retry.rs"]
mod retry;

#[path = "integration/cli.rs"]
mod cli;
