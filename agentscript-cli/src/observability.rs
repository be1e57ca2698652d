//! Tracing initialization for the CLI front door.
//!
//! `AGENTSCRIPT_QUIET=1` drops everything below `warn`;
//! `AGENTSCRIPT_LOG_LEVEL` overrides the default filter string; both follow
//! the same env-var-gated shape as the teacher's `observability::init_tracing`,
//! trimmed to just the tracing setup this crate needs (no JSONL audit log —
//! that is an embedder concern this sandbox's library crates stay out of,
//! per spec §6's "No error printing or logging happens inside the core").

use std::env;

use tracing_subscriber::{prelude::*, EnvFilter};

pub fn init_tracing() {
    let level = if is_quiet() {
        "agentscript=warn".to_string()
    } else {
        env::var("AGENTSCRIPT_LOG_LEVEL").unwrap_or_else(|_| "agentscript=info".to_string())
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true).with_thread_ids(false))
        .try_init();
}

fn is_quiet() -> bool {
    env::var("AGENTSCRIPT_QUIET")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes"))
        .unwrap_or(false)
}
