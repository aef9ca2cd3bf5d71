//! Process-wide `tracing` subscriber setup.
//!
//! Logs go to stderr so they never interleave with streamed assistant text on
//! stdout.

use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::EnvFilter;

use crate::config::{env_flag, env_string_opt};

pub const LOG_LEVEL_ENV_VAR: &str = "CHAT_LOG_LEVEL";
pub const LOG_JSON_ENV_VAR: &str = "CHAT_LOG_JSON";

const DEFAULT_FILTER: &str = "warn";

static INIT: OnceCell<()> = OnceCell::new();

fn resolve_env_filter() -> EnvFilter {
    if let Some(filter) =
        env_string_opt(LOG_LEVEL_ENV_VAR).and_then(|level| EnvFilter::try_new(level).ok())
    {
        return filter;
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the subscriber once per process. Later calls are no-ops.
///
/// Environment variables:
/// - `CHAT_LOG_LEVEL`: level or filter directive (`info`, `completion_api=debug`).
/// - `RUST_LOG`: used when `CHAT_LOG_LEVEL` is unset or invalid.
/// - `CHAT_LOG_JSON=1`: one JSON object per line instead of the compact format.
pub fn init_logging() {
    INIT.get_or_init(|| {
        let env_filter = resolve_env_filter();
        if env_flag(LOG_JSON_ENV_VAR) {
            let json_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_target(true)
                .with_writer(std::io::stderr);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(json_layer)
                .try_init();
        } else {
            let console_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .try_init();
        }
    });
}
