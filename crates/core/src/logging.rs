//! Logging and diagnostics subscriber setup
//!
//! Installs a `tracing-subscriber` registry with:
//!
//! - an `EnvFilter` read from `EXTRUN_LOG`, then `RUST_LOG`, defaulting to `info`;
//! - a text or JSON `fmt` layer writing to stderr, so stdout stays free for
//!   command output;
//! - a [`tracing_error::ErrorLayer`], which lets diagnostic errors record the
//!   active spans alongside their backtrace.
//!
//! The format comes from the `format` argument, else `EXTRUN_LOG_FORMAT`,
//! else text. `EXTRUN_LOG_SPAN_EVENTS` (comma separated: `new`, `close`,
//! `enter`, `exit`, `active`, `full`, `none`) controls span lifecycle events.

use anyhow::Result;
use std::{io, sync::Once};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Filter specification variable
pub const ENV_LOG: &str = "EXTRUN_LOG";
/// Output format variable ("json" or "text")
pub const ENV_LOG_FORMAT: &str = "EXTRUN_LOG_FORMAT";
/// Span lifecycle event variable
pub const ENV_LOG_SPAN_EVENTS: &str = "EXTRUN_LOG_SPAN_EVENTS";

static INIT: Once = Once::new();

/// Initialize logging; later calls are no-ops
///
/// ```rust
/// extrun_core::logging::init(None).expect("Failed to initialize logging");
/// ```
pub fn init(format: Option<&str>) -> Result<()> {
    INIT.call_once(|| {
        let env_format = std::env::var(ENV_LOG_FORMAT).ok();
        let effective_format = format.or(env_format.as_deref()).unwrap_or("text");
        let span_events = span_events(std::env::var(ENV_LOG_SPAN_EVENTS).ok().as_deref());

        let registry = tracing_subscriber::registry()
            .with(create_env_filter())
            .with(ErrorLayer::default());

        // try_init: a test harness or embedding program may own the global default.
        let installed = match effective_format {
            "json" => registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_span_events(span_events)
                        .with_writer(io::stderr),
                )
                .try_init(),
            _ => registry
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_span_events(span_events)
                        .with_writer(io::stderr),
                )
                .try_init(),
        };

        if installed.is_ok() {
            tracing::debug!("Logging initialized with format: {}", effective_format);
        }
    });

    Ok(())
}

/// Check if logging has been initialized
pub fn is_initialized() -> bool {
    INIT.is_completed()
}

fn create_env_filter() -> EnvFilter {
    match std::env::var(ENV_LOG) {
        Ok(spec) => EnvFilter::try_new(&spec).unwrap_or_else(|_| {
            eprintln!(
                "Invalid {} specification '{}', using default 'info'",
                ENV_LOG, spec
            );
            EnvFilter::new("info")
        }),
        Err(_) => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    }
}

/// Parse a span event list; unset means no span events
fn span_events(raw: Option<&str>) -> FmtSpan {
    let Some(raw) = raw else {
        return FmtSpan::NONE;
    };
    raw.split(&[',', '|'][..])
        .map(|token| token.trim().to_lowercase())
        .fold(FmtSpan::NONE, |acc, token| {
            acc | match token.as_str() {
                "new" => FmtSpan::NEW,
                "close" => FmtSpan::CLOSE,
                "enter" => FmtSpan::ENTER,
                "exit" => FmtSpan::EXIT,
                "active" => FmtSpan::ACTIVE,
                "full" => FmtSpan::FULL,
                _ => FmtSpan::NONE,
            }
        })
}
