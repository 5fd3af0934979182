use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    Layer, filter::filter_fn, fmt::time::ChronoUtc, prelude::__tracing_subscriber_SubscriberExt,
    util::SubscriberInitExt,
};

/// Emit an event inside a span named after its category
#[macro_export]
macro_rules! log {
    ($level:expr, $span:expr, $($msg:expr),*) => {{
        let span = $crate::tracing::span!($level, $span);
        let _enter = span.enter();

        $crate::tracing::event!($level, $($msg),*)
    }};
}

/// Daemon startup, wiring and shutdown. Defaults to `TRACE`.
#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "internal", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::internal!(level = TRACE, $($msg),*)
    };
}

/// Campaign dispatch progress. Defaults to `DEBUG`.
#[macro_export]
macro_rules! dispatch {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "dispatch", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::dispatch!(level = DEBUG, $($msg),*)
    };
}

const LEVEL_VAR: &str = "LOG_LEVEL";

const fn default_level() -> LevelFilter {
    if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    }
}

/// Parse a configured level, keeping the build default for anything unreadable
fn level_from(raw: Option<&str>) -> LevelFilter {
    let default = default_level();
    raw.map_or(default, |raw| {
        raw.parse().unwrap_or_else(|_| {
            eprintln!("Ignoring {LEVEL_VAR}={raw}, using {default}");
            default
        })
    })
}

/// Install the global subscriber for `missive*` targets
pub fn init() {
    let level = level_from(std::env::var(LEVEL_VAR).ok().as_deref());

    let layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_ansi(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(ChronoUtc::rfc_3339())
        .with_filter(level)
        .with_filter(filter_fn(|metadata| metadata.target().starts_with("missive")));

    tracing_subscriber::registry().with(layer).init();
}
