use std::fmt;
use std::sync::Arc;

use log::LevelFilter;

// Yes these look silly. `tracing` doesn't currently support dynamic levels
// https://github.com/tokio-rs/tracing/issues/372
#[doc(hidden)]
macro_rules! private_tracing_dynamic_enabled {
    (target: $target:expr, $level:expr) => {{
        use ::tracing::Level;

        match $level {
            Level::ERROR => ::tracing::enabled!(target: $target, Level::ERROR),
            Level::WARN => ::tracing::enabled!(target: $target, Level::WARN),
            Level::INFO => ::tracing::enabled!(target: $target, Level::INFO),
            Level::DEBUG => ::tracing::enabled!(target: $target, Level::DEBUG),
            Level::TRACE => ::tracing::enabled!(target: $target, Level::TRACE),
        }
    }};
}

#[doc(hidden)]
macro_rules! private_tracing_dynamic_event {
    (target: $target:expr, $level:expr, $($args:tt)*) => {{
        use ::tracing::Level;

        match $level {
            Level::ERROR => ::tracing::event!(target: $target, Level::ERROR, $($args)*),
            Level::WARN => ::tracing::event!(target: $target, Level::WARN, $($args)*),
            Level::INFO => ::tracing::event!(target: $target, Level::INFO, $($args)*),
            Level::DEBUG => ::tracing::event!(target: $target, Level::DEBUG, $($args)*),
            Level::TRACE => ::tracing::event!(target: $target, Level::TRACE, $($args)*),
        }
    }};
}

#[doc(hidden)]
pub(crate) fn private_level_filter_to_levels(
    filter: log::LevelFilter,
) -> Option<(tracing::Level, log::Level)> {
    let tracing_level = match filter {
        log::LevelFilter::Error => Some(tracing::Level::ERROR),
        log::LevelFilter::Warn => Some(tracing::Level::WARN),
        log::LevelFilter::Info => Some(tracing::Level::INFO),
        log::LevelFilter::Debug => Some(tracing::Level::DEBUG),
        log::LevelFilter::Trace => Some(tracing::Level::TRACE),
        log::LevelFilter::Off => None,
    };

    tracing_level.zip(filter.to_level())
}

/// Identity and verbosity for one pool's event stream.
///
/// Routine lifecycle events (checkout, checkin, session open and close) are
/// emitted at DEBUG, or at INFO when the pool was built with `echo`. Notices
/// that an operator should see regardless (invalidation, recycling,
/// disposal, exhausted reconnects) are always INFO. Everything goes to the
/// `pool` target with the pool's name attached.
#[derive(Clone, Debug)]
pub(crate) struct PoolLogger {
    name: Arc<str>,
    events: LevelFilter,
}

impl PoolLogger {
    pub(crate) fn new(name: impl Into<Arc<str>>, echo: bool) -> Self {
        Self {
            name: name.into(),
            events: if echo {
                LevelFilter::Info
            } else {
                LevelFilter::Debug
            },
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Routine event at the pool's configured level.
    pub(crate) fn event(&self, args: fmt::Arguments<'_>) {
        if let Some((tracing_level, log_level)) = private_level_filter_to_levels(self.events) {
            // The enabled level could be set from either tracing world or log world, so check both
            // to see if the event should be emitted for our level
            let enabled = log::log_enabled!(target: "pool", log_level)
                || private_tracing_dynamic_enabled!(target: "pool", tracing_level);
            if enabled {
                private_tracing_dynamic_event!(
                    target: "pool",
                    tracing_level,
                    pool = %self.name,
                    "{args}",
                );
            }
        }
    }

    /// Operator-facing notice, always at INFO.
    pub(crate) fn notice(&self, args: fmt::Arguments<'_>) {
        tracing::info!(target: "pool", pool = %self.name, "{args}");
    }
}
