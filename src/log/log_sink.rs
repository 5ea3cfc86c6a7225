use std::sync::Arc;

use crate::log::log_level::LogLevel;

/// Destination for log lines. Components hold an `Arc<dyn LogSink>` and log
/// through the `sink_*!` macros.
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, msg: &str, target: &'static str);
}

impl<T: LogSink + ?Sized> LogSink for &T {
    #[inline]
    fn log(&self, level: LogLevel, msg: &str, target: &'static str) {
        (**self).log(level, msg, target);
    }
}

impl<T: LogSink + ?Sized> LogSink for Arc<T> {
    #[inline]
    fn log(&self, level: LogLevel, msg: &str, target: &'static str) {
        (**self).log(level, msg, target);
    }
}
