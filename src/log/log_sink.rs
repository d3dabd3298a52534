use crate::log::log_level::LogLevel;

/// Destination for log lines. Every long-lived component holds an
/// `Arc<dyn LogSink>` and logs through the `sink_*` macros.
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, msg: &str, target: &'static str);
}
