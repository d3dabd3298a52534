use std::sync::Mutex;

use crate::log::{
    log_level::LogLevel,
    log_msg::{LogMsg, now_millis},
    log_sink::LogSink,
};

/// Keeps every line in memory. Used by tests to assert that recovered
/// protocol problems were reported, and by embedders that show a log pane.
#[derive(Debug, Default)]
pub struct MemoryLogSink {
    lines: Mutex<Vec<LogMsg>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything logged so far.
    pub fn lines(&self) -> Vec<LogMsg> {
        match self.lines.lock() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// True when some line at `level` contains `needle`.
    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        self.lines()
            .iter()
            .any(|m| m.level == level && m.text.contains(needle))
    }

    pub fn count(&self, level: LogLevel) -> usize {
        self.lines().iter().filter(|m| m.level == level).count()
    }
}

impl LogSink for MemoryLogSink {
    fn log(&self, level: LogLevel, msg: &str, target: &'static str) {
        let line = LogMsg::new(level, msg, target, now_millis());
        match self.lines.lock() {
            Ok(mut g) => g.push(line),
            Err(poisoned) => poisoned.into_inner().push(line),
        }
    }
}
