use crate::log::log_level::LogLevel;

/// One queued log line.
#[derive(Debug, Clone)]
pub struct LogMsg {
    pub level: LogLevel,
    /// Wall-clock milliseconds since the UNIX epoch.
    pub ts_ms: u128,
    pub text: String,
    /// Module path the line came from.
    pub target: &'static str,
}

impl LogMsg {
    pub fn new(
        level: LogLevel,
        text: impl Into<String>,
        target: &'static str,
        ts_ms: u128,
    ) -> Self {
        Self {
            level,
            ts_ms,
            text: text.into(),
            target,
        }
    }

    /// Renders the line the way the file logger writes it.
    #[must_use]
    pub fn render(&self) -> String {
        format!(
            "[{:?}] {} {} | {}",
            self.level, self.ts_ms, self.target, self.text
        )
    }
}

/// Milliseconds since the UNIX epoch, zero if the clock is before it.
#[must_use]
pub fn now_millis() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}
