use crate::config::Config;
use crate::log::log_sink::LogSink;
use crate::sink_warn;

pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;
pub const DEFAULT_HIGH_WATER_MARK: usize = 1024 * 1024;
pub const DEFAULT_LOW_WATER_MARK: usize = 256 * 1024;
/// Upper bound on chunks one `poll` pushes, so a fast link cannot starve
/// the rest of the event loop.
pub const MAX_CHUNKS_PER_POLL: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferConfig {
    pub chunk_size: usize,
    /// Stop sending once the channel would buffer more than this.
    pub high_water_mark: usize,
    /// Resume once the channel drained to this.
    pub low_water_mark: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            low_water_mark: DEFAULT_LOW_WATER_MARK,
        }
    }
}

impl TransferConfig {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_water_marks(mut self, low: usize, high: usize) -> Self {
        if low <= high {
            self.low_water_mark = low;
            self.high_water_mark = high;
        }
        self
    }

    /// Reads `[transfer]`. Out-of-range values fall back to defaults.
    pub fn from_config(cfg: &Config, log: &dyn LogSink) -> Self {
        let mut out = Self::default();
        match cfg.get_parsed::<usize>("transfer", "chunk_size") {
            Ok(Some(n)) if n >= 1 => out.chunk_size = n,
            Ok(None) => {}
            _ => sink_warn!(log, "bad transfer.chunk_size, using {}", DEFAULT_CHUNK_SIZE),
        }

        let high = cfg.get_parsed::<usize>("transfer", "high_water_mark");
        let low = cfg.get_parsed::<usize>("transfer", "low_water_mark");
        match (high, low) {
            (Ok(h), Ok(l)) => {
                let h = h.unwrap_or(DEFAULT_HIGH_WATER_MARK);
                let l = l.unwrap_or(DEFAULT_LOW_WATER_MARK);
                if l <= h {
                    out.high_water_mark = h;
                    out.low_water_mark = l;
                } else {
                    sink_warn!(
                        log,
                        "transfer.low_water_mark {} above high_water_mark {}, using defaults",
                        l,
                        h
                    );
                }
            }
            _ => sink_warn!(log, "bad transfer water marks, using defaults"),
        }
        out
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::log::{LogLevel, MemoryLogSink};

    #[test]
    fn reads_transfer_section() {
        let cfg = Config::parse(
            "[transfer]\nchunk_size = 4096\nhigh_water_mark = 65536\nlow_water_mark = 8192\n",
        )
        .unwrap();
        let t = TransferConfig::from_config(&cfg, &MemoryLogSink::new());
        assert_eq!(t.chunk_size, 4096);
        assert_eq!(t.high_water_mark, 65536);
        assert_eq!(t.low_water_mark, 8192);
    }

    #[test]
    fn invalid_values_fall_back_with_warning() {
        let cfg = Config::parse(
            "[transfer]\nchunk_size = 0\nhigh_water_mark = 100\nlow_water_mark = 200\n",
        )
        .unwrap();
        let log = MemoryLogSink::new();
        let t = TransferConfig::from_config(&cfg, &log);
        assert_eq!(t, TransferConfig::default());
        assert!(log.contains(LogLevel::Warn, "chunk_size"));
        assert!(log.contains(LogLevel::Warn, "low_water_mark"));
    }
}
