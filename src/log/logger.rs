use crate::{
    config::Config,
    log::{log_level::LogLevel, log_msg::LogMsg, logger_handle::LoggerHandle},
};

use std::{
    fs::{self, OpenOptions},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    sync::mpsc,
    thread,
    time::{SystemTime, UNIX_EPOCH},
};

/// Flush every 100 lines when debugging so a crash keeps the tail.
#[cfg(feature = "log-debug")]
const FLUSH_BATCH_SIZE: u32 = 100;

#[cfg(not(feature = "log-debug"))]
const FLUSH_BATCH_SIZE: u32 = 1_000;

const DEFAULT_APP_NAME: &str = "roomdrop";
const DEFAULT_QUEUE_CAP: usize = 1_024;

/// `[logging]` section of the settings file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Directory for log files; `None` means `logs/` next to the executable.
    pub dir: Option<PathBuf>,
    pub app_name: String,
    pub min_level: LogLevel,
    pub queue_cap: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: None,
            app_name: DEFAULT_APP_NAME.to_string(),
            min_level: LogLevel::Info,
            queue_cap: DEFAULT_QUEUE_CAP,
        }
    }
}

impl LoggingConfig {
    /// Reads `path`, `filename`, `level` and `queue_cap` from `[logging]`.
    /// Malformed values keep their defaults.
    #[must_use]
    pub fn from_config(cfg: &Config) -> Self {
        let mut out = Self::default();
        if let Some(dir) = cfg.get_non_empty("logging", "path") {
            out.dir = Some(expand_path(dir));
        }
        if let Some(name) = cfg.get_non_empty("logging", "filename") {
            out.app_name = name.to_string();
        }
        if let Ok(Some(level)) = cfg.get_parsed::<LogLevel>("logging", "level") {
            out.min_level = level;
        }
        if let Ok(Some(cap)) = cfg.get_parsed::<usize>("logging", "queue_cap") {
            out.queue_cap = cap.max(1);
        }
        out
    }
}

/// Bounded, non-blocking logger writing to a per-process file.
///
/// Producers enqueue through [`LoggerHandle`]; a `logger-worker` thread
/// drains the queue and writes one line per message. Dropping every handle
/// (including the one inside `Logger`) lets the worker flush and exit.
pub struct Logger {
    handle: LoggerHandle,
    _thread: Option<thread::JoinHandle<()>>,
    file_path: PathBuf,
}

impl Logger {
    #[must_use]
    pub fn start(cfg: &LoggingConfig) -> Self {
        let dir = cfg
            .dir
            .clone()
            .unwrap_or_else(|| exe_dir_fallback_cwd().join("logs"));
        Self::start_in_dir(dir, &cfg.app_name, cfg.queue_cap, cfg.min_level)
    }

    /// Creates `dir` if needed and starts writing
    /// `<app_name>-<YYYYMMDD_HHMMSS>-pid<N>.log` inside it.
    pub fn start_in_dir<D: AsRef<Path>>(
        dir: D,
        app_name: &str,
        cap: usize,
        min_level: LogLevel,
    ) -> Self {
        let dir = dir.as_ref().to_path_buf();
        let _ = fs::create_dir_all(&dir);

        let fname = format!(
            "{}-{}-pid{}.log",
            app_name,
            timestamp_for_filename(),
            std::process::id()
        );
        let file_path = dir.join(fname);

        let (tx, rx) = mpsc::sync_channel::<LogMsg>(cap.max(1));
        let handle = LoggerHandle { tx, min_level };

        let path_for_worker = file_path.clone();
        let _thread = thread::Builder::new()
            .name("logger-worker".into())
            .spawn(move || write_loop(&path_for_worker, &rx))
            .ok();

        Self {
            handle,
            _thread,
            file_path,
        }
    }

    #[must_use]
    pub fn handle(&self) -> LoggerHandle {
        self.handle.clone()
    }

    #[must_use]
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }
}

fn write_loop(path: &Path, rx: &mpsc::Receiver<LogMsg>) {
    // Target file, then a temp-dir fallback, then nowhere.
    let writer: Box<dyn Write + Send> =
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => Box::new(f),
            Err(_) => {
                let fallback = std::env::temp_dir().join("roomdrop-fallback.log");
                match OpenOptions::new().create(true).append(true).open(fallback) {
                    Ok(f) => Box::new(f),
                    Err(_) => Box::new(io::sink()),
                }
            }
        };
    let mut out = BufWriter::new(writer);
    let mut written: u32 = 0;

    while let Ok(m) = rx.recv() {
        let _ = writeln!(&mut out, "{}", m.render());
        written = written.wrapping_add(1);
        if written % FLUSH_BATCH_SIZE == 0 {
            let _ = out.flush();
        }
    }
    let _ = out.flush();
}

fn exe_dir_fallback_cwd() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// `YYYYMMDD_HHMMSS` in UTC.
fn timestamp_for_filename() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let (y, m, d) = civil_from_days((secs / 86_400) as i64);
    let rem = secs % 86_400;
    format!(
        "{y:04}{m:02}{d:02}_{:02}{:02}{:02}",
        rem / 3_600,
        (rem % 3_600) / 60,
        rem % 60
    )
}

/// Days since 1970-01-01 to a proleptic Gregorian (year, month, day).
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

fn expand_path(path_str: &str) -> PathBuf {
    let home = || {
        std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .ok()
            .map(PathBuf::from)
    };
    if path_str == "~" {
        if let Some(h) = home() {
            return h;
        }
    }
    if let Some(rest) = path_str
        .strip_prefix("~/")
        .or_else(|| path_str.strip_prefix("~\\"))
    {
        if let Some(h) = home() {
            return h.join(rest);
        }
    }
    PathBuf::from(path_str)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::log::log_sink::LogSink;
    use std::time::Duration;

    #[test]
    fn civil_dates_match_known_days() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(civil_from_days(11_016), (2000, 2, 29));
        assert_eq!(civil_from_days(20_000), (2024, 10, 4));
    }

    #[test]
    fn logging_section_overrides_defaults() {
        let cfg = Config::parse("[logging]\nfilename = relay\nlevel = warn\nqueue_cap = 0\n")
            .expect("valid ini");
        let lc = LoggingConfig::from_config(&cfg);
        assert_eq!(lc.app_name, "relay");
        assert_eq!(lc.min_level, LogLevel::Warn);
        assert_eq!(lc.queue_cap, 1);
        assert_eq!(lc.dir, None);
    }

    #[test]
    fn worker_writes_lines_to_file() {
        let dir = std::env::temp_dir().join(format!("roomdrop_logger_test_{}", std::process::id()));
        let logger = Logger::start_in_dir(&dir, "unit", 16, LogLevel::Info);
        let path = logger.file_path().to_path_buf();
        let h = logger.handle();
        h.log(LogLevel::Warn, "peer vanished", "roomdrop::session");
        h.log(LogLevel::Debug, "filtered out", "roomdrop::session");
        drop(h);
        drop(logger);

        let mut body = String::new();
        for _ in 0..50 {
            body = fs::read_to_string(&path).unwrap_or_default();
            if body.contains("peer vanished") {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        assert!(body.contains("[Warn]"));
        assert!(body.contains("roomdrop::session | peer vanished"));
        assert!(!body.contains("filtered out"));
        let _ = fs::remove_dir_all(dir);
    }
}
