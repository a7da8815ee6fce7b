//! Unified logging for field-unit services
//!
//! Console plus a daily file `{YYYYMMDD}_{service}.log`, both in the
//! `timestamp [LEVEL] message` format. The file is the unit's durable
//! operator log.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Custom format for log level with brackets: `[INFO]`, `[WARN]`, etc.
fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

/// Event formatter: `2025-06-01T12:10:00.000000 [INFO] message`
///
/// Local time; the unit's RTC runs on site time.
struct BracketedLevelFormat;

impl<S, N> FormatEvent<S, N> for BracketedLevelFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = chrono::Local::now();
        write!(writer, "{} ", now.format("%Y-%m-%dT%H:%M:%S%.6f"))?;

        let level = *event.metadata().level();
        if writer.has_ansi_escapes() {
            let color = match level {
                Level::TRACE => "\x1b[35m",
                Level::DEBUG => "\x1b[34m",
                Level::INFO => "\x1b[32m",
                Level::WARN => "\x1b[33m",
                Level::ERROR => "\x1b[31m",
            };
            write!(writer, "{}{}\x1b[0m ", color, format_level(&level))?;
        } else {
            write!(writer, "{} ", format_level(&level))?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

// Global guards for keeping the non-blocking writers alive
static GUARDS: OnceLock<Arc<Mutex<Vec<WorkerGuard>>>> = OnceLock::new();

/// Resolve the log root directory
///
/// Priority:
/// 1. `{SERVICE}_LOG_DIR` environment variable
/// 2. `config_dir` from the service configuration
/// 3. `logs`
pub fn resolve_log_root(service_name: &str, config_dir: Option<&str>) -> PathBuf {
    let env_var = format!("{}_LOG_DIR", service_name.to_uppercase());
    std::env::var(&env_var)
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            config_dir
                .filter(|d| !d.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("logs"))
        })
}

/// Log file name for a service on a given `YYYYMMDD` date
fn log_file_name(date: &str, service_name: &str) -> String {
    format!("{}_{}.log", date, service_name)
}

// Daily rolling file writer with naming format: {YYYYMMDD}_{service}.log
struct DailyRollingWriter {
    service_name: String,
    log_dir: PathBuf,
    current_date: Arc<Mutex<String>>,
    current_file: Arc<Mutex<Option<File>>>,
}

impl DailyRollingWriter {
    fn new(service_name: String, log_dir: PathBuf) -> std::io::Result<Self> {
        let current_date = chrono::Local::now().format("%Y%m%d").to_string();
        fs::create_dir_all(&log_dir)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_dir.join(log_file_name(&current_date, &service_name)))?;

        Ok(Self {
            service_name,
            log_dir,
            current_date: Arc::new(Mutex::new(current_date)),
            current_file: Arc::new(Mutex::new(Some(file))),
        })
    }

    fn get_writer(&self) -> std::io::Result<std::sync::MutexGuard<'_, Option<File>>> {
        let today = chrono::Local::now().format("%Y%m%d").to_string();
        let mut current_date = self
            .current_date
            .lock()
            .map_err(|e| std::io::Error::other(format!("Mutex poisoned: {}", e)))?;

        let current_path = self
            .log_dir
            .join(log_file_name(&current_date, &self.service_name));

        // Date changed, or the file was removed together with the media
        if *current_date != today || !current_path.exists() {
            fs::create_dir_all(&self.log_dir)?;
            let new_file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.log_dir.join(log_file_name(&today, &self.service_name)))?;
            *current_date = today;

            let mut current_file = self
                .current_file
                .lock()
                .map_err(|e| std::io::Error::other(format!("Mutex poisoned: {}", e)))?;
            *current_file = Some(new_file);
        }

        self.current_file
            .lock()
            .map_err(|e| std::io::Error::other(format!("Mutex poisoned: {}", e)))
    }
}

impl Write for DailyRollingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Some(ref mut file) = *self.get_writer()? {
            file.write(buf)
        } else {
            Ok(0)
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if let Some(ref mut file) = *self.get_writer()? {
            file.flush()
        } else {
            Ok(())
        }
    }
}

/// Logger configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Service name (e.g., "fieldsrv")
    pub service_name: String,
    /// Directory holding the daily files
    pub log_dir: PathBuf,
    /// Default filter when `RUST_LOG` is not set
    pub level: Level,
    /// JSON lines in the file instead of the bracketed format
    pub enable_json: bool,
    /// Daily files kept on disk, 0 = keep all
    pub max_log_files: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".to_string(),
            log_dir: PathBuf::from("logs"),
            level: Level::INFO,
            enable_json: false,
            max_log_files: 30,
        }
    }
}

/// Initialize logging system with configuration
pub fn init_with_config(config: LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    fs::create_dir_all(&config.log_dir)?;

    let writer = DailyRollingWriter::new(config.service_name.clone(), config.log_dir.clone())?;
    let (non_blocking, guard) = tracing_appender::non_blocking(writer);

    let guards = GUARDS.get_or_init(|| Arc::new(Mutex::new(Vec::new())));
    match guards.lock() {
        Ok(mut guards) => guards.push(guard),
        Err(poisoned) => {
            eprintln!("Warning: GUARDS lock was poisoned, recovering...");
            poisoned.into_inner().push(guard);
        },
    }

    // RUST_LOG wins over the configured level
    let env_filter = match std::env::var("RUST_LOG") {
        Ok(env_str) if !env_str.is_empty() => EnvFilter::new(env_str),
        _ => EnvFilter::new(config.level.as_str().to_lowercase()),
    };

    let console_layer = fmt::layer()
        .with_ansi(true)
        .event_format(BracketedLevelFormat)
        .boxed();

    let file_layer = if config.enable_json {
        fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_level(true)
            .with_target(true)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .event_format(BracketedLevelFormat)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    tracing::info!("Logging: {} @ {:?}", config.service_name, config.log_dir);

    if config.max_log_files > 0 {
        match prune_old_logs(&config.log_dir, &config.service_name, config.max_log_files) {
            Ok(0) => {},
            Ok(removed) => tracing::debug!("Removed {} old log files", removed),
            Err(e) => tracing::warn!("Log cleanup failed: {}", e),
        }
    }

    Ok(())
}

/// Delete all but the newest `keep` daily files of `service_name`
///
/// File names start with the date, so lexical order is age order.
pub fn prune_old_logs(log_dir: &Path, service_name: &str, keep: usize) -> std::io::Result<usize> {
    let suffix = format!("_{}.log", service_name);
    let mut files: Vec<PathBuf> = fs::read_dir(log_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.ends_with(&suffix) && n.len() == 8 + suffix.len())
                .unwrap_or(false)
        })
        .collect();

    if files.len() <= keep {
        return Ok(0);
    }

    files.sort();
    let excess = files.len() - keep;
    for path in &files[..excess] {
        fs::remove_file(path)?;
    }
    Ok(excess)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_resolve_log_root_priority() {
        // Unique service name so the env var is not shared with other tests
        std::env::remove_var("LOGROOTTEST_LOG_DIR");
        assert_eq!(resolve_log_root("logroottest", None), PathBuf::from("logs"));
        assert_eq!(
            resolve_log_root("logroottest", Some("/media/usb/logs")),
            PathBuf::from("/media/usb/logs")
        );

        std::env::set_var("LOGROOTTEST_LOG_DIR", "/var/log/eds");
        assert_eq!(
            resolve_log_root("logroottest", Some("/media/usb/logs")),
            PathBuf::from("/var/log/eds")
        );
        std::env::remove_var("LOGROOTTEST_LOG_DIR");
    }

    #[test]
    fn test_daily_writer_creates_dated_file() {
        let dir = tempdir().unwrap();
        let mut writer =
            DailyRollingWriter::new("fieldsrv".to_string(), dir.path().join("logs")).unwrap();
        writer.write_all(b"hello\n").unwrap();
        writer.flush().unwrap();

        let today = chrono::Local::now().format("%Y%m%d").to_string();
        let path = dir.path().join("logs").join(format!("{}_fieldsrv.log", today));
        assert_eq!(fs::read_to_string(path).unwrap(), "hello\n");
    }

    #[test]
    fn test_daily_writer_recreates_removed_file() {
        let dir = tempdir().unwrap();
        let log_dir = dir.path().join("logs");
        let mut writer = DailyRollingWriter::new("fieldsrv".to_string(), log_dir.clone()).unwrap();

        fs::remove_dir_all(&log_dir).unwrap();
        writer.write_all(b"after removal\n").unwrap();

        let today = chrono::Local::now().format("%Y%m%d").to_string();
        let path = log_dir.join(format!("{}_fieldsrv.log", today));
        assert_eq!(fs::read_to_string(path).unwrap(), "after removal\n");
    }

    #[test]
    fn test_prune_old_logs() {
        let dir = tempdir().unwrap();
        for date in ["20250101", "20250102", "20250103", "20250104"] {
            fs::write(dir.path().join(format!("{}_fieldsrv.log", date)), b"x").unwrap();
        }
        fs::write(dir.path().join("20250101_othersrv.log"), b"x").unwrap();
        fs::write(dir.path().join("eds_data.csv"), b"x").unwrap();

        let removed = prune_old_logs(dir.path(), "fieldsrv", 2).unwrap();
        assert_eq!(removed, 2);
        assert!(!dir.path().join("20250101_fieldsrv.log").exists());
        assert!(!dir.path().join("20250102_fieldsrv.log").exists());
        assert!(dir.path().join("20250104_fieldsrv.log").exists());
        assert!(dir.path().join("20250101_othersrv.log").exists());
        assert!(dir.path().join("eds_data.csv").exists());
    }
}
