use super::logrecord::{
    ErrorBlock, Logrecord, LEVEL_DEBUG, LEVEL_ERROR, LEVEL_FATAL, LEVEL_INFO, LEVEL_VERBOSE,
    LEVEL_WARN,
};
use chrono::Local;
use colored::*;
use glob::glob;
use serde_json::Value;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Default)]
/// # Logger Local Options
///
/// Configuration options for the `LoggerLocal` instance, controlling where and
/// how log messages are output.
pub struct LoggerLocalOptions {
    /// A list of log levels that should be printed to the TTY (console).
    pub use_tty: Option<Vec<i64>>,
    /// A list of log levels that should be written to a log file.
    pub use_file: Option<Vec<i64>>,
    /// The directory where log files should be stored. If `None`, defaults to the executable's directory.
    pub log_dir: Option<PathBuf>,
}

/// # Local Logger
///
/// The structured logger injected into every component of this library
/// (explicit dependency injection: components receive an `Arc<LoggerLocal>`
/// at construction instead of building their own). Writes colorized lines to
/// the TTY and JSON-serialized [`Logrecord`]s to a rotated per-app log file.
#[derive(Debug)]
pub struct LoggerLocal {
    /// The name of the application associated with this logger instance.
    app_name: String,
    /// Configuration options determining logging behavior.
    options: LoggerLocalOptions,
    /// Serializes file writes so interleaved records stay line-atomic.
    write_mutex: Arc<Mutex<()>>,
    /// The path to the currently active log file, if file logging is enabled.
    current_log_file: Option<PathBuf>,
}

impl LoggerLocal {
    /// Creates a new `LoggerLocal` instance.
    ///
    /// If file logging is enabled, it ensures the log directory exists,
    /// rotates old logs, and sets up the current log file path.
    ///
    /// # Arguments
    /// * `app_name` - The name of the application using this logger.
    /// * `options` - Optional `LoggerLocalOptions` to customize logging behavior.
    ///   If `None`, default options are used (TTY and file logging for all levels).
    pub fn new(app_name: String, options: Option<LoggerLocalOptions>) -> Self {
        let default_options = LoggerLocalOptions {
            use_tty: Some(vec![6, 5, 4, 3, 2, 1]),
            use_file: Some(vec![6, 5, 4, 3, 2, 1]),
            log_dir: None,
        };
        let options = options.unwrap_or(default_options);

        let mut current_log_file = None;
        if options.use_file.is_some() {
            let log_dir = options
                .log_dir
                .clone()
                .or_else(|| {
                    std::env::current_exe()
                        .ok()
                        .and_then(|p| p.parent().map(Path::to_path_buf))
                })
                .unwrap_or_else(|| PathBuf::from("."));

            if let Err(e) = std::fs::create_dir_all(&log_dir) {
                eprintln!("Failed to create log directory {}: {}", log_dir.display(), e);
            } else {
                Self::rotate_logs(&app_name, &log_dir);
                let stamp = Local::now().format("%Y%m%d-%H%M%S");
                current_log_file = Some(log_dir.join(format!("{}-{}.log", app_name, stamp)));
            }
        }

        Self {
            app_name,
            options,
            write_mutex: Arc::new(Mutex::new(())),
            current_log_file,
        }
    }

    /// Rotates log files for a given application and log directory.
    ///
    /// Keeps only the most recent log file (based on timestamp in filename)
    /// and deletes older log files for the specified application.
    fn rotate_logs(app_name: &str, log_dir: &Path) {
        let pattern = format!("{}/{}-*.log", log_dir.display(), app_name);
        let mut log_files: Vec<PathBuf> = Vec::new();

        for entry in glob(&pattern).expect("Failed to read glob pattern for log rotation") {
            if let Ok(path) = entry {
                log_files.push(path);
            }
        }

        // Newest first, by timestamped filename
        log_files.sort_by(|a, b| {
            b.file_name()
                .expect("No filename")
                .cmp(a.file_name().expect("No filename"))
        });

        if log_files.len() > 1 {
            for old_file in log_files.iter().skip(1) {
                if let Err(e) = std::fs::remove_file(old_file) {
                    eprintln!("Error deleting old log file {}: {}", old_file.display(), e);
                }
            }
        }
    }

    /// Builds a [`Logrecord`] and dispatches it to the configured sinks.
    pub async fn log(&self, level: i64, message: &str, extra: Option<Value>) {
        let mut record = Logrecord::default();
        record.loglevel = level;
        record.message.text = message.to_string();
        record.app.name = self.app_name.clone();
        if let Some(extra) = extra {
            record.tags = extra;
        }
        if level >= LEVEL_ERROR {
            record.error = ErrorBlock {
                code: level.to_string(),
                stack: "".to_string(),
                details: message.to_string(),
            };
        }

        if let Some(levels) = &self.options.use_tty {
            if levels.contains(&level) {
                self.write_tty(&record);
            }
        }

        if let Some(levels) = &self.options.use_file {
            if levels.contains(&level) {
                self.write_file(&record).await;
            }
        }
    }

    /// Prints a single colorized line to the console.
    fn write_tty(&self, record: &Logrecord) {
        let label = match record.loglevel {
            LEVEL_FATAL => "FATAL".red().bold(),
            LEVEL_ERROR => "ERROR".red(),
            LEVEL_WARN => "WARN ".yellow(),
            LEVEL_INFO => "INFO ".green(),
            LEVEL_DEBUG => "DEBUG".blue(),
            _ => "VERB ".magenta(),
        };
        let tags = if record.tags == serde_json::json!([]) {
            String::new()
        } else {
            format!(" {}", record.tags)
        };
        println!(
            "{} [{}] {} {}{}",
            record.rfc9557.dimmed(),
            self.app_name,
            label,
            record.message.text,
            tags
        );
    }

    /// Appends the record as one JSON line to the current log file.
    async fn write_file(&self, record: &Logrecord) {
        let Some(path) = &self.current_log_file else {
            return;
        };
        let line = match serde_json::to_string(record) {
            Ok(line) => line,
            Err(e) => {
                eprintln!("Failed to serialize log record: {}", e);
                return;
            }
        };

        let _guard = self.write_mutex.lock().await;
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut f| writeln!(f, "{}", line));
        if let Err(e) = result {
            eprintln!("Failed to write log file {}: {}", path.display(), e);
        }
    }

    /// Logs at fatal level (6).
    pub async fn fatal(&self, message: &str, extra: Option<Value>) {
        self.log(LEVEL_FATAL, message, extra).await;
    }

    /// Logs at error level (5).
    pub async fn error(&self, message: &str, extra: Option<Value>) {
        self.log(LEVEL_ERROR, message, extra).await;
    }

    /// Logs at warning level (4).
    pub async fn warn(&self, message: &str, extra: Option<Value>) {
        self.log(LEVEL_WARN, message, extra).await;
    }

    /// Logs at info level (3).
    pub async fn info(&self, message: &str, extra: Option<Value>) {
        self.log(LEVEL_INFO, message, extra).await;
    }

    /// Logs at debug level (2).
    pub async fn debug(&self, message: &str, extra: Option<Value>) {
        self.log(LEVEL_DEBUG, message, extra).await;
    }

    /// Logs at verbose level (1).
    pub async fn verbose(&self, message: &str, extra: Option<Value>) {
        self.log(LEVEL_VERBOSE, message, extra).await;
    }

    /// A quiet logger for tests and tools that want no output at all.
    pub fn disabled(app_name: &str) -> Self {
        Self::new(
            app_name.to_string(),
            Some(LoggerLocalOptions {
                use_tty: None,
                use_file: None,
                log_dir: None,
            }),
        )
    }
}
