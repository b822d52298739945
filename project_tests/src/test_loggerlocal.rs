use lib_switch::loggers::loggerlocal::{LoggerLocal, LoggerLocalOptions};
use std::fs;
use std::io::Read;
use tempfile::tempdir;
use tokio::time::{sleep, Duration};

/// # LoggerLocal Integration Test
///
/// Verifies the `LoggerLocal` end to end:
/// 1. Sets up file logging in a temporary directory.
/// 2. Logs messages at various levels, one with structured extras.
/// 3. Asserts the messages landed in the log file as JSON lines.
/// 4. Creates a second logger instance and verifies rotation left only one file.
#[tokio::main]
async fn main() {
    let temp_dir = tempdir().expect("Failed to create temporary directory");
    let log_dir_path = temp_dir.path().to_path_buf();

    // File logging only, all levels; TTY disabled for test isolation
    let options = LoggerLocalOptions {
        use_tty: None,
        use_file: Some(vec![6, 5, 4, 3, 2, 1]),
        log_dir: Some(log_dir_path.clone()),
    };

    let app_name = "test_app".to_string();
    let logger = LoggerLocal::new(app_name.clone(), Some(options.clone()));

    logger.info("This is an info message", None).await;
    logger
        .warn(
            "This is a warning message",
            Some(serde_json::json!({"code": 101})),
        )
        .await;
    logger.error("This is an error message", None).await;
    logger.debug("This is a debug message", None).await;

    // Allow the async writer to flush everything to disk
    sleep(Duration::from_millis(100)).await;

    let mut log_files: Vec<_> = fs::read_dir(&log_dir_path)
        .expect("Failed to read log directory")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect();
    log_files.sort();

    assert!(!log_files.is_empty(), "No log file was created");
    let log_file_path = log_files.first().expect("Expected a log file");

    let mut file = fs::File::open(log_file_path).expect("Failed to open log file");
    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .expect("Failed to read log file contents");

    assert!(contents.contains("This is an info message"));
    assert!(contents.contains("This is a warning message"));
    assert!(contents.contains("\"code\":101"));
    assert!(contents.contains("This is an error message"));

    // Every line must parse as a structured record
    for line in contents.lines() {
        let record: serde_json::Value =
            serde_json::from_str(line).expect("Log line is not valid JSON");
        assert_eq!(record["app"]["name"], serde_json::json!(app_name));
    }

    // A fresh logger in the same directory rotates the old file away
    sleep(Duration::from_millis(1100)).await; // distinct timestamped filename
    let _second = LoggerLocal::new(app_name.clone(), Some(options));
    let remaining = fs::read_dir(&log_dir_path)
        .expect("Failed to read log directory")
        .filter_map(|entry| entry.ok())
        .count();
    assert_eq!(remaining, 1, "Rotation should keep only the newest log file");

    println!("test_loggerlocal: OK");
}
