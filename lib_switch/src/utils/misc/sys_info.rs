//! # System Information
//!
//! Gathers the identity of the running process (basename, location, host,
//! addresses, user). These details are stamped onto every structured log
//! record so that records from dozens of independently deployed switch
//! services can be attributed after aggregation.

use std::env;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while collecting process information.
#[derive(Debug, Error, Clone)]
pub enum ProcessInfoError {
    /// The current executable path could not be resolved.
    #[error("Failed to resolve current executable: {0}")]
    ExePath(String),

    /// The hostname could not be determined.
    #[error("Failed to resolve hostname: {0}")]
    Hostname(String),

    /// No non-loopback local IP address could be determined.
    #[error("Failed to resolve local IP address: {0}")]
    LocalIp(String),
}

/// A snapshot of the current process identity.
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    /// The executable file name without extension (e.g. "swx_auth").
    pub process_basename: String,
    /// The directory containing the executable.
    pub process_location: String,
    /// The machine hostname.
    pub process_host: String,
    /// The primary non-loopback IP address of the machine.
    pub process_host_ip: String,
    /// The numeric user id (or "0" where the platform has none).
    pub process_uid: String,
    /// The login name of the user running the process.
    pub process_user: String,
}

/// Collects a [`ProcessInfo`] snapshot for the current process.
pub fn get_process_info() -> Result<ProcessInfo, ProcessInfoError> {
    let exe: PathBuf =
        env::current_exe().map_err(|e| ProcessInfoError::ExePath(e.to_string()))?;

    let basename = exe
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string();

    let location = exe
        .parent()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| ".".to_string());

    let host = hostname::get()
        .map_err(|e| ProcessInfoError::Hostname(e.to_string()))?
        .to_string_lossy()
        .to_string();

    // Loopback-only hosts (CI containers) are tolerated with 127.0.0.1
    let host_ip = match local_ip_address::local_ip() {
        Ok(ip) => ip.to_string(),
        Err(_) => "127.0.0.1".to_string(),
    };

    let user = env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    Ok(ProcessInfo {
        process_basename: basename,
        process_location: location,
        process_host: host,
        process_host_ip: host_ip,
        process_uid: std::process::id().to_string(),
        process_user: user,
    })
}
