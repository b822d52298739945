//! # Utilities Module
//!
//! This module serves as a collection point for various general-purpose
//! utility functions and helper modules that are widely applicable across the
//! `lib_switch` crate and the broader swxgate project.
//!
//! ## Contained Modules:
//!
//! - **`misc`**: A submodule for miscellaneous functions, including system
//!   information retrieval (`sys_info`) and general helper functions
//!   (`utils`).

#![forbid(unsafe_code)]

/// Miscellaneous utility functions, including system information and general helpers.
pub mod misc;

pub use misc::sys_info::{get_process_info, ProcessInfo, ProcessInfoError};
pub use misc::utils::{current_datetime_rfc9557, new_correlation_id, new_token, sha256_hex};
