//! Unified error type for every relay-control operation.
//!
//! Only fatal failures travel as `AppError`. Tolerated failures (re-creating
//! existing nftables objects, deleting absent elements, unresolved probes) are
//! logged where they happen and never become an `Err`.

use std::path::PathBuf;

/// Application-level error returned by the commands and the firewall backend.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// An external command ran but exited unsuccessfully.
    #[error("command `{command}` failed ({}){}", status_text(.status), stderr_suffix(.stderr))]
    Command {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    /// An external command could not be started at all.
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The mapping document could not be written.
    #[error("failed to save {}: {source}", .path.display())]
    Store {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid or missing user input.
    #[error("{0}")]
    InvalidInput(String),
}

fn status_text(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit status {code}"),
        None => "terminated by signal".to_string(),
    }
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

impl AppError {
    /// Returns the error kind as a string matching the variant name.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Command { .. } => "Command",
            AppError::Spawn { .. } => "Spawn",
            AppError::Store { .. } => "Store",
            AppError::InvalidInput(_) => "InvalidInput",
        }
    }

    /// Process exit status for this error: the failing command's own status
    /// when it fits in a non-zero byte, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Command {
                status: Some(code), ..
            } => u8::try_from(*code).ok().filter(|c| *c != 0).unwrap_or(1),
            _ => 1,
        }
    }
}
