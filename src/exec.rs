//! Thin wrapper around `std::process::Command` for the external CLIs.
//!
//! Both `nft` and `tailscale` are driven through their text interfaces, so
//! every call goes through [`run`] (captures output, never fails on a non-zero
//! status) or [`run_checked`] (turns a non-zero status into [`AppError::Command`]).

use std::process::Command;

use crate::error::AppError;

/// Captured result of one external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Render a command line the way an operator would type it.
pub fn render(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run `program` with `args`, capturing trimmed stdout/stderr.
///
/// Only a failure to spawn is an error; the exit status is reported in the output.
pub fn run(program: &str, args: &[String]) -> Result<CommandOutput, AppError> {
    tracing::trace!("exec: {}", render(program, args));
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| AppError::Spawn {
            command: render(program, args),
            source,
        })?;

    Ok(CommandOutput {
        status: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

/// Run a command and return its stdout, or [`AppError::Command`] carrying the
/// command line, status, and stderr. Callers decide how loudly to log it.
pub fn run_checked(program: &str, args: &[String]) -> Result<String, AppError> {
    let output = run(program, args)?;
    if output.success() {
        return Ok(output.stdout);
    }

    Err(AppError::Command {
        command: render(program, args),
        status: output.status,
        stderr: output.stderr,
    })
}
