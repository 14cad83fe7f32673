// file: src/process.rs
// version: 1.0.0
// guid: 71f3a9c5-2d84-4e06-9b71-c05d8f26e713

//! External command execution helpers
//!
//! Every stage of the orchestrator is a synchronous external-process
//! invocation; these helpers run a command and convert a non-zero exit into a
//! fatal error carrying the full command line for operator diagnosis.

use crate::{BootstrapError, Result};
use tokio::process::Command;
use tracing::debug;

/// Run a command and return its raw output
pub async fn run(command: &str, args: &[&str]) -> Result<std::process::Output> {
    debug!("Executing: {} {}", command, args.join(" "));

    Command::new(command).args(args).output().await.map_err(|e| {
        BootstrapError::process(
            format_command(command, args),
            None,
            format!("failed to spawn: {}", e),
        )
    })
}

/// Run a command, failing with a diagnostic naming the command on non-zero exit
pub async fn run_checked(command: &str, args: &[&str]) -> Result<String> {
    let output = run(command, args).await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        return Err(BootstrapError::process(
            format_command(command, args),
            output.status.code(),
            if stderr.trim().is_empty() {
                stdout.into_owned()
            } else {
                stderr.into_owned()
            },
        ));
    }

    String::from_utf8(output.stdout).map_err(|_| {
        BootstrapError::process(
            format_command(command, args),
            output.status.code(),
            "invalid UTF-8 in command output",
        )
    })
}

/// Run a command used as a boolean probe; non-zero exit is Ok(false)
pub async fn check_silent(command: &str, args: &[&str]) -> Result<bool> {
    let output = run(command, args).await?;
    Ok(output.status.success())
}

/// Full command line for error messages
pub fn format_command(command: &str, args: &[&str]) -> String {
    if args.is_empty() {
        command.to_string()
    } else {
        format!("{} {}", command, args.join(" "))
    }
}

/// Check that a binary is present on PATH
pub fn command_exists(name: &str) -> bool {
    which::which(name).is_ok()
}
