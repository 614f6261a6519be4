//! Shared helpers: running external commands with a deadline and
//! char-safe truncation for menu text.

use anyhow::{Context, Result};
use std::process::{Command, Output, Stdio};
use std::time::{Duration, Instant};

/// Default deadline for external commands
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Truncate a string to at most `max_chars` Unicode characters.
///
/// If truncated, appends "..." so the total character count is ≤ `max_chars`.
pub fn truncate(s: &str, max_chars: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_chars {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}

/// Run a command with a timeout. Kills the child if it exceeds the deadline.
///
/// stdout/stderr are drained on their own threads so a chatty child can't
/// block on a full pipe.
pub fn run_command_with_timeout(cmd: &mut Command, timeout: Duration) -> Result<Output> {
    let mut child = cmd
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .context("Failed to spawn command")?;

    let stdout_handle = child.stdout.take();
    let stderr_handle = child.stderr.take();

    let stdout_thread = std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut out) = stdout_handle {
            std::io::Read::read_to_end(&mut out, &mut buf).ok();
        }
        buf
    });
    let stderr_thread = std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut err) = stderr_handle {
            std::io::Read::read_to_end(&mut err, &mut buf).ok();
        }
        buf
    });

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait()? {
            Some(status) => break status,
            None => {
                if Instant::now() >= deadline {
                    child.kill().ok();
                    child.wait().ok();
                    anyhow::bail!("Command timed out after {timeout:?}");
                }
                std::thread::sleep(Duration::from_millis(50));
            }
        }
    };

    let stdout = stdout_thread.join().unwrap_or_default();
    let stderr = stderr_thread.join().unwrap_or_default();

    Ok(Output {
        status,
        stdout,
        stderr,
    })
}
