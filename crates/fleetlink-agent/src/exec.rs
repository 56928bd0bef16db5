//! Remote command execution through the platform shell.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::warn;

use fleetlink_proto::{CommandOutcome, wire_timestamp};

/// Runs relay-forwarded command lines with a wall-clock cap.
///
/// Every path produces a [`CommandOutcome`] so the dispatcher always has a
/// response to send; failures are encoded as exit code `-1` with the error
/// text as output.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    timeout: Duration,
}

impl CommandExecutor {
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Execute a command line and collect its output.
    pub async fn run(&self, command_line: &str) -> CommandOutcome {
        let mut command = shell_command(command_line);
        command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let (output, exit_code) = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => {
                let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                let stderr = String::from_utf8_lossy(&output.stderr);
                if !stderr.trim().is_empty() {
                    if !text.is_empty() && !text.ends_with('\n') {
                        text.push('\n');
                    }
                    text.push_str(stderr.trim_end());
                }
                (text, output.status.code().unwrap_or(-1))
            }
            Ok(Err(e)) => {
                warn!(command = %command_line, error = %e, "Failed to spawn command");
                (format!("failed to spawn command: {e}"), -1)
            }
            Err(_) => {
                // The dropped child future kills the process via kill_on_drop.
                warn!(
                    command = %command_line,
                    timeout_secs = self.timeout.as_secs(),
                    "Command timed out"
                );
                (
                    format!("command timed out after {}s", self.timeout.as_secs()),
                    -1,
                )
            }
        };

        CommandOutcome {
            command: command_line.to_string(),
            output,
            exit_code,
            timestamp: wire_timestamp(),
        }
    }
}

impl Default for CommandExecutor {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[cfg(unix)]
fn shell_command(command_line: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(command_line);
    command
}

#[cfg(windows)]
fn shell_command(command_line: &str) -> Command {
    let mut command = Command::new("cmd");
    command.args(["/C", command_line]);
    command
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_captures_stdout_and_exit_zero() {
        let outcome = CommandExecutor::default().run("echo hello").await;
        assert!(outcome.output.contains("hello"));
        assert_eq!(outcome.exit_code, 0);
        assert_eq!(outcome.command, "echo hello");
    }

    #[tokio::test]
    async fn nonzero_exit_code_is_reported() {
        let outcome = CommandExecutor::default().run("exit 7").await;
        assert_eq!(outcome.exit_code, 7);
    }

    #[tokio::test]
    async fn stderr_is_folded_into_output() {
        let outcome = CommandExecutor::default().run("echo oops 1>&2").await;
        assert!(outcome.output.contains("oops"));
        assert_eq!(outcome.exit_code, 0);
    }

    #[tokio::test]
    async fn timeout_yields_minus_one() {
        let executor = CommandExecutor::new(Duration::from_millis(100));
        let outcome = executor.run("sleep 5").await;
        assert_eq!(outcome.exit_code, -1);
        assert!(outcome.output.contains("timed out"));
    }

    #[tokio::test]
    async fn unknown_command_reports_shell_error() {
        let outcome = CommandExecutor::default()
            .run("definitely-not-a-real-binary-xyz")
            .await;
        // The shell itself spawns fine and reports command-not-found.
        assert_eq!(outcome.exit_code, 127);
        assert!(outcome.output.contains("definitely-not-a-real-binary-xyz"));
    }

    #[tokio::test]
    async fn outcome_timestamp_is_rfc3339() {
        let outcome = CommandExecutor::default().run("true").await;
        // RFC 3339 keeps a 'T' separator and a timezone offset.
        let ts = &outcome.timestamp;
        assert!(ts.contains('T') && (ts.contains('+') || ts.ends_with('Z')));
    }
}
