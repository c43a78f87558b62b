use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};

use super::{required_tool_string, ToolHandler};
use crate::types::ToolPayload;

pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// The interpreter a command string is handed to, e.g. `sh -c <command>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ShellCommand {
    pub fn platform_default() -> Self {
        if cfg!(windows) {
            Self::parse("powershell -NoProfile -Command")
        } else {
            Self::parse("sh -c")
        }
        .unwrap_or_else(|| Self {
            program: "sh".to_string(),
            args: vec!["-c".to_string()],
        })
    }

    /// Splits a whitespace-separated prefix; `None` when it is blank.
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }
}

/// `run_command`: runs a command through the configured shell.
#[derive(Debug, Clone)]
pub struct ShellTool {
    shell: ShellCommand,
    timeout: Duration,
}

impl ShellTool {
    pub fn new(shell: ShellCommand) -> Self {
        Self {
            shell,
            timeout: COMMAND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Waits for the command and for both pipes to close, all under one
    /// deadline. Anything still alive in the command's process group when the
    /// deadline passes is killed, including backgrounded children.
    async fn run(&self, command: &str) -> Result<String> {
        let mut process = Command::new(&self.shell.program);
        process
            .args(&self.shell.args)
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        process.process_group(0);

        let child = process
            .spawn()
            .with_context(|| format!("Failed to start shell '{}'", self.shell.program))?;
        let mut guard = ChildGuard::new(child);
        let mut stdout = guard
            .child
            .stdout
            .take()
            .context("Failed to capture command stdout")?;
        let mut stderr = guard
            .child
            .stderr
            .take()
            .context("Failed to capture command stderr")?;

        let collect = async {
            let mut out = Vec::new();
            let mut err = Vec::new();
            let (read_out, read_err) =
                tokio::join!(stdout.read_to_end(&mut out), stderr.read_to_end(&mut err));
            read_out.context("Failed to read command stdout")?;
            read_err.context("Failed to read command stderr")?;
            let status = guard
                .child
                .wait()
                .await
                .context("Failed to wait for command")?;
            Ok::<_, anyhow::Error>((status, out, err))
        };

        let outcome = tokio::time::timeout(self.timeout, collect).await;
        match outcome {
            Ok(collected) => {
                let (status, out, err) = collected?;
                guard.disarm();
                Ok(render_output(
                    &String::from_utf8_lossy(&out),
                    &String::from_utf8_lossy(&err),
                    status.code(),
                ))
            }
            Err(_) => {
                tracing::warn!(command, timeout = ?self.timeout, "command timed out");
                drop(guard);
                Ok(format!(
                    "Error: Command timed out after {} seconds.",
                    self.timeout.as_secs()
                ))
            }
        }
    }
}

impl ToolHandler for ShellTool {
    fn execute(&self, arguments: &Value) -> Result<ToolPayload> {
        let command = required_tool_string(arguments, "run_command", "command")?;
        tracing::info!(command, shell = %self.shell.program, "running command");
        block_on(self.run(command))?.map(ToolPayload::Text)
    }

    fn activity(&self, arguments: &Value) -> Option<String> {
        let command = arguments.get("command")?.as_str()?;
        Some(format!("Running: {command}"))
    }
}

/// Executors run on the blocking pool, which can re-enter the runtime that
/// owns it. Outside any runtime (plain unit tests) a private one is built.
fn block_on<F: Future>(future: F) -> Result<F::Output> {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => Ok(handle.block_on(future)),
        Err(_) => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("Failed to start command runtime")?;
            Ok(runtime.block_on(future))
        }
    }
}

/// Kills the child, and on Unix its whole process group, unless disarmed.
struct ChildGuard {
    child: Child,
    #[cfg(unix)]
    process_group: Option<u32>,
    armed: bool,
}

impl ChildGuard {
    fn new(child: Child) -> Self {
        Self {
            #[cfg(unix)]
            process_group: child.id(),
            child,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        #[cfg(unix)]
        if let Some(group) = self.process_group.and_then(|pid| libc::pid_t::try_from(pid).ok()) {
            // SAFETY: killpg only signals processes; the group was created for this child.
            unsafe {
                libc::killpg(group, libc::SIGKILL);
            }
        }
        let _ = self.child.start_kill();
        let _ = self.child.try_wait();
    }
}

/// stdout, then a `STDERR:` section, then the exit code when it is not zero.
fn render_output(stdout: &str, stderr: &str, code: Option<i32>) -> String {
    let mut output = String::from(stdout);
    if !stderr.is_empty() {
        output.push_str("\nSTDERR:\n");
        output.push_str(stderr);
    }
    match code {
        Some(0) => {}
        Some(code) => output.push_str(&format!("\n[Exit code: {code}]")),
        None => output.push_str("\n[Terminated by signal]"),
    }

    let trimmed = output.trim();
    if trimmed.is_empty() {
        "[No output]".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Instant;

    #[test]
    fn test_render_output_sections() {
        assert_eq!(render_output("", "", Some(0)), "[No output]");
        assert_eq!(render_output("hello\n", "", Some(0)), "hello");
        assert_eq!(
            render_output("partial\n", "boom\n", Some(2)),
            "partial\n\nSTDERR:\nboom\n\n[Exit code: 2]"
        );
    }

    #[test]
    fn test_shell_command_parse() {
        assert_eq!(
            ShellCommand::parse("powershell -NoProfile -Command"),
            Some(ShellCommand {
                program: "powershell".to_string(),
                args: vec!["-NoProfile".to_string(), "-Command".to_string()],
            })
        );
        assert_eq!(ShellCommand::parse("   "), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_runs_command_and_reports_exit_code() {
        let tool = ShellTool::new(ShellCommand::parse("sh -c").unwrap());
        let payload = tool
            .execute(&json!({"command": "echo out; echo err 1>&2; exit 3"}))
            .unwrap();
        assert_eq!(
            payload,
            ToolPayload::text("out\n\nSTDERR:\nerr\n\n[Exit code: 3]")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_the_command() {
        let tool = ShellTool::new(ShellCommand::parse("sh -c").unwrap())
            .with_timeout(Duration::from_millis(200));
        let started = Instant::now();
        let payload = tool.execute(&json!({"command": "sleep 5"})).unwrap();
        assert!(started.elapsed() < Duration::from_secs(4));
        assert!(payload.as_text().starts_with("Error: Command timed out after"));
    }

    #[cfg(unix)]
    #[test]
    fn test_backgrounded_child_cannot_hold_the_command_open() {
        let tool = ShellTool::new(ShellCommand::parse("sh -c").unwrap())
            .with_timeout(Duration::from_millis(300));
        let started = Instant::now();
        let payload = tool
            .execute(&json!({"command": "sleep 4 & echo hi"}))
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(payload.as_text().starts_with("Error: Command timed out after"));
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread")]
    async fn test_runs_on_the_blocking_pool_of_the_current_runtime() {
        let tool = ShellTool::new(ShellCommand::parse("sh -c").unwrap());
        let payload =
            tokio::task::spawn_blocking(move || tool.execute(&json!({"command": "echo pooled"})))
                .await
                .unwrap()
                .unwrap();
        assert_eq!(payload, ToolPayload::text("pooled"));
    }

    #[test]
    fn test_missing_shell_is_an_error() {
        let tool = ShellTool::new(ShellCommand::parse("definitely-not-a-shell-xyz -c").unwrap());
        let err = tool.execute(&json!({"command": "echo hi"})).unwrap_err();
        assert!(err.to_string().contains("Failed to start shell"));
    }
}
