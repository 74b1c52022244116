//! Process-runner interface: spawn a child process with streamed stdin/stdout/
//! stderr, wait cooperatively, and optionally capture output.
//!
//! Each call spawns up to three cooperative tasks, one per pipe: a writer for
//! stdin (if any bytes are supplied), and a reader each for stdout/stderr that
//! either accumulate into a buffer or simply drain the pipe so the child never
//! blocks writing to a full one. The parent awaits the child's exit status and
//! joins the pipe tasks before returning.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{Result, WalkError};

/// What to feed the child's stdin.
#[derive(Debug, Default)]
pub enum Stdin {
    #[default]
    None,
    Bytes(Vec<u8>),
}

/// How to handle one of the child's output streams.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StreamMode {
    /// Share the parent's stream (the default for stderr in interactive use).
    #[default]
    Inherit,
    /// Discard silently.
    Null,
    /// Accumulate into a buffer, returned from `run`.
    Capture,
}

fn to_std_stdio(mode: StreamMode) -> std::process::Stdio {
    match mode {
        StreamMode::Inherit => std::process::Stdio::inherit(),
        StreamMode::Null => std::process::Stdio::null(),
        StreamMode::Capture => std::process::Stdio::piped(),
    }
}

#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: Option<Vec<u8>>,
    pub stderr: Option<Vec<u8>>,
}

impl ProcessOutput {
    pub fn stdout_string(&self) -> String {
        self.stdout
            .as_deref()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default()
    }
}

/// A child-process invocation: argument tokens plus an optional redacted form
/// of them used only for logging (`safe_args`), so credentials embedded in a
/// real argument never reach a log line.
#[derive(Debug, Clone)]
pub struct ProcessCommand {
    program: String,
    args: Vec<String>,
    safe_args: Option<Vec<String>>,
    cwd: Option<PathBuf>,
    env: Vec<(String, String)>,
    timeout: Option<Duration>,
}

impl ProcessCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            safe_args: None,
            cwd: None,
            env: Vec::new(),
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Record a redacted view of the arguments for logging. Must have the
    /// same length as the real argument list.
    pub fn safe_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.safe_args = Some(args.into_iter().map(Into::into).collect());
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The command line as it should appear in logs: `safe_args` if set, the
    /// real arguments otherwise.
    pub fn display_args(&self) -> String {
        let args = self.safe_args.as_ref().unwrap_or(&self.args);
        format!("{} {}", self.program, args.join(" "))
    }

    async fn spawn_and_wait(
        &self,
        stdin: Stdin,
        stdout_mode: StreamMode,
        stderr_mode: StreamMode,
    ) -> Result<ProcessOutput> {
        tracing::debug!(command = %self.display_args(), "spawning child process");

        let mut command = tokio::process::Command::new(&self.program);
        command.args(&self.args);
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }
        for (key, value) in &self.env {
            command.env(key, value);
        }
        command.stdin(match &stdin {
            Stdin::None => std::process::Stdio::null(),
            Stdin::Bytes(_) => std::process::Stdio::piped(),
        });
        command.stdout(to_std_stdio(stdout_mode));
        command.stderr(to_std_stdio(stderr_mode));

        let mut child = command.spawn().map_err(|source| WalkError::Spawn {
            command: self.display_args(),
            source,
        })?;

        let stdin_task = match stdin {
            Stdin::Bytes(bytes) => {
                let mut pipe = child.stdin.take().expect("stdin was piped");
                Some(tokio::spawn(async move {
                    let _ = pipe.write_all(&bytes).await;
                    let _ = pipe.shutdown().await;
                }))
            }
            Stdin::None => None,
        };

        let stdout_task = child
            .stdout
            .take()
            .map(|mut pipe| tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf).await;
                buf
            }));
        let stderr_task = child
            .stderr
            .take()
            .map(|mut pipe| tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf).await;
                buf
            }));

        let wait = child.wait();
        let status = match self.timeout {
            Some(duration) => tokio::time::timeout(duration, wait)
                .await
                .map_err(|_| WalkError::Timeout {
                    command: self.display_args(),
                    seconds: duration.as_secs_f64(),
                })?
                .map_err(|source| WalkError::Wait {
                    command: self.display_args(),
                    source,
                })?,
            None => wait.await.map_err(|source| WalkError::Wait {
                command: self.display_args(),
                source,
            })?,
        };

        if let Some(task) = stdin_task {
            let _ = task.await;
        }
        let stdout = match stdout_task {
            Some(task) => Some(task.await.unwrap_or_default()),
            None => None,
        };
        let stderr = match stderr_task {
            Some(task) => Some(task.await.unwrap_or_default()),
            None => None,
        };

        Ok(ProcessOutput {
            status,
            stdout,
            stderr,
        })
    }

    /// Run the command, failing if it exits non-zero unless `check` is false.
    pub async fn run(
        &self,
        stdin: Stdin,
        stdout_mode: StreamMode,
        stderr_mode: StreamMode,
        check: bool,
    ) -> Result<ProcessOutput> {
        let output = self.spawn_and_wait(stdin, stdout_mode, stderr_mode).await?;
        if check && !output.status.success() {
            return Err(WalkError::NonZeroExit {
                command: self.display_args(),
                status: output.status.code().unwrap_or(-1),
                stdout: output.stdout.as_deref().map(|b| String::from_utf8_lossy(b).into_owned()),
            });
        }
        Ok(output)
    }

    /// Run with stdout captured, returning it as a string. On failure the
    /// captured stdout is attached to the error.
    pub async fn run_capturing_out(&self, stdin: Stdin) -> Result<String> {
        let output = self
            .run(stdin, StreamMode::Capture, StreamMode::Capture, true)
            .await?;
        Ok(output.stdout_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout() {
        let cmd = ProcessCommand::new("printf").arg("hello");
        let out = cmd.run_capturing_out(Stdin::None).await.unwrap();
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn non_zero_exit_is_an_error_when_checked() {
        let cmd = ProcessCommand::new("false");
        let err = cmd
            .run(Stdin::None, StreamMode::Null, StreamMode::Null, true)
            .await
            .unwrap_err();
        assert!(matches!(err, WalkError::NonZeroExit { .. }));
    }

    #[tokio::test]
    async fn non_zero_exit_is_tolerated_when_unchecked() {
        let cmd = ProcessCommand::new("false");
        let out = cmd
            .run(Stdin::None, StreamMode::Null, StreamMode::Null, false)
            .await
            .unwrap();
        assert!(!out.status.success());
    }

    #[tokio::test]
    async fn stdin_bytes_are_forwarded() {
        let cmd = ProcessCommand::new("cat");
        let out = cmd
            .run(
                Stdin::Bytes(b"piped in".to_vec()),
                StreamMode::Capture,
                StreamMode::Null,
                true,
            )
            .await
            .unwrap();
        assert_eq!(out.stdout_string(), "piped in");
    }

    #[test]
    fn safe_args_redacts_log_display() {
        let cmd = ProcessCommand::new("curl")
            .arg("--token")
            .arg("super-secret")
            .safe_args(["--token", "***"]);
        assert_eq!(cmd.display_args(), "curl --token ***");
    }
}
