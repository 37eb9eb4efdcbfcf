// Process runner for external tools (yt-dlp)

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command as TokioCommand};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::errors::ProcessError;
use super::traits::{CommandRunner, StdoutSink};

/// Buffered result of a one-shot run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

/// How a supervised process ended when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisedOutcome {
    Completed,
    Cancelled,
}

/// Handle to a running supervised process
pub struct SupervisedProcess {
    program: String,
    task: JoinHandle<Result<SupervisedOutcome, ProcessError>>,
}

impl SupervisedProcess {
    /// Wrap the task that drives the child to completion
    pub fn new(
        program: impl Into<String>,
        task: JoinHandle<Result<SupervisedOutcome, ProcessError>>,
    ) -> Self {
        Self {
            program: program.into(),
            task,
        }
    }

    /// Wait for the process to exit (or be killed)
    pub async fn wait(self) -> Result<SupervisedOutcome, ProcessError> {
        let program = self.program;
        self.task.await.map_err(|e| ProcessError::Io {
            program,
            source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
        })?
    }
}

/// Default runner backed by `tokio::process`
#[derive(Debug, Default, Clone)]
pub struct TokioRunner;

impl TokioRunner {
    pub fn new() -> Self {
        Self
    }
}

fn command(program: &Path, args: &[String]) -> TokioCommand {
    let mut cmd = TokioCommand::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // Own process group so a cancel reaches ffmpeg and other helpers yt-dlp spawns
    #[cfg(unix)]
    cmd.process_group(0);

    #[cfg(windows)]
    {
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }

    cmd
}

fn spawn_error(program: &Path, source: std::io::Error) -> ProcessError {
    ProcessError::Spawn {
        program: program.display().to_string(),
        source,
    }
}

/// Split off everything up to the last line terminator (`\n` or `\r`).
///
/// yt-dlp rewrites progress with `\r` unless `--newline` is given, so both
/// count as boundaries. Bytes are only decoded once a line is complete, so a
/// UTF-8 sequence split across reads stays intact.
fn take_complete_lines(pending: &mut Vec<u8>) -> Option<String> {
    let cut = pending.iter().rposition(|&b| b == b'\n' || b == b'\r')? + 1;
    let rest = pending.split_off(cut);
    let lines = std::mem::replace(pending, rest);
    Some(String::from_utf8_lossy(&lines).into_owned())
}

/// Kill the child and everything it spawned.
///
/// On unix the child leads its own process group, so the whole group gets
/// SIGKILL. On Windows `taskkill /T` walks the tree.
async fn kill_tree(child: &mut Child, program: &str) {
    if let Some(pid) = child.id() {
        #[cfg(unix)]
        {
            // SAFETY: plain syscall, a negative pid addresses the process group
            let rc = unsafe { libc::kill(-(pid as libc::pid_t), libc::SIGKILL) };
            if rc != 0 {
                debug!(
                    "failed to signal process group of {}: {}",
                    program,
                    std::io::Error::last_os_error()
                );
            }
        }

        #[cfg(windows)]
        {
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            let status = TokioCommand::new("taskkill")
                .args(["/F", "/T", "/PID", &pid.to_string()])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .creation_flags(CREATE_NO_WINDOW)
                .status()
                .await;
            if let Err(e) = status {
                debug!("taskkill failed for {}: {}", program, e);
            }
        }
    }

    // Reaps the direct child; also covers a failed group signal
    if let Err(e) = child.kill().await {
        warn!("failed to kill {}: {}", program, e);
    }
}

#[async_trait]
impl CommandRunner for TokioRunner {
    async fn run(&self, program: &Path, args: &[String]) -> Result<ProcessOutput, ProcessError> {
        debug!("running {} {:?}", program.display(), args);

        let child = command(program, args)
            .spawn()
            .map_err(|e| spawn_error(program, e))?;

        let output = child.wait_with_output().await.map_err(|source| ProcessError::Io {
            program: program.display().to_string(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(ProcessError::from_exit(output.status.code(), &stderr));
        }

        Ok(ProcessOutput {
            stdout,
            stderr,
            exit_code: output.status.code(),
        })
    }

    fn run_supervised(
        &self,
        program: &Path,
        args: &[String],
        mut on_stdout: StdoutSink,
        cancel: CancellationToken,
    ) -> Result<SupervisedProcess, ProcessError> {
        let label = program.display().to_string();
        debug!("starting supervised {} {:?}", label, args);

        let mut child = command(program, args)
            .spawn()
            .map_err(|e| spawn_error(program, e))?;

        let missing_pipe = |name: &str| ProcessError::Io {
            program: label.clone(),
            source: std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                format!("failed to capture {}", name),
            ),
        };
        let mut stdout_pipe = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        let mut stderr_pipe = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

        let reader_token = cancel.clone();
        let stdout_task = tokio::spawn(async move {
            let mut buf = [0u8; 4096];
            let mut pending: Vec<u8> = Vec::new();
            loop {
                let read = tokio::select! {
                    biased;
                    _ = reader_token.cancelled() => return,
                    read = stdout_pipe.read(&mut buf) => read,
                };
                match read {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        pending.extend_from_slice(&buf[..n]);
                        if reader_token.is_cancelled() {
                            return;
                        }
                        if let Some(lines) = take_complete_lines(&mut pending) {
                            on_stdout(&lines);
                        }
                    }
                }
            }
            if !pending.is_empty() && !reader_token.is_cancelled() {
                on_stdout(&String::from_utf8_lossy(&pending));
            }
        });

        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr_pipe.read_to_end(&mut buf).await;
            String::from_utf8_lossy(&buf).into_owned()
        });

        let program_name = label.clone();
        let task = tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = cancel.cancelled() => {
                    kill_tree(&mut child, &program_name).await;
                    let _ = stdout_task.await;
                    stderr_task.abort();
                    debug!("{} cancelled", program_name);
                    return Ok(SupervisedOutcome::Cancelled);
                }
            };

            let status = status.map_err(|source| ProcessError::Io {
                program: program_name.clone(),
                source,
            })?;
            let _ = stdout_task.await;
            let stderr = stderr_task.await.unwrap_or_default();

            // A cancel that raced with the exit still wins
            if cancel.is_cancelled() {
                return Ok(SupervisedOutcome::Cancelled);
            }

            debug!("{} exited with {:?}", program_name, status.code());
            if status.success() {
                Ok(SupervisedOutcome::Completed)
            } else {
                Err(ProcessError::from_exit(status.code(), &stderr))
            }
        });

        Ok(SupervisedProcess::new(label, task))
    }
}
