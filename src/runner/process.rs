//! Spawning external programs under a deadline.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, Command};
use tracing::{debug, warn};

use super::deadline::Deadline;
use super::result::{ProcessOutput, STDERR_TAIL_BYTES};

/// How long to wait for stderr to drain after the process exits.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Argv-style description of one external process.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// File that receives stdout and stderr (appended). Inherited when unset.
    pub log_path: Option<PathBuf>,
    /// Indices into `args` whose values are hidden in [`CommandSpec::display`].
    secret_args: Vec<usize>,
}

impl CommandSpec {
    /// Creates a spec for `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends a `--flag value` pair.
    pub fn flag(self, name: &str, value: impl Into<String>) -> Self {
        self.arg(name).arg(value)
    }

    /// Appends a `--flag value` pair whose value must not be logged.
    pub fn secret_flag(mut self, name: &str, value: impl Into<String>) -> Self {
        self.args.push(name.to_string());
        self.secret_args.push(self.args.len());
        self.args.push(value.into());
        self
    }

    /// Sends the process output to the given file.
    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Returns the value following `flag`, if present.
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }

    /// Shell-like rendering with secret values replaced by `***`.
    pub fn display(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        for (i, arg) in self.args.iter().enumerate() {
            if self.secret_args.contains(&i) {
                parts.push("***".to_string());
            } else {
                parts.push(arg.clone());
            }
        }
        parts.join(" ")
    }
}

/// Errors from launching or waiting on a process.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open log file {path}: {source}")]
    Log {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed waiting for process: {0}")]
    Wait(#[source] std::io::Error),

    #[error("Timed out after {0:?}")]
    DeadlineExceeded(Duration),
}

/// Runs external processes.
///
/// Implementations must return `ProcessError::DeadlineExceeded` once the
/// deadline fires, after making sure the process is no longer running.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec, deadline: &Deadline)
        -> Result<ProcessOutput, ProcessError>;
}

/// [`ProcessRunner`] backed by `tokio::process`.
///
/// On unix the child leads its own process group, and the whole group is
/// killed when the deadline fires.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessRunner;

impl TokioProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(
        &self,
        spec: &CommandSpec,
        deadline: &Deadline,
    ) -> Result<ProcessOutput, ProcessError> {
        let start = Instant::now();

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let stderr_log = match spec.log_path {
            Some(ref path) => {
                let log_err = |source| ProcessError::Log {
                    path: path.clone(),
                    source,
                };
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(log_err)?;
                let stderr_file = file.try_clone().map_err(log_err)?;
                cmd.stdout(Stdio::from(file));
                Some(tokio::fs::File::from_std(stderr_file))
            }
            None => {
                cmd.stdout(Stdio::inherit());
                None
            }
        };

        debug!(command = %spec.display(), "Spawning process");

        let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            program: spec.program.clone(),
            source,
        })?;

        let stderr_reader = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(tee_stderr(stderr, stderr_log)));

        tokio::select! {
            status = child.wait() => {
                let status = status.map_err(ProcessError::Wait)?;
                let stderr = match stderr_reader {
                    Some(handle) => match tokio::time::timeout(STDERR_DRAIN_TIMEOUT, handle).await {
                        Ok(Ok(text)) => text,
                        _ => String::new(),
                    },
                    None => String::new(),
                };
                debug!(program = %spec.program, code = ?status.code(), "Process exited");
                Ok(ProcessOutput::new(status.code(), stderr, start.elapsed()))
            }
            _ = deadline.expired() => {
                warn!(
                    program = %spec.program,
                    ceiling_secs = deadline.ceiling().as_secs(),
                    "Deadline reached, killing process group"
                );
                if let Err(e) = kill_process_group(&child) {
                    warn!(error = %e, "Failed to signal process group");
                }
                if let Err(e) = child.start_kill() {
                    debug!(error = %e, "Failed to signal process");
                }
                let _ = child.wait().await;
                if let Some(handle) = stderr_reader {
                    handle.abort();
                }
                Err(ProcessError::DeadlineExceeded(deadline.ceiling()))
            }
        }
    }
}

/// Copies stderr into the log (or our own stderr) as it arrives and returns
/// its last [`STDERR_TAIL_BYTES`] bytes.
async fn tee_stderr(mut stderr: ChildStderr, mut log: Option<tokio::fs::File>) -> String {
    let mut tail: Vec<u8> = Vec::with_capacity(STDERR_TAIL_BYTES);
    let mut chunk = [0u8; 8192];

    loop {
        let n = match stderr.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        let bytes = &chunk[..n];

        let write_result = match log.as_mut() {
            Some(file) => file.write_all(bytes).await,
            None => tokio::io::stderr().write_all(bytes).await,
        };
        if let Err(e) = write_result {
            if log.is_some() {
                warn!(error = %e, "Failed to write stderr to log, dropping further output");
                log = None;
            }
        }

        tail.extend_from_slice(bytes);
        if tail.len() > STDERR_TAIL_BYTES {
            let excess = tail.len() - STDERR_TAIL_BYTES;
            tail.drain(..excess);
        }
    }

    if let Some(mut file) = log {
        let _ = file.flush().await;
    }
    String::from_utf8_lossy(&tail).into_owned()
}

#[cfg(unix)]
fn kill_process_group(child: &Child) -> std::io::Result<()> {
    let Some(pid) = child.id() else {
        return Ok(());
    };
    // The child was spawned with `process_group(0)`, so its pid is the pgid.
    let result = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
    if result == -1 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            return Err(err);
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn kill_process_group(_: &Child) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_spec_display_redacts_secrets() {
        let spec = CommandSpec::new("python")
            .arg("main.py")
            .secret_flag("--api-key", "sk-secret")
            .flag("--max-rounds", "10");

        let display = spec.display();
        assert_eq!(display, "python main.py --api-key *** --max-rounds 10");
        assert!(!display.contains("sk-secret"));
        assert_eq!(spec.flag_value("--api-key"), Some("sk-secret"));
        assert_eq!(spec.flag_value("--max-rounds"), Some("10"));
        assert_eq!(spec.flag_value("--missing"), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tokio_runner_success() {
        let spec = CommandSpec::new("sh").arg("-c").arg("exit 0");
        let deadline = Deadline::after(Duration::from_secs(30));
        let output = TokioProcessRunner::new().run(&spec, &deadline).await.unwrap();
        assert!(output.is_success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tokio_runner_captures_stderr_on_failure() {
        let spec = CommandSpec::new("sh").arg("-c").arg("echo broken >&2; exit 3");
        let deadline = Deadline::after(Duration::from_secs(30));
        let output = TokioProcessRunner::new().run(&spec, &deadline).await.unwrap();
        assert_eq!(output.exit_code, Some(3));
        assert!(output.stderr.contains("broken"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tokio_runner_kills_on_deadline() {
        let spec = CommandSpec::new("sleep").arg("30");
        let deadline = Deadline::after(Duration::from_millis(100));
        let start = Instant::now();
        let err = TokioProcessRunner::new().run(&spec, &deadline).await.unwrap_err();
        assert!(matches!(err, ProcessError::DeadlineExceeded(_)));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tokio_runner_writes_stderr_to_log_on_success() {
        let temp = tempfile::TempDir::new().unwrap();
        let log = temp.path().join("pipeline.log");
        let spec = CommandSpec::new("sh")
            .arg("-c")
            .arg("echo to-stdout; echo logging-line >&2; exit 0")
            .with_log_path(&log);
        let deadline = Deadline::after(Duration::from_secs(30));
        let output = TokioProcessRunner::new().run(&spec, &deadline).await.unwrap();

        assert!(output.is_success());
        let content = std::fs::read_to_string(&log).unwrap();
        assert!(content.contains("to-stdout"));
        assert!(content.contains("logging-line"));
        assert!(output.stderr.contains("logging-line"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tokio_runner_keeps_bounded_stderr_tail() {
        let temp = tempfile::TempDir::new().unwrap();
        let log = temp.path().join("pipeline.log");
        let spec = CommandSpec::new("sh")
            .arg("-c")
            .arg("i=0; while [ $i -lt 2000 ]; do echo noisy-line-$i >&2; i=$((i+1)); done; echo last-line >&2; exit 2")
            .with_log_path(&log);
        let deadline = Deadline::after(Duration::from_secs(30));
        let output = TokioProcessRunner::new().run(&spec, &deadline).await.unwrap();

        assert_eq!(output.exit_code, Some(2));
        assert!(output.stderr.len() <= STDERR_TAIL_BYTES);
        assert!(output.stderr.contains("last-line"));
        assert!(!output.stderr.contains("noisy-line-0\n"));
        let content = std::fs::read_to_string(&log).unwrap();
        assert!(content.contains("noisy-line-0\n"));
        assert!(content.contains("last-line"));
    }

    /// Zombies left for a non-reaping init count as gone.
    #[cfg(unix)]
    fn is_running(pid: libc::pid_t) -> bool {
        if unsafe { libc::kill(pid, 0) } != 0 {
            return false;
        }
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => !stat
                .rsplit(')')
                .next()
                .is_some_and(|rest| rest.trim_start().starts_with('Z')),
            Err(_) => !std::path::Path::new("/proc/self").exists(),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tokio_runner_kills_grandchildren_on_deadline() {
        let temp = tempfile::TempDir::new().unwrap();
        let log = temp.path().join("pipeline.log");
        let spec = CommandSpec::new("sh")
            .arg("-c")
            .arg("sleep 60 & echo $!; sleep 60")
            .with_log_path(&log);
        let deadline = Deadline::after(Duration::from_millis(300));
        let err = TokioProcessRunner::new().run(&spec, &deadline).await.unwrap_err();
        assert!(matches!(err, ProcessError::DeadlineExceeded(_)));

        let content = std::fs::read_to_string(&log).unwrap();
        let pid: libc::pid_t = content.lines().next().unwrap().trim().parse().unwrap();

        let mut gone = false;
        for _ in 0..50 {
            if !is_running(pid) {
                gone = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(gone, "background child {} survived the deadline", pid);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tokio_runner_writes_stdout_to_log() {
        let temp = tempfile::TempDir::new().unwrap();
        let log = temp.path().join("pipeline.log");
        let spec = CommandSpec::new("sh")
            .arg("-c")
            .arg("echo round-1")
            .with_log_path(&log);
        let deadline = Deadline::after(Duration::from_secs(30));
        let output = TokioProcessRunner::new().run(&spec, &deadline).await.unwrap();
        assert!(output.is_success());
        assert!(std::fs::read_to_string(&log).unwrap().contains("round-1"));
    }

    #[tokio::test]
    async fn test_tokio_runner_spawn_failure() {
        let spec = CommandSpec::new("/definitely/not/a/program");
        let deadline = Deadline::after(Duration::from_secs(30));
        let err = TokioProcessRunner::new().run(&spec, &deadline).await.unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }
}
