//! Results of external process runs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Maximum number of stderr bytes kept from a process.
pub const STDERR_TAIL_BYTES: usize = 4000;

/// Outcome of a process that ran to completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessOutput {
    /// Exit code, or `None` if the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Captured standard error (tail only).
    pub stderr: String,
    /// Wall-clock duration of the process.
    pub duration: Duration,
}

impl ProcessOutput {
    /// Creates a new process output, keeping only the tail of `stderr`.
    pub fn new(exit_code: Option<i32>, stderr: impl Into<String>, duration: Duration) -> Self {
        Self {
            exit_code,
            stderr: tail_string(stderr.into(), STDERR_TAIL_BYTES),
            duration,
        }
    }

    /// Convenience constructor for a clean exit.
    pub fn success(duration: Duration) -> Self {
        Self::new(Some(0), String::new(), duration)
    }

    /// Returns true if the process exited with code 0.
    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// One-line description of a failed exit, suitable for reports.
    pub fn failure_detail(&self) -> String {
        let status = match self.exit_code {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        };
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            format!("Process exited with {}", status)
        } else {
            format!("Process exited with {}: {}", status, stderr)
        }
    }
}

/// Keeps at most the last `max_len` bytes of a string, on a char boundary.
fn tail_string(s: String, max_len: usize) -> String {
    if s.len() <= max_len {
        return s;
    }
    let mut start = s.len() - max_len;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    format!("[truncated] ...{}", &s[start..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_output_success() {
        let output = ProcessOutput::success(Duration::from_secs(1));
        assert!(output.is_success());
        assert!(output.stderr.is_empty());
    }

    #[test]
    fn test_failure_detail() {
        let output = ProcessOutput::new(Some(2), "Traceback: boom\n", Duration::ZERO);
        assert!(!output.is_success());
        assert_eq!(output.failure_detail(), "Process exited with exit code 2: Traceback: boom");

        let output = ProcessOutput::new(None, "", Duration::ZERO);
        assert_eq!(output.failure_detail(), "Process exited with terminated by signal");
    }

    #[test]
    fn test_stderr_keeps_tail() {
        let long = format!("{}END", "x".repeat(STDERR_TAIL_BYTES * 2));
        let output = ProcessOutput::new(Some(1), long, Duration::ZERO);
        assert!(output.stderr.ends_with("END"));
        assert!(output.stderr.starts_with("[truncated]"));
        assert!(output.stderr.len() < STDERR_TAIL_BYTES + 32);
    }

    #[test]
    fn test_tail_respects_char_boundaries() {
        let s = "é".repeat(10);
        let tail = tail_string(s, 5);
        assert!(tail.ends_with("éé"));
    }
}
