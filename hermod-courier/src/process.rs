//! Running a helper program with the message on its stdin

use std::{process::Stdio, time::Duration};

use thiserror::Error;
use tokio::{io::AsyncWriteExt, process::Command};

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("failed waiting for {program}: {source}")]
    Wait {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} did not finish within {}s", .timeout.as_secs())]
    Timeout { program: String, timeout: Duration },
}

/// How a program that ran to completion ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exit {
    /// `None` if the process was killed by a signal
    pub code: Option<i32>,
    /// Trailing stderr, trimmed, for failure reports
    pub stderr: String,
}

impl Exit {
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.code, Some(0))
    }
}

const STDERR_TAIL: usize = 512;

/// Run `program` directly (no shell) with `input` on stdin.
///
/// The child is killed if it outlives `timeout`. A child that exits without
/// reading all of its input is not an error; only the exit status counts.
///
/// # Errors
/// If the program cannot be started, cannot be waited on, or times out
pub async fn run(
    program: &str,
    args: &[String],
    envs: &[(&str, &str)],
    input: &[u8],
    timeout: Duration,
) -> Result<Exit, ProcessError> {
    let mut child = Command::new(program)
        .args(args)
        .envs(envs.iter().copied())
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ProcessError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let stdin = child.stdin.take();
    let feed = async move {
        if let Some(mut stdin) = stdin {
            // A closed pipe just means the program didn't want the rest
            let _ = stdin.write_all(input).await;
            let _ = stdin.shutdown().await;
        }
    };

    let (_, output) = tokio::time::timeout(timeout, async {
        tokio::join!(feed, child.wait_with_output())
    })
    .await
    .map_err(|_| ProcessError::Timeout {
        program: program.to_string(),
        timeout,
    })?;

    let output = output.map_err(|source| ProcessError::Wait {
        program: program.to_string(),
        source,
    })?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    let tail_start = stderr
        .char_indices()
        .rev()
        .nth(STDERR_TAIL)
        .map_or(0, |(i, _)| i);

    Ok(Exit {
        code: output.status.code(),
        stderr: stderr[tail_start..].to_string(),
    })
}
