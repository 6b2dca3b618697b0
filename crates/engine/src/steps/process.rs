//! Child process execution shared by the built-in steps.

use std::{path::Path, process::Stdio};

use anyhow::{Context, Result, anyhow};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::Command,
};
use tracing::debug;

/// Captured result of a finished child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, or `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Exit code rendered for error messages.
    pub fn code_label(&self) -> String {
        self.code.map_or_else(|| "signal".to_string(), |code| code.to_string())
    }
}

/// Spawn `argv` without a shell, capturing both streams line by line.
///
/// With `stream_output`, every line of either stream is echoed to this process's stderr as it
/// arrives. Stdout stays reserved for the caller's own output.
pub(crate) async fn run_process<I, K, V>(argv: &[String], directory: Option<&Path>, env: I, stream_output: bool) -> Result<ProcessOutput>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<std::ffi::OsStr>,
    V: AsRef<std::ffi::OsStr>,
{
    let (program, arguments) = argv.split_first().ok_or_else(|| anyhow!("no command given"))?;

    let mut command = Command::new(program);
    command
        .args(arguments)
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(directory) = directory {
        command.current_dir(directory);
    }

    debug!(program = %program, arguments = arguments.len(), directory = ?directory, "spawning process");
    let mut child = command.spawn().with_context(|| format!("failed to start '{program}'"))?;
    let stdout = child.stdout.take().ok_or_else(|| anyhow!("stdout of '{program}' was not captured"))?;
    let stderr = child.stderr.take().ok_or_else(|| anyhow!("stderr of '{program}' was not captured"))?;

    let (stdout, stderr) = tokio::try_join!(
        collect_lines(stdout, stream_output),
        collect_lines(stderr, stream_output),
    )
    .with_context(|| format!("failed to read output of '{program}'"))?;
    let status = child.wait().await.with_context(|| format!("failed to wait for '{program}'"))?;

    debug!(program = %program, code = ?status.code(), "process exited");
    Ok(ProcessOutput {
        stdout,
        stderr,
        code: status.code(),
    })
}

async fn collect_lines<R>(reader: R, echo: bool) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut collected = Vec::new();
    while let Some(line) = lines.next_line().await? {
        if echo {
            eprintln!("{line}");
        }
        collected.push(line);
    }
    Ok(collected.join("\n"))
}
