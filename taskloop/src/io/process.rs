//! Child processes with a deadline and capped output capture.
//!
//! Used by the `run_command` tool and the command-backed oracle.

use std::io::{self, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// Deadline and per-stream capture cap for one child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub timeout: Duration,
    pub output_bytes: usize,
}

/// Bytes kept from one stream plus the count of bytes drained past the cap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capture {
    pub bytes: Vec<u8>,
    pub dropped: u64,
}

impl Capture {
    pub fn lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Capture,
    pub stderr: Capture,
    pub timed_out: bool,
}

impl CommandOutput {
    /// Exited on its own with status 0.
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.status.success()
    }
}

/// Spawn `cmd`, optionally feed `input` on stdin, and wait up to the deadline.
///
/// Both pipes are drained on their own threads from the moment the child
/// starts, so a chatty child never blocks on a full pipe. A child still
/// running at the deadline is killed and reported with `timed_out`.
#[instrument(skip_all, fields(timeout_ms = limits.timeout.as_millis() as u64))]
pub fn run_bounded(mut cmd: Command, input: Option<&[u8]>, limits: Limits) -> Result<CommandOutput> {
    cmd.stdin(if input.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());

    let mut child = cmd.spawn().context("spawn command")?;
    let stdout = drain(child.stdout.take(), limits.output_bytes)?;
    let stderr = drain(child.stderr.take(), limits.output_bytes)?;
    debug!(pid = child.id(), "child started");

    if let Some(input) = input {
        feed(&mut child, input)?;
    }

    let (status, timed_out) = match child.wait_timeout(limits.timeout).context("wait for command")? {
        Some(status) => (status, false),
        None => {
            warn!("deadline passed, killing child");
            child.kill().context("kill command")?;
            (child.wait().context("reap killed command")?, true)
        }
    };

    let stdout = collect(stdout).context("collect stdout")?;
    let stderr = collect(stderr).context("collect stderr")?;
    if stdout.dropped > 0 || stderr.dropped > 0 {
        warn!(
            stdout_dropped = stdout.dropped,
            stderr_dropped = stderr.dropped,
            "output capped"
        );
    }
    debug!(exit_code = ?status.code(), timed_out, "child finished");

    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        timed_out,
    })
}

/// Write all of `input` and close stdin. A child that exits early may refuse
/// the rest; that is not an error.
fn feed(child: &mut Child, input: &[u8]) -> Result<()> {
    let mut pipe = child
        .stdin
        .take()
        .ok_or_else(|| anyhow!("stdin was not piped"))?;
    if let Err(err) = pipe.write_all(input) {
        warn!(err = %err, "child closed stdin early");
    }
    Ok(())
}

fn drain<R>(stream: Option<R>, cap: usize) -> Result<JoinHandle<io::Result<Capture>>>
where
    R: Read + Send + 'static,
{
    let mut stream = stream.ok_or_else(|| anyhow!("output was not piped"))?;
    Ok(thread::spawn(move || {
        let mut capture = Capture::default();
        stream
            .by_ref()
            .take(cap as u64)
            .read_to_end(&mut capture.bytes)?;
        capture.dropped = io::copy(&mut stream, &mut io::sink())?;
        Ok(capture)
    }))
}

fn collect(handle: JoinHandle<io::Result<Capture>>) -> Result<Capture> {
    handle
        .join()
        .map_err(|_| anyhow!("output reader panicked"))?
        .context("read output")
}
