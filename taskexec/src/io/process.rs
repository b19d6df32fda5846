//! Child processes with timeouts and bounded output capture.

use std::io::{Read, Write};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Captured output of a finished (or killed) child process.
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Bytes dropped from stdout + stderr because of the capture limit.
    pub truncated_bytes: usize,
    pub timed_out: bool,
}

impl ProcessOutput {
    /// Zero exit code and no timeout.
    pub fn success(&self) -> bool {
        !self.timed_out && self.status.success()
    }

    /// Stdout followed by stderr, lossily decoded.
    pub fn combined(&self) -> String {
        let mut buf = String::from_utf8_lossy(&self.stdout).into_owned();
        if !self.stderr.is_empty() {
            if !buf.is_empty() && !buf.ends_with('\n') {
                buf.push('\n');
            }
            buf.push_str(&String::from_utf8_lossy(&self.stderr));
        }
        if self.truncated_bytes > 0 {
            buf.push_str(&format!("\n[output truncated {} bytes]\n", self.truncated_bytes));
        }
        buf
    }
}

/// Build a `sh -c` command for `script`, running in `workdir`.
pub fn shell_command(script: &str, workdir: &Path) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(script).current_dir(workdir);
    cmd
}

/// Run `cmd`, killing it once `timeout` elapses.
///
/// Stdout and stderr are drained on reader threads while the child runs so a
/// chatty child cannot deadlock on a full pipe. At most `output_limit_bytes`
/// of each stream is kept; the rest is counted and discarded.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<ProcessOutput> {
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // Own process group, so a timeout can take down the whole tree.
        cmd.process_group(0);
    }

    debug!("spawning child process");
    let mut child = cmd.spawn().map_err(|err| {
        error!(err = %err, "failed to spawn command");
        anyhow::Error::new(err).context("spawn command")
    })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    let stdout_handle = thread::spawn(move || read_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_limited(stderr, output_limit_bytes));

    if let Some(input) = stdin {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        // A child that exits without reading stdin closes the pipe early; that
        // is its business, not a launch failure.
        if let Err(err) = child_stdin.write_all(input) {
            warn!(err = %err, "child closed stdin early");
        }
    }

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(timeout_secs = timeout.as_secs(), "command timed out, killing");
            timed_out = true;
            kill_tree(&mut child).context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    let (stdout, stdout_dropped) = join_reader(stdout_handle).context("join stdout")?;
    let (stderr, stderr_dropped) = join_reader(stderr_handle).context("join stderr")?;
    let truncated_bytes = stdout_dropped + stderr_dropped;
    if truncated_bytes > 0 {
        warn!(truncated_bytes, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(ProcessOutput {
        status,
        stdout,
        stderr,
        truncated_bytes,
        timed_out,
    })
}

/// Kill the child and everything in its process group.
///
/// Grandchildren that inherited the output pipes would otherwise keep the
/// reader threads blocked after the child itself is gone.
#[cfg(unix)]
fn kill_tree(child: &mut Child) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let pgid = i32::try_from(child.id()).context("child pid out of range")?;
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(err) => {
            warn!(err = %err, "killpg failed, killing child only");
            child.kill().context("kill child")
        }
    }
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) -> Result<()> {
    child.kill().context("kill child")
}

fn join_reader(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut dropped = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let keep = n.min(limit.saturating_sub(buf.len()));
        buf.extend_from_slice(&chunk[..keep]);
        dropped += n - keep;
    }

    Ok((buf, dropped))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_combined_output_and_exit_code() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cmd = shell_command("echo out; echo err >&2; exit 3", temp.path());
        let output = run_with_timeout(cmd, None, Duration::from_secs(10), 1000).expect("run");

        assert!(!output.success());
        assert_eq!(output.status.code(), Some(3));
        let combined = output.combined();
        assert!(combined.contains("out"));
        assert!(combined.contains("err"));
    }

    #[test]
    fn kills_on_timeout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cmd = shell_command("exec sleep 5", temp.path());
        let output = run_with_timeout(cmd, None, Duration::from_millis(200), 1000).expect("run");
        assert!(output.timed_out);
        assert!(!output.success());
    }

    #[test]
    fn timeout_kills_grandchildren_holding_pipes() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cmd = shell_command("sleep 5; true", temp.path());
        let started = std::time::Instant::now();
        let output = run_with_timeout(cmd, None, Duration::from_millis(300), 1000).expect("run");
        assert!(output.timed_out);
        assert!(started.elapsed() < Duration::from_secs(3), "took {:?}", started.elapsed());
    }

    #[test]
    fn truncates_beyond_limit() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cmd = shell_command("printf 'abcdefghij'", temp.path());
        let output = run_with_timeout(cmd, None, Duration::from_secs(10), 4).expect("run");
        assert_eq!(output.stdout, b"abcd");
        assert_eq!(output.truncated_bytes, 6);
        assert!(output.combined().contains("[output truncated 6 bytes]"));
    }

    #[test]
    fn feeds_stdin() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cmd = shell_command("cat", temp.path());
        let output =
            run_with_timeout(cmd, Some(b"hello".as_slice()), Duration::from_secs(10), 1000).expect("run");
        assert!(output.success());
        assert_eq!(output.stdout, b"hello");
    }

    #[test]
    fn spawn_failure_is_an_error() {
        let cmd = Command::new("/definitely/not/a/binary");
        let err = run_with_timeout(cmd, None, Duration::from_secs(1), 10).unwrap_err();
        assert!(err.to_string().contains("spawn command"));
    }
}
