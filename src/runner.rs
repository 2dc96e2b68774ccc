// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Shell command execution with streamed output capture, stdin feeding,
//! timeout escalation, and cooperative early termination.
//!
//! Every failure mode is encoded in the returned [`CommandResult`]; `run`
//! never fails at the type level, so batch callers iterating over many hosts
//! do not need to special-case spawn errors.

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio_util::sync::CancellationToken;

/// Upper bound on stdin bytes handed to the child per loop iteration.
const STDIN_CHUNK: usize = 512;

/// Cadence at which the timeout and quit token are re-checked while the
/// child is quiet.
const POLL_TICK: Duration = Duration::from_secs(1);

/// Grace period between SIGTERM and SIGKILL when a command overruns.
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Bound on the post-exit drain of a pipe that a straggling grandchild may
/// still hold open.
const DRAIN_LIMIT: Duration = Duration::from_secs(1);

/// Outcome of one shell command invocation.
///
/// `exit_status` is `None` only when the process died from a signal without
/// an OS-reported code. A spawn failure is encoded as `Some(-1)` with the
/// reason in `stderr`.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    pub timed_out: bool,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_status == Some(0)
    }

    pub(crate) fn spawn_failure(message: impl Into<String>, started: Instant) -> Self {
        Self {
            exit_status: Some(-1),
            stdout: String::new(),
            stderr: message.into(),
            duration: started.elapsed(),
            timed_out: false,
        }
    }
}

/// One command invocation. Owned by the caller; nothing is retained once
/// [`run`] returns.
pub struct RunRequest {
    pub command: String,
    pub timeout: Option<Duration>,
    pub stdin: Option<Vec<u8>>,
    pub stdout_sink: Option<Box<dyn AsyncWrite + Send + Unpin>>,
    pub stderr_sink: Option<Box<dyn AsyncWrite + Send + Unpin>>,
    pub capture_stdout: bool,
    pub capture_stderr: bool,
    pub quit: Option<CancellationToken>,
    pub flush_each_chunk: bool,
}

impl RunRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            timeout: None,
            stdin: None,
            stdout_sink: None,
            stderr_sink: None,
            capture_stdout: true,
            capture_stderr: true,
            quit: None,
            flush_each_chunk: false,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn stdin(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(data.into());
        self
    }

    pub fn stdout_sink(mut self, sink: Box<dyn AsyncWrite + Send + Unpin>) -> Self {
        self.stdout_sink = Some(sink);
        self
    }

    pub fn stderr_sink(mut self, sink: Box<dyn AsyncWrite + Send + Unpin>) -> Self {
        self.stderr_sink = Some(sink);
        self
    }

    pub fn capture(mut self, stdout: bool, stderr: bool) -> Self {
        self.capture_stdout = stdout;
        self.capture_stderr = stderr;
        self
    }

    pub fn quit(mut self, token: CancellationToken) -> Self {
        self.quit = Some(token);
        self
    }

    pub fn flush_each_chunk(mut self, flush: bool) -> Self {
        self.flush_each_chunk = flush;
        self
    }
}

/// Why the multiplexing loop stopped.
enum LoopExit {
    Exited(Option<i32>),
    QuitRequested,
    TimedOut,
}

/// Run a command through `/bin/sh -c`, multiplexing stdout/stderr reads and
/// bounded stdin writes in one loop, with the timeout and quit token checked
/// once per tick.
pub async fn run(mut request: RunRequest) -> CommandResult {
    let started = Instant::now();

    // A NUL byte can never reach execve; degrade to an error result instead
    // of letting spawn fail with a less useful message.
    if request.command.contains('\0') {
        return CommandResult::spawn_failure(
            "command rejected: contains an interior NUL byte",
            started,
        );
    }

    let mut cmd = Command::new("/bin/sh");
    cmd.arg("-c")
        .arg(&request.command)
        .stdin(if request.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // Own process group so the whole tree can be signalled on overrun.
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            return CommandResult::spawn_failure(format!("failed to spawn shell: {e}"), started)
        }
    };

    let mut stdout_pipe = match child.stdout.take() {
        Some(pipe) => pipe,
        None => return CommandResult::spawn_failure("child stdout unavailable", started),
    };
    let mut stderr_pipe = match child.stderr.take() {
        Some(pipe) => pipe,
        None => return CommandResult::spawn_failure("child stderr unavailable", started),
    };
    let mut stdin_pipe = child.stdin.take();
    let mut stdin_open = stdin_pipe.is_some();
    let stdin_data = request.stdin.take().unwrap_or_default();
    let mut stdin_offset = 0usize;

    let mut stdout_buf: Vec<u8> = Vec::new();
    let mut stderr_buf: Vec<u8> = Vec::new();
    let mut stdout_chunk = [0u8; 8192];
    let mut stderr_chunk = [0u8; 8192];
    let mut stdout_done = false;
    let mut stderr_done = false;

    // An absurdly large timeout degrades to "no deadline" instead of
    // overflowing Instant arithmetic.
    let deadline = request.timeout.and_then(|t| started.checked_add(t));
    let mut tick = tokio::time::interval(POLL_TICK);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut exit = None;
    while exit.is_none() {
        tokio::select! {
            read = stdout_pipe.read(&mut stdout_chunk), if !stdout_done => {
                match read {
                    Ok(0) | Err(_) => stdout_done = true,
                    Ok(n) => {
                        consume_chunk(
                            &stdout_chunk[..n],
                            &mut stdout_buf,
                            request.capture_stdout,
                            request
                                .stdout_sink
                                .as_mut()
                                .map(|s| &mut **s as &mut (dyn AsyncWrite + Send + Unpin)),
                            request.flush_each_chunk,
                        )
                        .await
                    }
                }
            }
            read = stderr_pipe.read(&mut stderr_chunk), if !stderr_done => {
                match read {
                    Ok(0) | Err(_) => stderr_done = true,
                    Ok(n) => {
                        consume_chunk(
                            &stderr_chunk[..n],
                            &mut stderr_buf,
                            request.capture_stderr,
                            request
                                .stderr_sink
                                .as_mut()
                                .map(|s| &mut **s as &mut (dyn AsyncWrite + Send + Unpin)),
                            request.flush_each_chunk,
                        )
                        .await
                    }
                }
            }
            fed = feed_stdin(&mut stdin_pipe, &stdin_data, &mut stdin_offset), if stdin_open => {
                match fed {
                    Ok(exhausted) => stdin_open = !exhausted,
                    Err(_) => {
                        // Child closed its end early; stop feeding.
                        stdin_open = false;
                        stdin_pipe = None;
                    }
                }
            }
            status = child.wait() => {
                exit = Some(LoopExit::Exited(status.ok().and_then(|s| s.code())));
            }
            _ = tick.tick() => {
                if request.quit.as_ref().is_some_and(|t| t.is_cancelled()) {
                    exit = Some(LoopExit::QuitRequested);
                } else if deadline.is_some_and(|d| Instant::now() >= d) {
                    exit = Some(LoopExit::TimedOut);
                }
            }
        }
    }

    let (exit_status, timed_out) = match exit {
        Some(LoopExit::Exited(code)) => (code, false),
        Some(LoopExit::QuitRequested) => (terminate(&mut child).await, false),
        Some(LoopExit::TimedOut) => (terminate(&mut child).await, true),
        None => unreachable!("loop exits only with a recorded outcome"),
    };

    // Final drain of whatever the pipes still buffer.
    if !stdout_done {
        drain_pipe(
            &mut stdout_pipe,
            &mut stdout_buf,
            request.capture_stdout,
            request
                .stdout_sink
                .as_mut()
                .map(|s| &mut **s as &mut (dyn AsyncWrite + Send + Unpin)),
            request.flush_each_chunk,
        )
        .await;
    }
    if !stderr_done {
        drain_pipe(
            &mut stderr_pipe,
            &mut stderr_buf,
            request.capture_stderr,
            request
                .stderr_sink
                .as_mut()
                .map(|s| &mut **s as &mut (dyn AsyncWrite + Send + Unpin)),
            request.flush_each_chunk,
        )
        .await;
    }
    if let Some(sink) = request.stdout_sink.as_deref_mut() {
        let _ = sink.flush().await;
    }
    if let Some(sink) = request.stderr_sink.as_deref_mut() {
        let _ = sink.flush().await;
    }

    CommandResult {
        exit_status,
        stdout: materialize(stdout_buf, request.capture_stdout),
        stderr: materialize(stderr_buf, request.capture_stderr),
        duration: started.elapsed(),
        timed_out,
    }
}

fn materialize(buf: Vec<u8>, captured: bool) -> String {
    if captured {
        String::from_utf8_lossy(&buf).into_owned()
    } else {
        String::new()
    }
}

async fn consume_chunk(
    bytes: &[u8],
    buf: &mut Vec<u8>,
    capture: bool,
    sink: Option<&mut (dyn AsyncWrite + Send + Unpin)>,
    flush: bool,
) {
    if capture {
        buf.extend_from_slice(bytes);
    }
    if let Some(sink) = sink {
        let _ = sink.write_all(bytes).await;
        if flush {
            let _ = sink.flush().await;
        }
    }
}

/// Write the next bounded slice of stdin data. Returns `Ok(true)` once the
/// data is exhausted and the pipe has been shut down.
async fn feed_stdin(
    pipe: &mut Option<ChildStdin>,
    data: &[u8],
    offset: &mut usize,
) -> std::io::Result<bool> {
    let end = (*offset + STDIN_CHUNK).min(data.len());
    if let Some(writer) = pipe.as_mut() {
        writer.write_all(&data[*offset..end]).await?;
    }
    *offset = end;
    if *offset >= data.len() {
        if let Some(mut writer) = pipe.take() {
            writer.shutdown().await?;
        }
        return Ok(true);
    }
    Ok(false)
}

/// Read a pipe to EOF, bounding each read so a straggler holding the write
/// end open cannot stall finalization.
async fn drain_pipe<R: AsyncRead + Unpin>(
    pipe: &mut R,
    buf: &mut Vec<u8>,
    capture: bool,
    mut sink: Option<&mut (dyn AsyncWrite + Send + Unpin)>,
    flush: bool,
) {
    let mut chunk = [0u8; 8192];
    loop {
        match tokio::time::timeout(DRAIN_LIMIT, pipe.read(&mut chunk)).await {
            Ok(Ok(n)) if n > 0 => {
                let reborrow = sink
                    .as_mut()
                    .map(|s| &mut **s as &mut (dyn AsyncWrite + Send + Unpin));
                consume_chunk(&chunk[..n], buf, capture, reborrow, flush).await
            }
            _ => break,
        }
    }
}

/// Graceful-then-forceful kill: SIGTERM to the process group, a bounded
/// wait, then SIGKILL. Returns whatever exit code the OS reports.
async fn terminate(child: &mut Child) -> Option<i32> {
    signal_group(child, libc::SIGTERM);
    if let Ok(Ok(status)) = tokio::time::timeout(KILL_GRACE, child.wait()).await {
        return status.code();
    }
    signal_group(child, libc::SIGKILL);
    let _ = child.kill().await;
    child.wait().await.ok().and_then(|s| s.code())
}

#[cfg(unix)]
fn signal_group(child: &Child, signal: libc::c_int) {
    if let Some(pid) = child.id() {
        // Negative pid addresses the process group created at spawn.
        unsafe {
            libc::kill(-(pid as i32), signal);
        }
    }
}

#[cfg(not(unix))]
fn signal_group(_child: &Child, _signal: i32) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn nul_byte_degrades_to_error_result() {
        let result = run(RunRequest::new("echo hi\0there")).await;
        assert_eq!(result.exit_status, Some(-1));
        assert!(result.stderr.contains("NUL"));
        assert!(!result.timed_out);
    }

    #[tokio::test]
    async fn uncaptured_streams_stay_empty() {
        let result = run(RunRequest::new("echo visible; echo hidden >&2").capture(false, false)).await;
        assert_eq!(result.exit_status, Some(0));
        assert!(result.stdout.is_empty());
        assert!(result.stderr.is_empty());
    }

    #[tokio::test]
    async fn stdin_is_fed_in_bounded_chunks() {
        let payload = "x".repeat(STDIN_CHUNK * 3 + 17);
        let result = run(RunRequest::new("cat").stdin(payload.clone())).await;
        assert_eq!(result.exit_status, Some(0));
        assert_eq!(result.stdout, payload);
    }
}
