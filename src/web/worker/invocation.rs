//! One worker process launch, from spawn to reap.
//!
//! The worker is started with `<program> <args…> <mode> [payload]`, stdin
//! closed, stdout and stderr piped. Both pipes are drained concurrently into
//! capped buffers while the process runs. Whatever happens (exit, timeout,
//! overflow, the caller dropping the future) the process is terminated and
//! never left running.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::ipc_types::WorkerMode;
use crate::{sys_debug, sys_warn};

/// Executable plus the arguments that precede the mode selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerProgram {
    program: PathBuf,
    args: Vec<String>,
}

impl WorkerProgram {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Whether the executable can be found: an existing file for paths,
    /// or a `PATH` hit for bare command names.
    pub fn is_available(&self) -> bool {
        if self.program.components().count() > 1 || self.program.is_absolute() {
            return self.program.is_file();
        }
        std::env::var_os("PATH")
            .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(&self.program).is_file()))
            .unwrap_or(false)
    }
}

impl fmt::Display for WorkerProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Bounds applied to a single invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvocationLimits {
    pub timeout: Duration,
    /// Cap for each captured stream, and for a single forwarded line.
    /// A kept stderr tail is trimmed to this size instead.
    pub max_output_bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputStream::Stdout => "stdout",
            OutputStream::Stderr => "stderr",
        })
    }
}

/// Raw result of one invocation, consumed once by the bridge or trainer.
#[derive(Debug)]
pub enum InvocationOutcome {
    /// Exit code 0. `stdout` is empty when lines were streamed to a sink.
    Success { stdout: Vec<u8>, stderr: Vec<u8> },
    /// Non-zero exit, or death by signal (`exit_code` is `None`).
    ProcessFailure {
        exit_code: Option<i32>,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
    },
    /// Killed after exceeding the time limit.
    Timeout { elapsed: Duration },
    /// The process could not be started.
    LaunchFailure { reason: String },
    /// Killed after a stream exceeded its cap.
    OutputOverflow { stream: OutputStream, limit: usize },
}

#[derive(Debug)]
enum CaptureError {
    Overflow(OutputStream),
    Io { stream: OutputStream, source: io::Error },
    Wait(io::Error),
}

/// A single prepared worker launch.
pub struct WorkerInvocation {
    id: Uuid,
    mode: WorkerMode,
    program: WorkerProgram,
    payload: Option<String>,
    limits: InvocationLimits,
    line_sink: Option<mpsc::UnboundedSender<String>>,
    stderr_tail: bool,
}

impl WorkerInvocation {
    pub fn new(
        program: &WorkerProgram,
        mode: WorkerMode,
        payload: Option<String>,
        limits: InvocationLimits,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            mode,
            program: program.clone(),
            payload,
            limits,
            line_sink: None,
            stderr_tail: false,
        }
    }

    /// Forward stdout line by line to `sink` instead of buffering it.
    ///
    /// Lines longer than the output cap are truncated, never fatal.
    pub fn stream_stdout_lines(mut self, sink: mpsc::UnboundedSender<String>) -> Self {
        self.line_sink = Some(sink);
        self
    }

    /// Keep only the last `max_output_bytes` of stderr instead of failing
    /// when it grows past the cap.
    pub fn keep_stderr_tail(mut self) -> Self {
        self.stderr_tail = true;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program.program);
        command
            .args(&self.program.args)
            .arg(self.mode.as_arg())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(payload) = &self.payload {
            command.arg(payload);
        }
        #[cfg(unix)]
        command.process_group(0);
        command
    }

    /// Launch the worker and wait for it to finish, fail, or be killed.
    pub async fn run(self) -> InvocationOutcome {
        let id = self.id;
        let started = Instant::now();

        let mut child = match self.command().spawn() {
            Ok(child) => child,
            Err(e) => {
                let reason = describe_spawn_error(self.program.program(), &e);
                sys_warn!("[INVOCATION {id}] {reason}");
                return InvocationOutcome::LaunchFailure { reason };
            }
        };
        let mut group = ProcessGroup::new(child.id());
        sys_debug!(
            "[INVOCATION {id}] started {} worker pid={:?}",
            self.mode.as_arg(),
            child.id()
        );

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            terminate(&mut child, &mut group).await;
            return InvocationOutcome::LaunchFailure {
                reason: "worker pipes were not available".to_string(),
            };
        };

        let limit = self.limits.max_output_bytes;
        let line_sink = self.line_sink;
        let stderr_tail = self.stderr_tail;
        let collected = tokio::time::timeout(self.limits.timeout, async {
            let stdout_task = async move {
                match line_sink {
                    Some(sink) => forward_lines(stdout, limit, sink).await.map(|()| Vec::new()),
                    None => read_capped(stdout, OutputStream::Stdout, limit).await,
                }
            };
            let stderr_task = async move {
                if stderr_tail {
                    read_tail(stderr, OutputStream::Stderr, limit).await
                } else {
                    read_capped(stderr, OutputStream::Stderr, limit).await
                }
            };
            let (stdout, stderr) = tokio::try_join!(stdout_task, stderr_task)?;
            let status = child.wait().await.map_err(CaptureError::Wait)?;
            Ok::<(ExitStatus, Vec<u8>, Vec<u8>), CaptureError>((status, stdout, stderr))
        })
        .await;

        let outcome = match collected {
            Ok(Ok((status, stdout, stderr))) => {
                // Reaped; the pgid must not be signalled any more.
                group.disarm();
                if status.success() {
                    InvocationOutcome::Success { stdout, stderr }
                } else {
                    InvocationOutcome::ProcessFailure {
                        exit_code: status.code(),
                        stdout,
                        stderr,
                    }
                }
            }
            Ok(Err(CaptureError::Overflow(stream))) => {
                terminate(&mut child, &mut group).await;
                InvocationOutcome::OutputOverflow { stream, limit }
            }
            Ok(Err(CaptureError::Io { stream, source })) => {
                terminate(&mut child, &mut group).await;
                InvocationOutcome::ProcessFailure {
                    exit_code: None,
                    stdout: Vec::new(),
                    stderr: format!("failed to read worker {stream}: {source}").into_bytes(),
                }
            }
            Ok(Err(CaptureError::Wait(source))) => {
                terminate(&mut child, &mut group).await;
                InvocationOutcome::ProcessFailure {
                    exit_code: None,
                    stdout: Vec::new(),
                    stderr: format!("failed to wait for worker: {source}").into_bytes(),
                }
            }
            Err(_elapsed) => {
                terminate(&mut child, &mut group).await;
                InvocationOutcome::Timeout {
                    elapsed: started.elapsed(),
                }
            }
        };

        sys_debug!(
            "[INVOCATION {id}] finished in {}ms: {}",
            started.elapsed().as_millis(),
            outcome.label()
        );
        outcome
    }
}

impl InvocationOutcome {
    fn label(&self) -> &'static str {
        match self {
            InvocationOutcome::Success { .. } => "success",
            InvocationOutcome::ProcessFailure { .. } => "process failure",
            InvocationOutcome::Timeout { .. } => "timeout",
            InvocationOutcome::LaunchFailure { .. } => "launch failure",
            InvocationOutcome::OutputOverflow { .. } => "output overflow",
        }
    }
}

fn describe_spawn_error(program: &Path, error: &io::Error) -> String {
    let shown = program.display();
    match error.kind() {
        io::ErrorKind::NotFound => format!("worker executable not found: {shown}"),
        io::ErrorKind::PermissionDenied => format!("worker executable is not runnable: {shown}"),
        _ => format!("failed to launch worker {shown}: {error}"),
    }
}

async fn read_capped<R>(mut reader: R, stream: OutputStream, limit: usize) -> Result<Vec<u8>, CaptureError>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader
            .read(&mut chunk)
            .await
            .map_err(|source| CaptureError::Io { stream, source })?;
        if n == 0 {
            return Ok(buffer);
        }
        if buffer.len() + n > limit {
            return Err(CaptureError::Overflow(stream));
        }
        buffer.extend_from_slice(&chunk[..n]);
    }
}

/// Like `read_capped`, but drops the oldest bytes instead of overflowing.
async fn read_tail<R>(mut reader: R, stream: OutputStream, limit: usize) -> Result<Vec<u8>, CaptureError>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader
            .read(&mut chunk)
            .await
            .map_err(|source| CaptureError::Io { stream, source })?;
        if n == 0 {
            return Ok(buffer);
        }
        buffer.extend_from_slice(&chunk[..n]);
        if buffer.len() > limit {
            let excess = buffer.len() - limit;
            buffer.drain(..excess);
        }
    }
}

async fn forward_lines<R>(
    reader: R,
    limit: usize,
    sink: mpsc::UnboundedSender<String>,
) -> Result<(), CaptureError>
where
    R: AsyncRead + Unpin,
{
    let stream = OutputStream::Stdout;
    let io_error = |source| CaptureError::Io { stream, source };
    let mut reader = BufReader::new(reader);
    let read_limit = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    let mut line = Vec::new();
    loop {
        line.clear();
        let n = (&mut reader)
            .take(read_limit)
            .read_until(b'\n', &mut line)
            .await
            .map_err(io_error)?;
        if n == 0 {
            return Ok(());
        }
        let truncated = !line.ends_with(b"\n") && line.len() > limit;
        if truncated {
            line.truncate(limit);
            skip_rest_of_line(&mut reader).await.map_err(io_error)?;
        }
        let text = String::from_utf8_lossy(&line);
        let mut text = text.trim_end_matches(['\n', '\r']).to_string();
        if truncated {
            text.push_str(" [truncated]");
        }
        // A closed receiver only means nobody is listening any more.
        let _ = sink.send(text);
    }
}

/// Discard input up to and including the next newline.
async fn skip_rest_of_line<R>(reader: &mut R) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let (found, used) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(());
            }
            match available.iter().position(|&b| b == b'\n') {
                Some(i) => (true, i + 1),
                None => (false, available.len()),
            }
        };
        reader.consume(used);
        if found {
            return Ok(());
        }
    }
}

/// Kill the worker's process group and the worker itself, then reap it.
async fn terminate(child: &mut Child, group: &mut ProcessGroup) {
    group.kill();
    if let Err(e) = child.kill().await {
        sys_debug!("[INVOCATION] kill after termination: {e}");
    }
}

/// The worker runs as leader of its own process group; this handle signals
/// the whole group so grandchildren die with it, including on drop.
struct ProcessGroup {
    pgid: Option<u32>,
}

impl ProcessGroup {
    fn new(pid: Option<u32>) -> Self {
        Self { pgid: pid }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }

    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_process_group(pgid);
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    // SAFETY: kill(2) has no memory-safety preconditions; a negative pid
    // addresses the group created for this worker by `process_group(0)`.
    unsafe {
        libc::kill(-pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) {}
