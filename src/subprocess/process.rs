//! Agent subprocess driver.
//!
//! Spawns one process per invocation, decodes its stdout into [`Record`]s,
//! runs the idle-output watchdog, and performs two-phase termination
//! (SIGTERM, then SIGKILL after a grace window) on cancellation or idle
//! timeout. The record sequence handed to the caller ends as soon as the
//! graceful signal is sent; reaping the child continues in the background.

use super::decoder::{LineDecoder, Record, RecordError};
use crate::error::{DroverError, Result};
use futures::Stream;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default idle-output timeout.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Window between the graceful and the forceful termination signal.
pub const TERMINATION_GRACE: Duration = Duration::from_secs(3);

const READ_CHUNK: usize = 8 * 1024;
const STDERR_TAIL_BYTES: usize = 16 * 1024;
const STDERR_DRAIN: Duration = Duration::from_millis(500);

/// Everything needed to launch one agent process.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Merged over the inherited environment.
    pub env: HashMap<String, String>,
    /// Written once to stdin, which is then closed.
    pub stdin: Option<String>,
    pub idle_timeout: Duration,
    pub grace_period: Duration,
}

impl SpawnSpec {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: HashMap::new(),
            stdin: None,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            grace_period: TERMINATION_GRACE,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }
}

/// How the process ended, reported once it has been reaped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Exit code, if the process exited normally.
    pub exit_code: Option<i32>,
    /// Terminating signal, if the process was killed by one.
    pub signal: Option<i32>,
    /// The graceful termination signal was sent.
    pub terminated: bool,
    /// The grace window expired and the forceful signal was sent.
    pub killed: bool,
    /// The idle-output watchdog fired.
    pub timed_out: bool,
    /// The cancellation token was signalled.
    pub cancelled: bool,
}

/// Consumer side of a running agent process.
pub struct ProcessStream {
    records: mpsc::UnboundedReceiver<Record>,
    cancel: CancellationToken,
    outcome: oneshot::Receiver<ProcessOutcome>,
    pid: Option<u32>,
}

impl ProcessStream {
    /// Next decoded record, or `None` once the sequence has ended.
    ///
    /// Returns `None` immediately once the token is cancelled, even if the
    /// process has not exited yet.
    pub async fn next(&mut self) -> Option<Record> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            record = self.records.recv() => record,
        }
    }

    /// OS process id at spawn time.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Wait until the background driver has reaped the process.
    pub async fn outcome(self) -> ProcessOutcome {
        self.outcome.await.unwrap_or_default()
    }

    /// Adapt into a `futures` stream; the outcome is discarded.
    pub fn into_stream(self) -> impl Stream<Item = Record> + Send + 'static {
        futures::stream::unfold(self, |mut stream| async move {
            stream.next().await.map(|record| (record, stream))
        })
    }
}

/// Spawn an agent process and start streaming its stdout.
///
/// Must be called from within a Tokio runtime.
pub fn spawn_json_process(spec: SpawnSpec, cancel: CancellationToken) -> Result<ProcessStream> {
    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .current_dir(&spec.cwd)
        .envs(&spec.env)
        .stdin(if spec.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|source| DroverError::Spawn {
        program: spec.program.clone(),
        source,
    })?;
    let pid = child.id();
    debug!(program = %spec.program, pid = ?pid, cwd = %spec.cwd.display(), "spawned agent process");

    if let (Some(input), Some(mut stdin)) = (spec.stdin.clone(), child.stdin.take()) {
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(input.as_bytes()).await {
                debug!(error = %e, "agent closed stdin before the prompt was written");
            }
            // Dropping the handle closes the pipe; tools wait for EOF.
        });
    }

    let stdout = child.stdout.take().ok_or_else(|| DroverError::Spawn {
        program: spec.program.clone(),
        source: std::io::Error::other("stdout was not captured"),
    })?;
    let stderr_task = tokio::spawn(capture_stderr(child.stderr.take()));

    let (tx, rx) = mpsc::unbounded_channel();
    let (outcome_tx, outcome_rx) = oneshot::channel();

    let driver = Driver {
        child,
        stdout,
        stderr_task,
        tx,
        cancel: cancel.clone(),
        idle_timeout: spec.idle_timeout,
        grace_period: spec.grace_period,
    };
    tokio::spawn(async move {
        let outcome = driver.run().await;
        let _ = outcome_tx.send(outcome);
    });

    Ok(ProcessStream {
        records: rx,
        cancel,
        outcome: outcome_rx,
        pid,
    })
}

enum Stop {
    Cancelled,
    IdleTimeout,
}

struct Driver {
    child: Child,
    stdout: ChildStdout,
    stderr_task: JoinHandle<String>,
    tx: mpsc::UnboundedSender<Record>,
    cancel: CancellationToken,
    idle_timeout: Duration,
    grace_period: Duration,
}

impl Driver {
    async fn run(mut self) -> ProcessOutcome {
        let mut outcome = ProcessOutcome::default();
        let mut decoder = LineDecoder::new();
        let mut buf = vec![0u8; READ_CHUNK];
        let mut saw_error = false;

        let idle = tokio::time::sleep(self.idle_timeout);
        tokio::pin!(idle);

        let stop = loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break Some(Stop::Cancelled),
                _ = &mut idle => break Some(Stop::IdleTimeout),
                read = self.stdout.read(&mut buf) => match read {
                    Ok(0) => break None,
                    Ok(n) => {
                        idle.as_mut().reset(Instant::now() + self.idle_timeout);
                        for record in decoder.push(&buf[..n]) {
                            saw_error |= record.is_error();
                            let _ = self.tx.send(record);
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to read agent stdout");
                        break None;
                    }
                },
            }
        };

        let status = match stop {
            Some(reason) => self.stop(reason, &mut outcome).await,
            None => {
                if let Some(record) = decoder.finish() {
                    saw_error |= record.is_error();
                    let _ = self.tx.send(record);
                }

                // stdout is closed but the process may linger; the idle
                // deadline still applies.
                let waited = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => Err(Stop::Cancelled),
                    _ = &mut idle => Err(Stop::IdleTimeout),
                    status = self.child.wait() => Ok(status.ok()),
                };

                match waited {
                    Ok(status) => {
                        if !saw_error && let Some(record) = self.exit_record(status).await {
                            let _ = self.tx.send(record);
                        }
                        status
                    }
                    Err(reason) => self.stop(reason, &mut outcome).await,
                }
            }
        };

        self.stderr_task.abort();
        if let Some(status) = status {
            outcome.exit_code = status.code();
            outcome.signal = exit_signal(&status);
        }
        debug!(?outcome, "agent process reaped");
        outcome
    }

    async fn stop(&mut self, reason: Stop, outcome: &mut ProcessOutcome) -> Option<ExitStatus> {
        match reason {
            Stop::Cancelled => outcome.cancelled = true,
            Stop::IdleTimeout => {
                warn!(
                    timeout_secs = self.idle_timeout.as_secs_f64(),
                    "agent went idle; terminating"
                );
                outcome.timed_out = true;
                let _ = self.tx.send(Record::Error(RecordError::IdleTimeout {
                    after: self.idle_timeout,
                }));
            }
        }
        self.terminate(outcome).await
    }

    /// Two-phase termination. Closes the record channel before waiting so the
    /// consumer is released at the moment the graceful signal goes out.
    async fn terminate(&mut self, outcome: &mut ProcessOutcome) -> Option<ExitStatus> {
        send_graceful_signal(&mut self.child);
        outcome.terminated = true;

        let (closed_tx, _) = mpsc::unbounded_channel();
        drop(std::mem::replace(&mut self.tx, closed_tx));

        match tokio::time::timeout(self.grace_period, self.child.wait()).await {
            Ok(status) => status.ok(),
            Err(_) => {
                warn!(
                    grace_secs = self.grace_period.as_secs_f64(),
                    "agent ignored SIGTERM; sending SIGKILL"
                );
                let _ = self.child.start_kill();
                outcome.killed = true;
                self.child.wait().await.ok()
            }
        }
    }

    async fn exit_record(&mut self, status: Option<ExitStatus>) -> Option<Record> {
        let status = status?;
        if status.success() {
            return None;
        }

        let stderr = match tokio::time::timeout(STDERR_DRAIN, &mut self.stderr_task).await {
            Ok(Ok(stderr)) => stderr,
            _ => String::new(),
        };

        if let Some(code) = status.code() {
            return Some(Record::Error(RecordError::Exited { code, stderr }));
        }
        exit_signal(&status).map(|signal| Record::Error(RecordError::Signalled { signal, stderr }))
    }
}

async fn capture_stderr(stderr: Option<ChildStderr>) -> String {
    let Some(mut stderr) = stderr else {
        return String::new();
    };

    let mut tail = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match stderr.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                tail.extend_from_slice(&buf[..n]);
                if tail.len() > STDERR_TAIL_BYTES {
                    let excess = tail.len() - STDERR_TAIL_BYTES;
                    tail.drain(..excess);
                }
            }
        }
    }
    String::from_utf8_lossy(&tail).into_owned()
}

#[cfg(unix)]
fn send_graceful_signal(child: &mut Child) {
    if let Some(pid) = child.id() {
        // SAFETY: `pid` is our own unreaped child, so it cannot have been recycled.
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }
}

#[cfg(not(unix))]
fn send_graceful_signal(child: &mut Child) {
    let _ = child.start_kill();
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}
