//! # The supervised child process.
//!
//! The configured command string is handed to a POSIX shell so callers can
//! compose directory changes and redirections (`cd server && java -jar …`).
//! All three standard streams are piped. A dedicated reader task drains
//! stdout and stderr into one [`LineBuffer`] each and watches for the child
//! exiting; when it does, the remaining pipe contents are drained and the
//! exit code recorded (plain status for a normal exit, negated signal number
//! for a signalled one, −1 while running).
//!
//! ```text
//!   run() ──► sh -c <command>
//!                 │ stdout ─► reader task ─► LineBuffer ─► read_line()
//!                 │ stderr ─► reader task ─► LineBuffer
//!   send() ─────► stdin
//! ```

use std::os::unix::process::ExitStatusExt;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::ChildError;
use crate::io::buffer::LineBuffer;
use crate::sink::CommandSink;

const PIPE_CHUNK: usize = 4096;

/// Which output stream to read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Owns one shell-spawned child and its line buffers.
///
/// The struct is shared behind an [`Arc`]: the reader task, the supervisor's
/// log pump, and the command sinks all hold the same instance.
pub struct ChildProcess {
    command: String,
    stdout: LineBuffer,
    stderr: LineBuffer,
    running: AtomicBool,
    exit_code: AtomicI32,
    pid: AtomicI32,
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    reader: std::sync::Mutex<Option<JoinHandle<()>>>,
    reader_token: CancellationToken,
}

impl ChildProcess {
    /// Prepares a child for the given shell command. Nothing is spawned yet.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            stdout: LineBuffer::new(),
            stderr: LineBuffer::new(),
            running: AtomicBool::new(false),
            exit_code: AtomicI32::new(-1),
            pid: AtomicI32::new(-1),
            stdin: tokio::sync::Mutex::new(None),
            reader: std::sync::Mutex::new(None),
            reader_token: CancellationToken::new(),
        }
    }

    /// Spawns the child and schedules the reader task.
    ///
    /// Fails with [`ChildError::AlreadyRunning`] if a child is live, or
    /// [`ChildError::Spawn`] when the shell cannot be started.
    pub async fn run(self: &Arc<Self>) -> Result<(), ChildError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ChildError::AlreadyRunning);
        }

        let spawned = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(source) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(ChildError::Spawn { source });
            }
        };

        self.exit_code.store(-1, Ordering::SeqCst);
        self.pid.store(
            child.id().map(|pid| pid as i32).unwrap_or(-1),
            Ordering::SeqCst,
        );

        let stdin = child.stdin.take();
        let stdout = child.stdout.take().ok_or_else(|| ChildError::Spawn {
            source: std::io::Error::other("stdout pipe not captured"),
        })?;
        let stderr = child.stderr.take().ok_or_else(|| ChildError::Spawn {
            source: std::io::Error::other("stderr pipe not captured"),
        })?;
        *self.stdin.lock().await = stdin;

        let handle = tokio::spawn(reader_loop(
            Arc::clone(self),
            child,
            stdout,
            stderr,
            self.reader_token.child_token(),
        ));
        let mut reader = self.reader.lock().unwrap_or_else(|e| e.into_inner());
        *reader = Some(handle);
        Ok(())
    }

    /// Writes one chunk to the child's stdin.
    ///
    /// Transient interruptions are retried by the write itself; a dead child
    /// yields [`ChildError::NotRunning`].
    pub async fn send(&self, data: &str) -> Result<(), ChildError> {
        if !self.running() {
            return Err(ChildError::NotRunning);
        }
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(ChildError::NotRunning)?;
        stdin
            .write_all(data.as_bytes())
            .await
            .map_err(|source| ChildError::Stdin { source })?;
        stdin
            .flush()
            .await
            .map_err(|source| ChildError::Stdin { source })
    }

    /// Returns the next buffered line from the chosen stream, if complete.
    pub fn read_line(&self, stream: StreamKind) -> Option<String> {
        self.buffer(stream).read_line()
    }

    /// Returns everything buffered on the chosen stream.
    pub fn read_all(&self, stream: StreamKind) -> Option<String> {
        self.buffer(stream).read_all()
    }

    /// Requests graceful termination (SIGTERM). Does not wait.
    pub fn stop(&self) -> Result<(), ChildError> {
        self.signal(Signal::SIGTERM)
    }

    /// Terminates the child unconditionally (SIGKILL).
    pub fn kill(&self) -> Result<(), ChildError> {
        self.signal(Signal::SIGKILL)
    }

    /// True while the child has not been observed to exit.
    pub fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Exit status: the plain code for a normal exit, the negated signal
    /// number for a signalled one, −1 while running or never started.
    pub fn exit_code(&self) -> i32 {
        self.exit_code.load(Ordering::SeqCst)
    }

    /// Stops the reader task and waits for it to finish.
    pub async fn shutdown(&self) {
        self.reader_token.cancel();
        let handle = {
            let mut reader = self.reader.lock().unwrap_or_else(|e| e.into_inner());
            reader.take()
        };
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    fn buffer(&self, stream: StreamKind) -> &LineBuffer {
        match stream {
            StreamKind::Stdout => &self.stdout,
            StreamKind::Stderr => &self.stderr,
        }
    }

    fn signal(&self, sig: Signal) -> Result<(), ChildError> {
        if !self.running() {
            return Err(ChildError::NotRunning);
        }
        let pid = self.pid.load(Ordering::SeqCst);
        if pid <= 0 {
            return Err(ChildError::NotRunning);
        }
        signal::kill(Pid::from_raw(pid), sig).map_err(|errno| ChildError::Signal { errno })
    }
}

#[async_trait]
impl CommandSink for ChildProcess {
    async fn send_line(&self, line: &str) -> Result<(), ChildError> {
        self.send(line).await
    }
}

/// Drains both output pipes until the child exits, then records the status.
async fn reader_loop(
    this: Arc<ChildProcess>,
    mut child: Child,
    mut stdout: tokio::process::ChildStdout,
    mut stderr: tokio::process::ChildStderr,
    token: CancellationToken,
) {
    let mut out_chunk = [0u8; PIPE_CHUNK];
    let mut err_chunk = [0u8; PIPE_CHUNK];
    let mut out_open = true;
    let mut err_open = true;

    loop {
        tokio::select! {
            read = stdout.read(&mut out_chunk), if out_open => match read {
                Ok(0) | Err(_) => out_open = false,
                Ok(n) => this.stdout.append(&String::from_utf8_lossy(&out_chunk[..n])),
            },
            read = stderr.read(&mut err_chunk), if err_open => match read {
                Ok(0) | Err(_) => err_open = false,
                Ok(n) => this.stderr.append(&String::from_utf8_lossy(&err_chunk[..n])),
            },
            status = child.wait() => {
                if out_open {
                    drain(&mut stdout, &this.stdout).await;
                }
                if err_open {
                    drain(&mut stderr, &this.stderr).await;
                }
                match status {
                    Ok(status) => {
                        let code = status
                            .code()
                            .or_else(|| status.signal().map(|sig| -sig))
                            .unwrap_or(-1);
                        this.exit_code.store(code, Ordering::SeqCst);
                        debug!("child exited with code {code}");
                    }
                    Err(err) => warn!("failed to collect child exit status: {err}"),
                }
                this.running.store(false, Ordering::SeqCst);
                break;
            }
            _ = token.cancelled() => break,
        }
    }
}

/// Best-effort read of what remains in a pipe after the child exited.
///
/// A short timeout guards against descendants that inherited the write end
/// and keep it open.
async fn drain<R: AsyncRead + Unpin>(stream: &mut R, buffer: &LineBuffer) {
    let mut chunk = [0u8; PIPE_CHUNK];
    loop {
        let read = tokio::time::timeout(Duration::from_millis(100), stream.read(&mut chunk)).await;
        match read {
            Ok(Ok(n)) if n > 0 => buffer.append(&String::from_utf8_lossy(&chunk[..n])),
            _ => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_a_shell_command_and_reads_its_lines() {
        let child = Arc::new(ChildProcess::new("printf 'one\\ntwo\\n'"));
        child.run().await.unwrap();

        let mut lines = Vec::new();
        for _ in 0..200 {
            if let Some(line) = child.read_line(StreamKind::Stdout) {
                lines.push(line);
                if lines.len() == 2 {
                    break;
                }
            } else {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
        assert_eq!(lines, vec!["one\n".to_string(), "two\n".to_string()]);
        child.shutdown().await;
    }

    #[tokio::test]
    async fn records_the_exit_code() {
        let child = Arc::new(ChildProcess::new("exit 3"));
        child.run().await.unwrap();
        for _ in 0..200 {
            if !child.running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!child.running());
        assert_eq!(child.exit_code(), 3);
        child.shutdown().await;
    }

    #[tokio::test]
    async fn send_round_trips_through_cat() {
        let child = Arc::new(ChildProcess::new("cat"));
        child.run().await.unwrap();
        child.send("hello\n").await.unwrap();

        let mut line = None;
        for _ in 0..200 {
            line = child.read_line(StreamKind::Stdout);
            if line.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(line.as_deref(), Some("hello\n"));

        child.kill().unwrap();
        child.shutdown().await;
    }

    #[tokio::test]
    async fn refuses_a_second_run_while_live() {
        let child = Arc::new(ChildProcess::new("sleep 5"));
        child.run().await.unwrap();
        assert!(matches!(
            child.run().await,
            Err(ChildError::AlreadyRunning)
        ));
        child.kill().unwrap();
        child.shutdown().await;
    }

    #[tokio::test]
    async fn send_fails_once_the_child_is_gone() {
        let child = Arc::new(ChildProcess::new("true"));
        child.run().await.unwrap();
        for _ in 0..200 {
            if !child.running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(matches!(
            child.send("late\n").await,
            Err(ChildError::NotRunning)
        ));
        child.shutdown().await;
    }
}
