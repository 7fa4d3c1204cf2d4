//! Supervised transcoder process

use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::command::TranscoderCommand;
use super::error::SpawnError;
use super::event::{OutputStream, ProcessEvent, ProcessExit};

/// Lines longer than this are split
const MAX_LINE_LEN: usize = 8 * 1024;

/// How long to wait for the output pumps after the child was reaped
const PUMP_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

enum Control {
    Stop { graceful: bool },
}

/// Handle to one running transcoder
///
/// Dropping the handle does not stop the process; the supervisor task keeps
/// running until the child exits. The child is killed if the runtime shuts
/// down first.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: Option<u32>,
    control: mpsc::UnboundedSender<Control>,
    stop_requested: Arc<AtomicBool>,
    exited: Arc<AtomicBool>,
}

impl std::fmt::Debug for Control {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Control::Stop { graceful } => write!(f, "Stop(graceful={graceful})"),
        }
    }
}

impl ProcessHandle {
    /// Launch `command` and start supervising it
    ///
    /// Lifecycle events are delivered on `events`. A graceful stop that has
    /// not completed within `stop_grace_period` is escalated to a kill.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        command: &TranscoderCommand,
        stop_grace_period: Duration,
        events: mpsc::UnboundedSender<ProcessEvent>,
    ) -> Result<Self, SpawnError> {
        let mut child = match command.to_command().spawn() {
            Ok(child) => child,
            Err(e) => {
                let err = SpawnError::from_io(command.program(), e);
                let _ = events.send(ProcessEvent::SpawnFailed(err.to_string()));
                return Err(err);
            }
        };

        let pid = child.id();
        tracing::debug!(
            pid = ?pid,
            program = command.program(),
            args = ?command.args(),
            "Transcoder spawned"
        );
        let _ = events.send(ProcessEvent::Started { pid });

        let mut pumps = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            pumps.push(spawn_pump(stdout, OutputStream::Stdout, events.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(spawn_pump(stderr, OutputStream::Stderr, events.clone()));
        }

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let stop_requested = Arc::new(AtomicBool::new(false));
        let exited = Arc::new(AtomicBool::new(false));

        tokio::spawn(supervise(
            child,
            pumps,
            control_rx,
            stop_grace_period,
            events,
            Arc::clone(&stop_requested),
            Arc::clone(&exited),
        ));

        Ok(Self {
            pid,
            control: control_tx,
            stop_requested,
            exited,
        })
    }

    /// Request termination
    ///
    /// Graceful sends an interrupt and escalates to a kill after the grace
    /// period; otherwise the process is killed immediately. Only the first
    /// call starts a termination sequence and returns `true`; later calls,
    /// and calls after the process exited, do nothing.
    pub fn signal_stop(&self, graceful: bool) -> bool {
        if self.exited.load(Ordering::Acquire) {
            return false;
        }
        if self.stop_requested.swap(true, Ordering::AcqRel) {
            return false;
        }

        tracing::debug!(pid = ?self.pid, graceful = graceful, "Stopping transcoder");
        self.control.send(Control::Stop { graceful }).is_ok()
    }

    /// OS process ID
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether a stop has been requested
    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Whether the process has been reaped
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }
}

async fn supervise(
    mut child: Child,
    pumps: Vec<JoinHandle<()>>,
    mut control: mpsc::UnboundedReceiver<Control>,
    stop_grace_period: Duration,
    events: mpsc::UnboundedSender<ProcessEvent>,
    stop_requested: Arc<AtomicBool>,
    exited: Arc<AtomicBool>,
) {
    let pid = child.id();
    let mut kill_deadline: Option<Instant> = None;

    let status = loop {
        tokio::select! {
            status = child.wait() => break status,

            Some(cmd) = control.recv() => match cmd {
                Control::Stop { graceful: true } => match interrupt(&mut child) {
                    Ok(()) => kill_deadline = Some(Instant::now() + stop_grace_period),
                    Err(e) => {
                        tracing::warn!(pid = ?pid, error = %e, "Interrupt failed, killing transcoder");
                        kill(&mut child);
                    }
                },
                Control::Stop { graceful: false } => kill(&mut child),
            },

            _ = sleep_until_deadline(kill_deadline), if kill_deadline.is_some() => {
                tracing::warn!(
                    pid = ?pid,
                    grace_period_ms = stop_grace_period.as_millis() as u64,
                    "Transcoder ignored interrupt, killing"
                );
                kill_deadline = None;
                kill(&mut child);
            }
        }
    };

    // A stop that arrives after the child was reaped did not cause the exit
    exited.store(true, Ordering::Release);
    let requested = stop_requested.load(Ordering::Acquire);

    let exit = match status {
        Ok(status) => ProcessExit {
            code: status.code(),
            signal: exit_signal(&status),
            requested,
        },
        Err(e) => {
            tracing::error!(pid = ?pid, error = %e, "Failed to wait on transcoder");
            ProcessExit {
                code: None,
                signal: None,
                requested,
            }
        }
    };

    for pump in pumps {
        if tokio::time::timeout(PUMP_DRAIN_TIMEOUT, pump).await.is_err() {
            tracing::debug!(pid = ?pid, "Output pump still open after exit");
        }
    }

    let _ = events.send(ProcessEvent::Exited(exit));
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn kill(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        tracing::warn!(pid = ?child.id(), error = %e, "Failed to kill transcoder");
    }
}

#[cfg(unix)]
fn interrupt(child: &mut Child) -> std::io::Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    // Already reaped; nothing to signal
    let Some(pid) = child.id() else {
        return Ok(());
    };

    kill(Pid::from_raw(pid as i32), Signal::SIGINT).map_err(std::io::Error::from)
}

#[cfg(not(unix))]
fn interrupt(child: &mut Child) -> std::io::Result<()> {
    child.start_kill()
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

fn spawn_pump<R>(
    reader: R,
    stream: OutputStream,
    events: mpsc::UnboundedSender<ProcessEvent>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(pump_lines(reader, stream, events))
}

/// Read `reader` to EOF, forwarding each line as an `Output` event
///
/// Both `\n` and `\r` terminate a line (ffmpeg redraws its progress line with
/// carriage returns). Reading continues after the receiver is gone so the
/// child never blocks on a full pipe.
async fn pump_lines<R>(mut reader: R, stream: OutputStream, events: mpsc::UnboundedSender<ProcessEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(4096);

    loop {
        buf.reserve(4096);
        match reader.read_buf(&mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                while let Some(line) = split_line(&mut buf) {
                    if !line.is_empty() {
                        let _ = events.send(ProcessEvent::Output { stream, line });
                    }
                }
            }
            Err(e) => {
                tracing::debug!(stream = stream.as_str(), error = %e, "Output read failed");
                break;
            }
        }
    }

    let rest = String::from_utf8_lossy(&buf).trim_end().to_string();
    if !rest.is_empty() {
        let _ = events.send(ProcessEvent::Output { stream, line: rest });
    }
}

fn split_line(buf: &mut BytesMut) -> Option<String> {
    if let Some(pos) = buf.iter().position(|b| *b == b'\n' || *b == b'\r') {
        let line = buf.split_to(pos);
        buf.advance(1);
        return Some(String::from_utf8_lossy(&line).trim_end().to_string());
    }

    if buf.len() >= MAX_LINE_LEN {
        let line = buf.split_to(MAX_LINE_LEN);
        return Some(String::from_utf8_lossy(&line).into_owned());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_line_handles_cr_and_lf() {
        let mut buf = BytesMut::from(&b"frame=1\rframe=2\nInput #0\r\npartial"[..]);

        assert_eq!(split_line(&mut buf).as_deref(), Some("frame=1"));
        assert_eq!(split_line(&mut buf).as_deref(), Some("frame=2"));
        assert_eq!(split_line(&mut buf).as_deref(), Some("Input #0"));
        // "\r\n" leaves an empty line behind, which the pump skips
        assert_eq!(split_line(&mut buf).as_deref(), Some(""));
        assert_eq!(split_line(&mut buf), None);
        assert_eq!(&buf[..], b"partial");
    }

    #[test]
    fn test_split_line_caps_length() {
        let mut buf = BytesMut::from(vec![b'x'; MAX_LINE_LEN + 10].as_slice());

        let line = split_line(&mut buf).unwrap();
        assert_eq!(line.len(), MAX_LINE_LEN);
        assert_eq!(buf.len(), 10);
    }

    #[tokio::test]
    async fn test_pump_forwards_trailing_partial_line() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let input: &[u8] = b"one\ntwo";

        pump_lines(input, OutputStream::Stderr, tx).await;

        let mut lines = Vec::new();
        while let Ok(ProcessEvent::Output { stream, line }) = rx.try_recv() {
            assert_eq!(stream, OutputStream::Stderr);
            lines.push(line);
        }
        assert_eq!(lines, ["one", "two"]);
    }

    #[tokio::test]
    async fn test_spawn_missing_binary() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let command = TranscoderCommand::new("definitely-not-a-transcoder-binary", ["-version"]);

        let result = ProcessHandle::spawn(&command, Duration::from_secs(1), tx);

        assert!(matches!(result, Err(SpawnError::NotFound(_))));
        assert!(matches!(rx.recv().await, Some(ProcessEvent::SpawnFailed(_))));
    }

    #[cfg(unix)]
    mod unix {
        use super::*;

        async fn wait_exit(rx: &mut mpsc::UnboundedReceiver<ProcessEvent>) -> (Vec<String>, ProcessExit) {
            let mut lines = Vec::new();
            loop {
                let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
                    .await
                    .expect("timed out waiting for exit")
                    .expect("event channel closed");
                match event {
                    ProcessEvent::Output { line, .. } => lines.push(line),
                    ProcessEvent::Exited(exit) => return (lines, exit),
                    _ => {}
                }
            }
        }

        #[tokio::test]
        async fn test_output_and_clean_exit() {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let command = TranscoderCommand::new("sh", ["-c", "echo hello; echo oops 1>&2"]);

            let handle = ProcessHandle::spawn(&command, Duration::from_secs(1), tx).unwrap();
            assert!(handle.pid().is_some());
            assert!(matches!(
                rx.recv().await,
                Some(ProcessEvent::Started { pid: Some(_) })
            ));

            let (lines, exit) = wait_exit(&mut rx).await;
            assert!(lines.contains(&"hello".to_string()));
            assert!(lines.contains(&"oops".to_string()));
            assert!(exit.is_success());
            assert!(!exit.requested);
            assert!(handle.has_exited());
        }

        #[tokio::test]
        async fn test_nonzero_exit() {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let command = TranscoderCommand::new("sh", ["-c", "exit 3"]);

            let _handle = ProcessHandle::spawn(&command, Duration::from_secs(1), tx).unwrap();

            let (_, exit) = wait_exit(&mut rx).await;
            assert_eq!(exit.code, Some(3));
            assert!(!exit.requested);
        }

        #[tokio::test]
        async fn test_graceful_stop_is_idempotent() {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let command = TranscoderCommand::new("sleep", ["30"]);

            let handle = ProcessHandle::spawn(&command, Duration::from_secs(5), tx).unwrap();

            assert!(handle.signal_stop(true));
            assert!(!handle.signal_stop(true));
            assert!(!handle.signal_stop(false));
            assert!(handle.stop_requested());

            let (_, exit) = wait_exit(&mut rx).await;
            assert!(exit.requested);
            assert_eq!(exit.signal, Some(2));

            // Exactly one termination sequence: nothing follows the exit
            drop(handle);
            assert!(rx.recv().await.is_none());
        }

        #[tokio::test]
        async fn test_escalates_to_kill_after_grace_period() {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let command = TranscoderCommand::new("sh", ["-c", "trap '' INT; exec sleep 30"]);

            let handle = ProcessHandle::spawn(&command, Duration::from_millis(200), tx).unwrap();
            // Give the shell time to install the trap
            tokio::time::sleep(Duration::from_millis(200)).await;

            let started = std::time::Instant::now();
            assert!(handle.signal_stop(true));

            let (_, exit) = wait_exit(&mut rx).await;
            assert_eq!(exit.signal, Some(9));
            assert!(exit.requested);
            assert!(started.elapsed() >= Duration::from_millis(200));
        }

        #[tokio::test]
        async fn test_stop_during_output_drain_is_not_requested() {
            let (tx, mut rx) = mpsc::unbounded_channel();
            // The background child holds the pipes open after the shell exits
            let command = TranscoderCommand::new("sh", ["-c", "(sleep 3) & exit 1"]);

            let handle = ProcessHandle::spawn(&command, Duration::from_secs(1), tx).unwrap();
            tokio::time::sleep(Duration::from_millis(300)).await;

            assert!(handle.has_exited());
            assert!(!handle.signal_stop(true));

            let (_, exit) = wait_exit(&mut rx).await;
            assert_eq!(exit.code, Some(1));
            assert!(!exit.requested);
        }

        #[tokio::test]
        async fn test_stop_after_exit_is_noop() {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let command = TranscoderCommand::new("true", Vec::<String>::new());

            let handle = ProcessHandle::spawn(&command, Duration::from_secs(1), tx).unwrap();
            let (_, exit) = wait_exit(&mut rx).await;

            assert!(exit.is_success());
            assert!(!handle.signal_stop(true));
        }
    }
}
