//! Shell Process Bridge
//!
//! Spawns one shell per session and wires its pipes:
//! - stdin is fed from an unbounded channel by a writer task
//! - stdout and stderr are read by two reader tasks into one output channel
//! - a supervisor task owns the child, forwards output as events and
//!   reports termination exactly once

use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::events::{BackendEvent, EventBus};

/// How to launch the shell for a new session
#[derive(Debug, Clone)]
pub struct ShellLauncher {
    /// Shell program
    pub program: String,
    /// Shell arguments
    pub args: Vec<String>,
    /// Read buffer size for output pipes
    pub buffer_size: usize,
    /// How long to keep draining output once the shell has exited
    pub exit_grace: Duration,
}

impl ShellLauncher {
    /// Spawn the shell in `cwd`.
    ///
    /// Must be called from within a tokio runtime; the returned
    /// [`ShellIo`] has to be driven by [`ShellIo::supervise`].
    pub fn spawn(&self, cwd: &Path) -> std::io::Result<(ShellProcess, ShellIo)> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let pid = child.id();
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (input_tx, input_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let (output_tx, output_rx) = mpsc::channel::<String>(64);
        let (kill_tx, kill_rx) = oneshot::channel();

        let writer = stdin.map(|stdin| tokio::spawn(feed_input(stdin, input_rx)));

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = stdout {
            readers.push(tokio::spawn(pump_output(
                stdout,
                output_tx.clone(),
                self.buffer_size,
            )));
        }
        if let Some(stderr) = stderr {
            readers.push(tokio::spawn(pump_output(stderr, output_tx, self.buffer_size)));
        }

        let process = ShellProcess {
            pid,
            input_tx,
            kill_tx: Some(kill_tx),
        };
        let io = ShellIo {
            child,
            output_rx,
            kill_rx,
            readers,
            writer,
            exit_grace: self.exit_grace,
        };

        Ok((process, io))
    }
}

/// Control handle for a running shell, owned by the terminal registry
#[derive(Debug)]
pub struct ShellProcess {
    /// OS process id
    pub pid: Option<u32>,
    /// Bytes queued for the shell's stdin
    input_tx: mpsc::UnboundedSender<Vec<u8>>,
    /// Kill switch; dropping it also terminates the shell
    kill_tx: Option<oneshot::Sender<()>>,
}

impl ShellProcess {
    /// Queue `data` for the shell's stdin. Returns false once stdin is closed.
    pub fn write(&self, data: &str) -> bool {
        self.input_tx.send(data.as_bytes().to_vec()).is_ok()
    }

    /// Ask the supervisor to kill the shell
    pub fn terminate(&mut self) {
        if let Some(tx) = self.kill_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// The process side of a session: child handle plus pipe tasks
pub struct ShellIo {
    child: Child,
    output_rx: mpsc::Receiver<String>,
    kill_rx: oneshot::Receiver<()>,
    readers: Vec<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
    exit_grace: Duration,
}

impl ShellIo {
    /// Forward output until the shell exits, then call `on_exit` and emit
    /// the exit event. Runs to completion exactly once per spawned shell.
    pub async fn supervise<F>(self, id: String, bus: EventBus, on_exit: F)
    where
        F: FnOnce() + Send,
    {
        let ShellIo {
            mut child,
            mut output_rx,
            mut kill_rx,
            readers,
            writer,
            exit_grace,
        } = self;

        let mut output_open = true;
        let mut kill_requested = false;

        // output waits for slow subscribers; once a kill is requested the
        // rest is published without waiting and may be dropped
        let status = loop {
            tokio::select! {
                chunk = output_rx.recv(), if output_open => match chunk {
                    Some(data) => {
                        let event = BackendEvent::terminal_data(&id, data);
                        if kill_requested {
                            bus.try_publish(event);
                        } else {
                            tokio::select! {
                                _ = bus.publish(event) => {}
                                _ = &mut kill_rx => {
                                    kill_requested = true;
                                    kill_shell(&mut child, &id);
                                }
                            }
                        }
                    }
                    None => output_open = false,
                },
                status = child.wait() => break status,
                _ = &mut kill_rx, if !kill_requested => {
                    kill_requested = true;
                    kill_shell(&mut child, &id);
                }
            }
        };

        // exit_grace bounds the time spent waiting for output, not the time
        // spent delivering it
        if output_open {
            let mut budget = exit_grace;
            loop {
                let waiting = Instant::now();
                match tokio::time::timeout(budget, output_rx.recv()).await {
                    Ok(Some(data)) => {
                        budget = budget.saturating_sub(waiting.elapsed());
                        let event = BackendEvent::terminal_data(&id, data);
                        if kill_requested {
                            bus.try_publish(event);
                        } else {
                            bus.publish(event).await;
                        }
                    }
                    Ok(None) => break,
                    Err(_) => {
                        warn!(
                            "Output of terminal {} still open {}ms after exit, dropping the rest",
                            id,
                            exit_grace.as_millis()
                        );
                        break;
                    }
                }
            }
        }

        for reader in readers {
            reader.abort();
        }
        if let Some(writer) = writer {
            writer.abort();
        }

        log_exit(&id, &status);
        on_exit();
        bus.publish(BackendEvent::terminal_exit(&id)).await;
    }
}

fn kill_shell(child: &mut Child, id: &str) {
    debug!("Killing shell for terminal {}", id);
    if let Err(e) = child.start_kill() {
        error!("Failed to kill shell for terminal {}: {}", id, e);
    }
}

fn log_exit(id: &str, status: &std::io::Result<ExitStatus>) {
    match status {
        Ok(status) => info!("Terminal {} exited with {}", id, status),
        Err(e) => warn!("Terminal {} exited, wait failed: {}", id, e),
    }
}

/// Copy queued input to the shell's stdin until either side closes
async fn feed_input(mut stdin: ChildStdin, mut input_rx: mpsc::UnboundedReceiver<Vec<u8>>) {
    while let Some(bytes) = input_rx.recv().await {
        if let Err(e) = stdin.write_all(&bytes).await {
            debug!("Shell stdin closed: {}", e);
            break;
        }
        if let Err(e) = stdin.flush().await {
            debug!("Shell stdin flush failed: {}", e);
            break;
        }
    }
}

/// Read a pipe to EOF, sending decoded text chunks to the supervisor
async fn pump_output<R>(mut reader: R, output_tx: mpsc::Sender<String>, buffer_size: usize)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; buffer_size.max(256)];
    let mut decoder = Utf8Decoder::default();

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let text = decoder.push(&buf[..n]);
                if !text.is_empty() && output_tx.send(text).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                debug!("Shell output pipe failed: {}", e);
                break;
            }
        }
    }

    let rest = decoder.finish();
    if !rest.is_empty() {
        let _ = output_tx.send(rest).await;
    }
}

/// Incremental UTF-8 decoder that holds back a split multi-byte sequence
/// until the next chunk arrives. Invalid bytes become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Decode as much of `bytes` (plus any held-back tail) as possible
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        // incomplete sequence at the end
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                    }
                }
            }
        }

        out
    }

    /// Flush whatever is held back
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}

/// Working directory check done before spawning, so a bad cwd is reported
/// as such rather than as a missing shell.
pub fn validate_cwd(cwd: &Path) -> Result<PathBuf, String> {
    if cwd.is_dir() {
        Ok(cwd.to_path_buf())
    } else {
        Err(format!("Working directory does not exist: {}", cwd.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_passes_ascii() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.push(b"hello\n"), "hello\n");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn test_decoder_joins_split_sequence() {
        let snowman = "☃".as_bytes();
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.push(&[b'a', snowman[0]]), "a");
        assert_eq!(decoder.push(&snowman[1..]), "☃");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn test_decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.push(&[b'a', 0xff, b'b']), "a\u{FFFD}b");
    }

    #[test]
    fn test_decoder_flushes_truncated_tail() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.push(&[0xe2, 0x98]), "");
        assert_eq!(decoder.finish(), "\u{FFFD}");
    }

    #[test]
    fn test_validate_cwd() {
        let dir = tempfile::tempdir().unwrap();
        assert!(validate_cwd(dir.path()).is_ok());
        assert!(validate_cwd(&dir.path().join("missing")).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_supervisor_emits_output_then_exit() {
        let launcher = ShellLauncher {
            program: "/bin/sh".to_string(),
            args: Vec::new(),
            buffer_size: 1024,
            exit_grace: Duration::from_secs(2),
        };
        let dir = tempfile::tempdir().unwrap();
        let (process, io) = launcher.spawn(dir.path()).unwrap();
        assert!(process.pid.is_some());

        let bus = EventBus::new(64);
        let mut rx = bus.subscribe();
        let supervisor = tokio::spawn(io.supervise("t1".to_string(), bus.clone(), || {}));

        assert!(process.write("echo bridge-ok; exit\n"));

        let mut output = String::new();
        let exit = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                match rx.recv().await.unwrap() {
                    BackendEvent::TerminalData(p) => output.push_str(&p.data),
                    BackendEvent::TerminalExit(p) => break p,
                    other => panic!("unexpected event {:?}", other),
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(exit.id, "t1");
        assert!(output.contains("bridge-ok"));
        supervisor.await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_kill_while_subscriber_is_stalled() {
        let launcher = ShellLauncher {
            program: "/bin/sh".to_string(),
            args: Vec::new(),
            buffer_size: 1024,
            exit_grace: Duration::from_secs(2),
        };
        let dir = tempfile::tempdir().unwrap();
        let (mut process, io) = launcher.spawn(dir.path()).unwrap();

        let bus = EventBus::new(1);
        let mut rx = bus.subscribe();
        let supervisor = tokio::spawn(io.supervise("t1".to_string(), bus.clone(), || {}));

        assert!(process.write("yes\n"));
        // let the queue fill up while nobody reads
        tokio::time::sleep(Duration::from_millis(300)).await;
        process.terminate();

        let exit = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                if let Some(BackendEvent::TerminalExit(p)) = rx.recv().await {
                    break p;
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(exit.id, "t1");
        supervisor.await.unwrap();
    }
}
