//! Supervision of the slapd subprocess.

use ldap_fixture_core::{Error, Result};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

/// Delay between readiness probes.
pub const READY_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// How a supervised process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code, `None` when killed by a signal or the status was lost.
    pub code: Option<i32>,
}

impl ProcessExit {
    /// Whether the process exited with status zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.code, Some(0))
    }
}

/// Cloneable handle observing a process's exit.
#[derive(Debug, Clone)]
pub struct ExitWatch {
    rx: watch::Receiver<Option<ProcessExit>>,
}

impl ExitWatch {
    /// Non-blocking: the exit status if the process has ended.
    #[must_use]
    pub fn poll(&self) -> Option<ProcessExit> {
        *self.rx.borrow()
    }

    /// Waits for the process to end; `None` waits forever.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if the process is still running after `limit`.
    pub async fn wait(&self, limit: Option<Duration>) -> Result<ProcessExit> {
        let mut rx = self.rx.clone();
        let exited = async move {
            rx.wait_for(Option::is_some)
                .await
                .map(|exit| (*exit).unwrap_or(ProcessExit { code: None }))
                .map_err(|_| Error::Io("process reaper ended without an exit status".to_string()))
        };
        match limit {
            None => exited.await,
            Some(limit) => timeout(limit, exited).await.map_err(|_| {
                Error::Timeout(format!("process still running after {limit:?}"))
            })?,
        }
    }
}

/// A running slapd, owned by a background reaper task.
///
/// Dropping the handle does not kill the process.
#[derive(Debug)]
pub struct ServerProcess {
    pid: u32,
    program: String,
    exit: ExitWatch,
    reaper: JoinHandle<()>,
}

impl ServerProcess {
    /// Spawns `program` with inherited stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the program cannot be started.
    pub fn launch(program: &Path, args: &[String]) -> Result<Self> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(false)
            .spawn()
            .map_err(|err| Error::Io(format!("failed to start {}: {err}", program.display())))?;

        let pid = child
            .id()
            .ok_or_else(|| Error::Io("failed to get process ID".to_string()))?;
        let name = program
            .file_name()
            .map_or_else(|| program.display().to_string(), |name| name.to_string_lossy().into_owned());

        let (tx, rx) = watch::channel(None);
        let reaper_name = name.clone();
        let reaper = tokio::spawn(async move {
            let exit = match child.wait().await {
                Ok(status) => ProcessExit {
                    code: status.code(),
                },
                Err(err) => {
                    warn!(program = %reaper_name, pid, error = %err, "lost track of process");
                    ProcessExit { code: None }
                }
            };
            debug!(program = %reaper_name, pid, code = ?exit.code, "process exited");
            let _ = tx.send(Some(exit));
        });

        info!(program = %name, pid, "launched process");
        Ok(Self {
            pid,
            program: name,
            exit: ExitWatch { rx },
            reaper,
        })
    }

    /// OS process id.
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// The exit status if the process has ended.
    #[must_use]
    pub fn poll(&self) -> Option<ProcessExit> {
        self.exit.poll()
    }

    /// A handle that can wait for the exit without borrowing `self`.
    #[must_use]
    pub fn exit_watch(&self) -> ExitWatch {
        self.exit.clone()
    }

    /// Waits for the process to end; `None` waits forever.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if it is still running after `limit`.
    pub async fn wait(&self, limit: Option<Duration>) -> Result<ProcessExit> {
        self.exit.wait(limit).await
    }

    /// Sends SIGTERM and waits for the process to end.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the signal cannot be delivered.
    pub async fn terminate(self) -> Result<ProcessExit> {
        if self.poll().is_none() {
            let pid = i32::try_from(self.pid)
                .map_err(|_| Error::Io(format!("pid {} out of range", self.pid)))?;
            match kill(Pid::from_raw(pid), Signal::SIGTERM) {
                Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
                Err(err) => {
                    return Err(Error::Io(format!(
                        "failed to signal {} ({}): {err}",
                        self.program, self.pid
                    )))
                }
            }
            debug!(program = %self.program, pid = self.pid, "sent SIGTERM");
        }

        let exit = self.exit.wait(None).await?;
        if let Err(err) = self.reaper.await {
            warn!(error = %err, "process reaper task failed");
        }
        info!(program = %self.program, pid = self.pid, code = ?exit.code, "process terminated");
        Ok(exit)
    }

    /// Polls until `host:port` accepts TCP connections.
    ///
    /// Sleeps one [`READY_POLL_INTERVAL`] before the first probe and between
    /// probes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StartupFailed`] if the process exits first or the
    /// port is still closed after `limit`.
    pub async fn wait_ready(&self, host: &str, port: u16, limit: Duration) -> Result<()> {
        let deadline = Instant::now() + limit;
        sleep(READY_POLL_INTERVAL).await;
        loop {
            if let Some(exit) = self.poll() {
                return Err(Error::StartupFailed(format!(
                    "{} exited during startup with code {:?}",
                    self.program, exit.code
                )));
            }
            match timeout(READY_POLL_INTERVAL, TcpStream::connect((host, port))).await {
                Ok(Ok(_)) => {
                    debug!(host, port, "server is accepting connections");
                    return Ok(());
                }
                Ok(Err(err)) => debug!(host, port, error = %err, "server not ready yet"),
                Err(_) => debug!(host, port, "connection attempt timed out"),
            }
            if Instant::now() >= deadline {
                return Err(Error::StartupFailed(format!(
                    "{} did not accept connections on {host}:{port} within {limit:?}",
                    self.program
                )));
            }
            sleep(READY_POLL_INTERVAL).await;
        }
    }
}
