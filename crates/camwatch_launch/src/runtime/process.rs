//! Camera worker child process

use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

/// Process status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// Not spawned yet
    Pending,
    /// Spawned and not yet observed to exit
    Running,
    /// Exited with a code, `None` when ended by a signal
    Exited(Option<i32>),
    /// Could not be spawned
    Failed,
}

impl ProcessStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, ProcessStatus::Running)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, ProcessStatus::Exited(_) | ProcessStatus::Failed)
    }
}

/// Configuration for spawning a process
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Camera id, used to tag forwarded output
    pub name: String,
    /// Executable path
    pub executable: String,
    /// Command line arguments
    pub args: Vec<String>,
}

/// Event emitted by a managed process
#[derive(Debug, Clone)]
pub enum ProcessEvent {
    /// Process started
    Started { pid: u32 },
    /// Process output line (stdout or stderr)
    Output { line: String, is_stderr: bool },
}

pub type EventSender = mpsc::UnboundedSender<(String, ProcessEvent)>;

/// A supervised worker process
pub struct ManagedProcess {
    pub config: ProcessConfig,
    pub status: ProcessStatus,
    pub pid: Option<u32>,
    child: Option<Child>,
    event_tx: Option<EventSender>,
}

impl ManagedProcess {
    pub fn new(config: ProcessConfig) -> Self {
        Self {
            config,
            status: ProcessStatus::Pending,
            pid: None,
            child: None,
            event_tx: None,
        }
    }

    /// Set the event sender for this process
    pub fn with_event_sender(mut self, tx: EventSender) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Spawn the process with piped stdout and stderr
    pub fn start(&mut self) -> Result<(), ProcessError> {
        if self.status.is_running() {
            return Err(ProcessError::AlreadyRunning(self.config.name.clone()));
        }

        log::debug!(
            "[{}] Starting: {} {}",
            self.config.name,
            self.config.executable,
            self.config.args.join(" ")
        );

        let mut cmd = Command::new(&self.config.executable);
        cmd.args(&self.config.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                self.status = ProcessStatus::Failed;
                return Err(ProcessError::SpawnFailed {
                    name: self.config.name.clone(),
                    source: e,
                });
            }
        };

        let pid = child.id().unwrap_or(0);
        self.pid = Some(pid);
        self.status = ProcessStatus::Running;

        if let Some(tx) = &self.event_tx {
            let _ = tx.send((self.config.name.clone(), ProcessEvent::Started { pid }));

            if let Some(stdout) = child.stdout.take() {
                forward_lines(self.config.name.clone(), stdout, false, tx.clone());
            }
            if let Some(stderr) = child.stderr.take() {
                forward_lines(self.config.name.clone(), stderr, true, tx.clone());
            }
        }

        self.child = Some(child);
        Ok(())
    }

    /// Poll for exit without blocking
    pub fn check_status(&mut self) -> ProcessStatus {
        if let Some(child) = &mut self.child {
            match child.try_wait() {
                Ok(Some(status)) => self.mark_exited(status),
                Ok(None) => {}
                Err(e) => {
                    log::error!(
                        "[{}] Error checking process status: {}",
                        self.config.name,
                        e
                    );
                }
            }
        }

        self.status
    }

    /// Ask the process to exit (SIGTERM on Unix, kill elsewhere)
    pub fn terminate(&mut self) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let (Some(_), Some(pid)) = (&self.child, self.pid) {
                if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                    log::debug!("[{}] SIGTERM failed: {}", self.config.name, e);
                }
            }
        }

        #[cfg(not(unix))]
        {
            if let Some(child) = &mut self.child {
                let _ = child.start_kill();
            }
        }
    }

    /// Wait for exit until `timeout`, then force kill
    pub async fn wait_or_kill(&mut self, timeout: Duration) -> ProcessStatus {
        let Some(child) = &mut self.child else {
            return self.status;
        };

        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => self.mark_exited(status),
            Ok(Err(e)) => {
                log::error!("[{}] Error waiting for process: {}", self.config.name, e);
                self.status = ProcessStatus::Exited(None);
                self.child = None;
                self.pid = None;
            }
            Err(_) => {
                log::warn!(
                    "[{}] Process did not exit gracefully, forcing kill",
                    self.config.name
                );
                if let Err(e) = child.kill().await {
                    log::error!("[{}] Failed to kill process: {}", self.config.name, e);
                }
                self.status = ProcessStatus::Exited(None);
                self.child = None;
                self.pid = None;
            }
        }

        self.status
    }

    /// Stop the process gracefully (SIGTERM, then SIGKILL after timeout)
    pub async fn stop(&mut self, timeout: Duration) -> ProcessStatus {
        self.terminate();
        self.wait_or_kill(timeout).await
    }

    fn mark_exited(&mut self, status: ExitStatus) {
        self.status = ProcessStatus::Exited(status.code());
        self.child = None;
        self.pid = None;
    }
}

fn forward_lines<R>(name: String, stream: R, is_stderr: bool, tx: EventSender)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx
                .send((name.clone(), ProcessEvent::Output { line, is_stderr }))
                .is_err()
            {
                break;
            }
        }
    });
}

/// Errors that can occur with managed processes
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Process '{0}' is already running")]
    AlreadyRunning(String),

    #[error("Failed to spawn process '{name}': {source}")]
    SpawnFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },
}
