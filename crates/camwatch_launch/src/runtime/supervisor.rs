//! Supervision of the camera worker processes
//!
//! The supervisor spawns every worker, forwards their output tagged with the
//! camera id, and reports each exit once. Exited workers are not restarted.

use crate::runtime::process::{
    ManagedProcess, ProcessConfig, ProcessError, ProcessEvent, ProcessStatus,
};
use indexmap::IndexMap;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Supervisor configuration
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Interval between exit checks
    pub poll_interval: Duration,
    /// Grace period between SIGTERM and a forced kill
    pub shutdown_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

/// Why supervision stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every worker exited on its own
    AllExited,
    /// The operator interrupted the launcher
    Interrupted,
}

/// What one poll observed
#[derive(Debug, Default)]
pub struct PollReport {
    /// Output lines forwarded, already tagged
    pub forwarded: Vec<String>,
    /// Workers observed to exit during this poll, with their exit code
    pub exited: Vec<(String, Option<i32>)>,
    /// Workers still running after this poll
    pub active: usize,
}

/// Format an output line of a worker
pub fn tag_line(camera_id: &str, line: &str, is_stderr: bool) -> String {
    if is_stderr {
        format!("[{} ERROR] {}", camera_id, line)
    } else {
        format!("[{}] {}", camera_id, line)
    }
}

/// Format the exit report of a worker
pub fn exit_line(camera_id: &str, code: Option<i32>) -> String {
    match code {
        Some(code) => format!("Camera {} process exited with code {}", camera_id, code),
        None => format!("Camera {} process exited without a code (signal)", camera_id),
    }
}

pub struct Supervisor {
    config: SupervisorConfig,
    processes: IndexMap<String, ManagedProcess>,
    exited: Vec<(String, Option<i32>)>,
    event_tx: mpsc::UnboundedSender<(String, ProcessEvent)>,
    event_rx: mpsc::UnboundedReceiver<(String, ProcessEvent)>,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            config,
            processes: IndexMap::new(),
            exited: Vec::new(),
            event_tx,
            event_rx,
        }
    }

    /// Register a worker; replaces a previous one with the same name
    pub fn add(&mut self, config: ProcessConfig) {
        let name = config.name.clone();
        let process = ManagedProcess::new(config).with_event_sender(self.event_tx.clone());
        if self.processes.insert(name.clone(), process).is_some() {
            log::warn!("Camera {} configured twice, keeping the last entry", name);
        }
    }

    /// Spawn every registered worker in order.
    ///
    /// Stops at the first spawn failure; workers already running keep running
    /// and are left to [`Supervisor::shutdown`].
    pub fn spawn_all(&mut self) -> Result<(), SupervisorError> {
        log::info!("Starting {} cameras...", self.processes.len());

        for (name, process) in self.processes.iter_mut() {
            process.start().map_err(|e| SupervisorError::SpawnFailed {
                camera: name.clone(),
                source: e,
            })?;
            log::info!("Starting {} (pid {})", name, process.pid.unwrap_or(0));
        }

        log::info!("All cameras started");
        Ok(())
    }

    /// Forward pending output, then record workers that exited
    pub fn poll_once(&mut self) -> PollReport {
        let mut report = PollReport::default();

        while let Ok((name, event)) = self.event_rx.try_recv() {
            match event {
                ProcessEvent::Output { line, is_stderr } => {
                    let tagged = tag_line(&name, &line, is_stderr);
                    println!("{}", tagged);
                    report.forwarded.push(tagged);
                }
                ProcessEvent::Started { pid } => {
                    log::debug!("[{}] Process started with PID: {}", name, pid);
                }
            }
        }

        for (name, process) in self.processes.iter_mut() {
            if !process.status.is_running() {
                continue;
            }
            if let ProcessStatus::Exited(code) = process.check_status() {
                log::info!("{}", exit_line(name, code));
                report.exited.push((name.clone(), code));
            }
        }

        self.exited.extend(report.exited.iter().cloned());
        report.active = self.active_count();
        report
    }

    /// Supervise until every worker exited or `shutdown_rx` fires
    pub async fn run(&mut self, mut shutdown_rx: watch::Receiver<()>) -> Outcome {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    log::info!("Shutdown signal received");
                    return Outcome::Interrupted;
                }
                _ = ticker.tick() => {
                    if self.poll_once().active == 0 {
                        log::info!("All camera processes have exited");
                        return Outcome::AllExited;
                    }
                }
            }
        }
    }

    /// SIGTERM every live worker, then wait for all of them to exit
    pub async fn shutdown(&mut self) {
        let live: Vec<String> = self
            .processes
            .iter()
            .filter(|(_, p)| p.status.is_running())
            .map(|(name, _)| name.clone())
            .collect();
        if live.is_empty() {
            return;
        }

        log::info!("Stopping {} camera processes...", live.len());
        for name in &live {
            if let Some(process) = self.processes.get_mut(name) {
                process.terminate();
            }
        }

        let deadline = tokio::time::Instant::now() + self.config.shutdown_timeout;
        for name in &live {
            if let Some(process) = self.processes.get_mut(name) {
                let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
                let status = process.wait_or_kill(remaining).await;
                log::debug!("[{}] Stopped: {:?}", name, status);
            }
        }

        // Output written just before exit
        self.poll_once();
        log::info!("All cameras stopped");
    }

    /// Workers not yet observed to exit
    pub fn active_count(&self) -> usize {
        self.processes
            .values()
            .filter(|p| p.status.is_running())
            .count()
    }

    /// Exits reported so far, in the order they were observed
    pub fn exited(&self) -> &[(String, Option<i32>)] {
        &self.exited
    }

    /// Per-worker status summary
    pub fn status(&self) -> Vec<(&str, ProcessStatus)> {
        self.processes
            .iter()
            .map(|(name, p)| (name.as_str(), p.status))
            .collect()
    }
}

/// Errors that can occur while supervising
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Failed to start camera '{camera}': {source}")]
    SpawnFailed {
        camera: String,
        #[source]
        source: ProcessError,
    },
}
