//! Background scheduling of a camera's worker loop

use crate::stream::StreamSink;
use crate::worker::WorkerError;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::task::{AbortHandle, JoinHandle};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Worker loop was never started or already joined")]
    NotStarted,
    #[error(transparent)]
    Worker(#[from] WorkerError),
    #[error("Worker task aborted: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("Endpoint failed: {0}")]
    Endpoint(#[source] std::io::Error),
    #[error("Endpoint stopped while the worker was running")]
    EndpointStopped,
}

type WorkerHandle = JoinHandle<Result<(), WorkerError>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Clears the running flag when the worker task ends, including on abort
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Returns the join handle to its slot when a `join` future is dropped early
struct PendingJoin<'a> {
    slot: &'a Mutex<Option<WorkerHandle>>,
    handle: Option<WorkerHandle>,
}

impl Drop for PendingJoin<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            *lock(self.slot) = Some(handle);
        }
    }
}

/// Owns the single worker task of a camera process
pub struct CameraService {
    camera_id: String,
    started: AtomicBool,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<WorkerHandle>>,
    abort: Mutex<Option<AbortHandle>>,
    stream: Option<StreamSink>,
}

impl CameraService {
    pub fn new(camera_id: impl Into<String>) -> Self {
        Self {
            camera_id: camera_id.into(),
            started: AtomicBool::new(false),
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
            abort: Mutex::new(None),
            stream: None,
        }
    }

    /// Attach the sink that WebSocket clients subscribe to
    pub fn with_stream(mut self, stream: StreamSink) -> Self {
        self.stream = Some(stream);
        self
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    pub fn stream(&self) -> Option<&StreamSink> {
        self.stream.as_ref()
    }

    /// Spawn the worker loop.
    ///
    /// Only the first call schedules anything; later calls return `false`
    /// and drop `worker` unpolled.
    pub fn start<F>(&self, worker: F) -> bool
    where
        F: Future<Output = Result<(), WorkerError>> + Send + 'static,
    {
        if self.started.swap(true, Ordering::SeqCst) {
            log::debug!("Worker for {} already started", self.camera_id);
            return false;
        }

        self.running.store(true, Ordering::SeqCst);
        let guard = RunningGuard(self.running.clone());
        let handle = tokio::spawn(async move {
            let _guard = guard;
            worker.await
        });

        *lock(&self.abort) = Some(handle.abort_handle());
        *lock(&self.worker) = Some(handle);
        log::info!("Started worker loop for {}", self.camera_id);
        true
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Wait for the worker loop to end and return how it ended.
    ///
    /// Dropping the returned future leaves the task joinable and stoppable.
    pub async fn join(&self) -> Result<(), ServiceError> {
        let handle = lock(&self.worker).take().ok_or(ServiceError::NotStarted)?;
        let mut pending = PendingJoin {
            slot: &self.worker,
            handle: Some(handle),
        };
        let result = match pending.handle.as_mut() {
            Some(handle) => handle.await,
            None => return Err(ServiceError::NotStarted),
        };
        pending.handle = None;
        result??;
        Ok(())
    }

    /// Abort the worker task if it is still running
    pub fn stop(&self) {
        if let Some(abort) = lock(&self.abort).as_ref() {
            abort.abort();
        }
    }

    /// Abort the worker task and wait until it has released its resources
    pub async fn shutdown(&self) {
        self.stop();
        match self.join().await {
            Ok(()) | Err(ServiceError::NotStarted) => {}
            Err(ServiceError::Join(e)) if e.is_cancelled() => {}
            Err(e) => log::warn!("[{}] Worker ended while stopping: {}", self.camera_id, e),
        }
    }

    /// Drive a started service until its worker loop ends, `server` ends, or
    /// `shutdown` resolves.
    ///
    /// Only `shutdown` yields `Ok`. In every case the worker task has ended
    /// and `server` has been dropped when this returns.
    pub async fn run_until<S, F>(&self, server: S, shutdown: F) -> Result<(), ServiceError>
    where
        S: Future<Output = std::io::Result<()>>,
        F: Future<Output = ()>,
    {
        tokio::pin!(server);
        tokio::pin!(shutdown);

        let outcome = tokio::select! {
            result = self.join() => return result,
            result = &mut server => match result {
                Ok(()) => Err(ServiceError::EndpointStopped),
                Err(e) => Err(ServiceError::Endpoint(e)),
            },
            _ = &mut shutdown => {
                log::info!("[{}] Stopping worker loop", self.camera_id);
                Ok(())
            }
        };

        self.shutdown().await;
        outcome
    }
}
