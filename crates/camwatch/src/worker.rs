//! Per-camera processing loop
//!
//! One iteration: pull a frame, detect, count tracked classes, publish the
//! message on the shared topic, mirror it to the stream sink, then pause for
//! the pacing interval. The loop only ends on a source or detector failure.

use crate::config::{CoverageArea, WorkerConfig};
use crate::counts::CountSnapshot;
use crate::detect::{DetectError, Detector};
use crate::message::DetectionMessage;
use crate::publish::Publisher;
use crate::source::{FrameSource, SourceError};
use crate::stream::StreamSink;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Frame source failed: {0}")]
    Source(#[from] SourceError),
    #[error("Detection failed: {0}")]
    Detect(#[from] DetectError),
    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Static identity of the messages a worker produces
#[derive(Debug, Clone)]
pub struct WorkerIdentity {
    pub camera_id: String,
    pub coverage_area: CoverageArea,
    pub topic: String,
    pub pacing: Duration,
}

impl From<&WorkerConfig> for WorkerIdentity {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            camera_id: config.camera.id.clone(),
            coverage_area: config.camera.coverage_area,
            topic: config.broker.topic.clone(),
            pacing: config.worker.pacing_interval(),
        }
    }
}

pub struct Worker<D, P> {
    identity: WorkerIdentity,
    source: FrameSource,
    detector: D,
    publisher: P,
    stream: Option<StreamSink>,
    published: u64,
    publish_failures: u64,
    publish_warnings: WarningThrottle,
    last_report: Instant,
}

/// Interval between throughput log lines
const REPORT_INTERVAL: Duration = Duration::from_secs(10);

/// Minimum interval between two publish failure warnings
const PUBLISH_WARN_INTERVAL: Duration = Duration::from_secs(10);

/// Lets one warning through per interval and counts the ones held back
#[derive(Debug)]
struct WarningThrottle {
    interval: Duration,
    last: Option<Instant>,
    suppressed: u64,
}

impl WarningThrottle {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
            suppressed: 0,
        }
    }

    /// `Some(n)` when a warning is due, `n` being how many were held back
    /// since the previous one
    fn allow(&mut self, now: Instant) -> Option<u64> {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => {
                self.suppressed += 1;
                None
            }
            _ => {
                self.last = Some(now);
                Some(std::mem::take(&mut self.suppressed))
            }
        }
    }
}

impl<D: Detector, P: Publisher> Worker<D, P> {
    pub fn new(identity: WorkerIdentity, source: FrameSource, detector: D, publisher: P) -> Self {
        Self {
            identity,
            source,
            detector,
            publisher,
            stream: None,
            published: 0,
            publish_failures: 0,
            publish_warnings: WarningThrottle::new(PUBLISH_WARN_INTERVAL),
            last_report: Instant::now(),
        }
    }

    /// Mirror every payload to directly connected clients
    pub fn with_stream(mut self, stream: StreamSink) -> Self {
        self.stream = Some(stream);
        self
    }

    pub fn camera_id(&self) -> &str {
        &self.identity.camera_id
    }

    /// Messages handed to the publisher so far
    pub fn published(&self) -> u64 {
        self.published
    }

    /// Process one frame without pacing.
    ///
    /// Publish failures do not fail the step. They are logged at most once
    /// per ten seconds.
    pub async fn step(&mut self) -> Result<DetectionMessage, WorkerError> {
        let frame = self.source.next_frame().await?;
        let detections = self.detector.detect(&frame)?;
        drop(frame);

        let counts = CountSnapshot::from_detections(&detections);
        let message = DetectionMessage::new(
            &self.identity.camera_id,
            self.identity.coverage_area,
            counts,
        );
        let payload = message.to_json()?;

        match self.publisher.publish(&self.identity.topic, &payload) {
            Ok(()) => self.published += 1,
            Err(e) => {
                self.publish_failures += 1;
                match self.publish_warnings.allow(Instant::now()) {
                    Some(0) => log::warn!("[{}] {}", self.identity.camera_id, e),
                    Some(suppressed) => log::warn!(
                        "[{}] {} ({} more failures since the last warning)",
                        self.identity.camera_id,
                        e,
                        suppressed
                    ),
                    None => {}
                }
            }
        }

        if let Some(stream) = &self.stream {
            stream.forward(&payload);
        }

        Ok(message)
    }

    /// Run until a step fails.
    ///
    /// The frame source is released when the worker is dropped, whichever
    /// way the loop ended.
    pub async fn run(mut self) -> Result<(), WorkerError> {
        log::info!(
            "[{}] Processing '{}' with {} at {:.1} fps",
            self.identity.camera_id,
            self.source.locator(),
            self.detector.name(),
            1.0 / self.identity.pacing.as_secs_f64()
        );

        loop {
            if let Err(e) = self.step().await {
                log::error!("Error in camera {}: {}", self.identity.camera_id, e);
                return Err(e);
            }
            self.report();
            tokio::time::sleep(self.identity.pacing).await;
        }
    }

    fn report(&mut self) {
        if self.last_report.elapsed() < REPORT_INTERVAL {
            return;
        }
        log::debug!(
            "[{}] {} messages published, {} publish failures",
            self.identity.camera_id,
            self.published,
            self.publish_failures
        );
        self.last_report = Instant::now();
    }
}
