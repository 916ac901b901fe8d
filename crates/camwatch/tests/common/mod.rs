//! Test doubles for the worker pipeline

#![allow(dead_code)]

use camwatch::config::RetryPolicy;
use camwatch::detect::{BoundingBox, DetectError, Detection, Detector};
use camwatch::frame::Frame;
use camwatch::publish::{PublishError, Publisher};
use camwatch::source::{CaptureError, CaptureOpener, FrameSource, VideoCapture};
use camwatch::worker::WorkerIdentity;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Capture over `len` synthetic frames; frame `i` has every pixel set to `i`
pub struct SyntheticCapture {
    len: usize,
    position: usize,
    broken: bool,
    released: Arc<AtomicBool>,
}

impl VideoCapture for SyntheticCapture {
    fn is_opened(&self) -> bool {
        true
    }

    fn read(&mut self) -> Result<Option<Frame>, CaptureError> {
        if self.broken {
            return Err(CaptureError::Read("device gone".to_string()));
        }
        if self.position == self.len {
            return Ok(None);
        }
        let value = self.position as u8;
        self.position += 1;
        Ok(Some(Frame::filled(4, 4, [value; 3])))
    }

    fn rewind(&mut self) -> Result<(), CaptureError> {
        self.position = 0;
        Ok(())
    }

    fn release(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Looping source over `len` frames; the flag flips when the capture is released
pub fn synthetic_source(len: usize) -> (FrameSource, Arc<AtomicBool>) {
    let released = Arc::new(AtomicBool::new(false));
    let flag = released.clone();
    let opener: CaptureOpener = Box::new(move |_| {
        Ok(Box::new(SyntheticCapture {
            len,
            position: 0,
            broken: false,
            released: flag.clone(),
        }) as Box<dyn VideoCapture>)
    });
    let source = FrameSource::with_opener("synthetic", RetryPolicy::default(), opener)
        .expect("synthetic source opens");
    (source, released)
}

/// Source whose first read fails and every reopen fails after it; counts opens
pub fn vanishing_source(policy: RetryPolicy) -> (FrameSource, Arc<AtomicUsize>, Arc<AtomicBool>) {
    let opens = Arc::new(AtomicUsize::new(0));
    let released = Arc::new(AtomicBool::new(false));
    let (open_count, flag) = (opens.clone(), released.clone());
    let opener: CaptureOpener = Box::new(move |locator| {
        if open_count.fetch_add(1, Ordering::SeqCst) > 0 {
            return Err(CaptureError::Open {
                locator: locator.to_string(),
                reason: "camera unplugged".to_string(),
            });
        }
        Ok(Box::new(SyntheticCapture {
            len: 1,
            position: 0,
            broken: true,
            released: flag.clone(),
        }) as Box<dyn VideoCapture>)
    });
    let source = FrameSource::with_opener("vanishing", policy, opener)
        .expect("first open succeeds");
    (source, opens, released)
}

/// Detector returning the same labels for every frame
pub struct FixedDetector {
    labels: Vec<String>,
}

impl FixedDetector {
    pub fn new(labels: &[&str]) -> Self {
        Self {
            labels: labels.iter().map(|l| l.to_string()).collect(),
        }
    }
}

impl Detector for FixedDetector {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>, DetectError> {
        Ok(self
            .labels
            .iter()
            .map(|label| Detection {
                label: label.clone(),
                confidence: 1.0,
                bbox: BoundingBox {
                    x1: 0.0,
                    y1: 0.0,
                    x2: 2.0,
                    y2: 2.0,
                },
            })
            .collect())
    }
}

/// In-memory broker topic shared by several publishers
#[derive(Clone, Default)]
pub struct MemoryTopic {
    messages: Arc<Mutex<Vec<(String, String)>>>,
}

impl MemoryTopic {
    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn payloads(&self) -> Vec<serde_json::Value> {
        self.messages()
            .iter()
            .map(|(_, payload)| serde_json::from_str(payload).unwrap())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().unwrap().len()
    }
}

impl Publisher for MemoryTopic {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), PublishError> {
        self.messages
            .lock()
            .unwrap()
            .push((topic.to_string(), payload.to_string()));
        Ok(())
    }
}

pub fn identity(camera_id: &str, fps: u32) -> WorkerIdentity {
    WorkerIdentity {
        camera_id: camera_id.to_string(),
        coverage_area: [(33.999, -118.5), (34.05, -118.46)],
        topic: "cameras/detections".to_string(),
        pacing: Duration::from_secs_f64(1.0 / f64::from(fps)),
    }
}

/// Detector reporting `frame value + 1` cars, so frame order shows in the counts
pub struct FrameIndexDetector;

impl Detector for FrameIndexDetector {
    fn name(&self) -> &'static str {
        "frame-index"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectError> {
        let value = frame.data.first().copied().unwrap_or(0) as usize;
        Ok((0..=value)
            .map(|_| Detection {
                label: "car".to_string(),
                confidence: 1.0,
                bbox: BoundingBox {
                    x1: 0.0,
                    y1: 0.0,
                    x2: 1.0,
                    y2: 1.0,
                },
            })
            .collect())
    }
}
