//! Object detection adapter
//!
//! Detection is treated as an opaque capability: a [`Detector`] turns one
//! frame into labeled boxes. The worker only looks at the labels.

#[cfg(feature = "backend-tract")]
pub mod yolo;

use crate::config::ModelConfig;
use crate::frame::Frame;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Axis-aligned box in frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    /// Intersection over union with another box
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// One detected object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("Failed to load model '{path}': {reason}")]
    ModelLoad { path: String, reason: String },
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
    #[error("Inference failed: {0}")]
    Inference(String),
}

/// Maps a frame to labeled boxes
pub trait Detector: Send {
    /// Backend identifier
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    ///
    /// The frame is borrowed for the call only.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectError>;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectError> {
        (**self).detect(frame)
    }
}

/// Load the detector the crate was built with
pub fn load_detector(config: &ModelConfig) -> Result<Box<dyn Detector>, DetectError> {
    #[cfg(feature = "backend-tract")]
    {
        Ok(Box::new(yolo::YoloDetector::load(config)?))
    }

    #[cfg(not(feature = "backend-tract"))]
    {
        Err(DetectError::ModelLoad {
            path: config.path.display().to_string(),
            reason: "no inference backend enabled, rebuild with --features backend-tract"
                .to_string(),
        })
    }
}

/// Class names of the COCO dataset, indexed by model class id
pub const COCO_CLASSES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];
