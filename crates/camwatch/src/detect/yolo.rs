//! YOLO detector on tract-onnx
//!
//! Expects the Ultralytics v8/v11 ONNX export: one `[1, 3, S, S]` f32 input in
//! `0..1` and one `[1, 4 + classes, anchors]` output whose first four rows are
//! box centers and sizes in input pixels, followed by per-class scores.

use super::{BoundingBox, DetectError, Detection, Detector, COCO_CLASSES};
use crate::config::ModelConfig;
use crate::frame::Frame;
use image::imageops::FilterType;
use tract_onnx::prelude::*;

type YoloPlan = TypedRunnableModel<TypedModel>;

pub struct YoloDetector {
    model: YoloPlan,
    input_size: u32,
    confidence: f32,
    iou: f32,
}

impl YoloDetector {
    /// Load and optimize the model once for the lifetime of the process
    pub fn load(config: &ModelConfig) -> Result<Self, DetectError> {
        let size = config.input_size as usize;
        let load_err = |e: TractError| DetectError::ModelLoad {
            path: config.path.display().to_string(),
            reason: e.to_string(),
        };

        let model = tract_onnx::onnx()
            .model_for_path(&config.path)
            .map_err(load_err)?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
            )
            .map_err(load_err)?
            .into_optimized()
            .map_err(load_err)?
            .into_runnable()
            .map_err(load_err)?;

        log::info!(
            "Loaded detection model {} ({}x{})",
            config.path.display(),
            size,
            size
        );

        Ok(Self {
            model,
            input_size: config.input_size,
            confidence: config.confidence,
            iou: config.iou,
        })
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor, DetectError> {
        let view = frame.as_rgb_image().ok_or_else(|| {
            DetectError::InvalidFrame(format!(
                "{}x{} frame with {} bytes",
                frame.width,
                frame.height,
                frame.data.len()
            ))
        })?;
        let size = self.input_size;
        let resized = image::imageops::resize(&view, size, size, FilterType::Triangle);

        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, size as usize, size as usize),
            |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        );
        Ok(input.into_tensor())
    }
}

impl Detector for YoloDetector {
    fn name(&self) -> &'static str {
        "yolo-tract"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectError> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|e| DetectError::Inference(e.to_string()))?;

        let output = outputs
            .first()
            .ok_or_else(|| DetectError::Inference("model produced no outputs".to_string()))?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| DetectError::Inference(e.to_string()))?;

        let shape = view.shape().to_vec();
        if shape.len() != 3 || shape[1] <= 4 {
            return Err(DetectError::Inference(format!(
                "unexpected output shape {:?}",
                shape
            )));
        }
        let values: Vec<f32> = view.iter().copied().collect();

        let scale_x = frame.width as f32 / self.input_size as f32;
        let scale_y = frame.height as f32 / self.input_size as f32;
        let candidates = decode_predictions(
            &values,
            shape[1] - 4,
            shape[2],
            (scale_x, scale_y),
            self.confidence,
        );
        Ok(non_max_suppression(candidates, self.iou))
    }
}

fn class_label(class_id: usize) -> String {
    COCO_CLASSES
        .get(class_id)
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("class_{}", class_id))
}

/// Decode a channel-major `[4 + classes, anchors]` prediction block.
///
/// Keeps the best class of each anchor when its score reaches `confidence`,
/// and scales boxes from model input pixels to frame pixels.
pub fn decode_predictions(
    values: &[f32],
    num_classes: usize,
    num_anchors: usize,
    scale: (f32, f32),
    confidence: f32,
) -> Vec<Detection> {
    let at = |row: usize, anchor: usize| values[row * num_anchors + anchor];
    let mut detections = Vec::new();

    if values.len() < (4 + num_classes) * num_anchors {
        return detections;
    }

    for anchor in 0..num_anchors {
        let (class_id, score) = (0..num_classes)
            .map(|c| (c, at(4 + c, anchor)))
            .fold((0, f32::NEG_INFINITY), |best, cur| {
                if cur.1 > best.1 {
                    cur
                } else {
                    best
                }
            });
        if score < confidence {
            continue;
        }

        let (cx, cy, w, h) = (
            at(0, anchor),
            at(1, anchor),
            at(2, anchor),
            at(3, anchor),
        );
        detections.push(Detection {
            label: class_label(class_id),
            confidence: score,
            bbox: BoundingBox {
                x1: (cx - w / 2.0) * scale.0,
                y1: (cy - h / 2.0) * scale.1,
                x2: (cx + w / 2.0) * scale.0,
                y2: (cy + h / 2.0) * scale.1,
            },
        });
    }

    detections
}

/// Greedy per-class non-maximum suppression
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for det in detections {
        let overlaps = kept
            .iter()
            .any(|k| k.label == det.label && k.bbox.iou(&det.bbox) > iou_threshold);
        if !overlaps {
            kept.push(det);
        }
    }
    kept
}
