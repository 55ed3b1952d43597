/// ONNX YOLO inference for resource detection.
///
/// Runs a YOLOv5/YOLOv8-style export on the square working frame and returns
/// boxes in working-frame pixels. Missing model files are reported to the
/// caller rather than silently disabling detection.
use crate::errors::{GatherError, GatherResult};
use crate::perception::traits::Detector;
use crate::perception::types::{BoundingBox, Detection};

use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;

/// Output tensor layout of the exported model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputLayout {
    /// `[1, 4 + classes, proposals]`, class scores only.
    V8,
    /// `[1, proposals, 5 + classes]`, objectness then class scores.
    V5,
}

/// Holds the ONNX Runtime session and inference configuration.
pub struct YoloDetector {
    session: Session,
    input_size: u32,
    conf_threshold: f32,
    iou_threshold: f32,
    class_names: Vec<String>,
}

impl YoloDetector {
    pub fn load(
        model_path: &str,
        input_size: u32,
        conf_threshold: f32,
        iou_threshold: f32,
        class_names: Vec<String>,
    ) -> GatherResult<Self> {
        if !Path::new(model_path).exists() {
            return Err(GatherError::Detector(format!("model file '{model_path}' not found")));
        }

        let session = Session::builder()
            .map_err(|e| GatherError::Detector(format!("ort session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| GatherError::Detector(format!("ort opt-level: {e}")))?
            .commit_from_file(model_path)
            .map_err(|e| GatherError::Detector(format!("ort load model: {e}")))?;

        tracing::info!(path = %model_path, classes = class_names.len(), "YOLO detector loaded");
        Ok(Self {
            session,
            input_size,
            conf_threshold,
            iou_threshold,
            class_names,
        })
    }

    pub fn label(&self, class_id: u32) -> &str {
        self.class_names
            .get(class_id as usize)
            .map(String::as_str)
            .unwrap_or("unknown")
    }

    // ── Pre-processing ──────────────────────────────────────────────────────

    /// Resize to the model input and normalise → NCHW f32 tensor.
    /// Returns the tensor and the (x, y) factors back to frame pixels.
    fn preprocess(&self, frame: &image::RgbImage) -> (Array4<f32>, f32, f32) {
        let sz = self.input_size;
        let (fw, fh) = frame.dimensions();
        let resized;
        let img = if (fw, fh) == (sz, sz) {
            frame
        } else {
            resized = image::imageops::resize(frame, sz, sz, image::imageops::FilterType::Triangle);
            &resized
        };

        let mut tensor = Array4::<f32>::zeros((1, 3, sz as usize, sz as usize));
        for (x, y, p) in img.enumerate_pixels() {
            tensor[[0, 0, y as usize, x as usize]] = p[0] as f32 / 255.0;
            tensor[[0, 1, y as usize, x as usize]] = p[1] as f32 / 255.0;
            tensor[[0, 2, y as usize, x as usize]] = p[2] as f32 / 255.0;
        }

        (tensor, fw as f32 / sz as f32, fh as f32 / sz as f32)
    }

    // ── Post-processing ─────────────────────────────────────────────────────

    fn postprocess(
        &self,
        output: &ndarray::ArrayViewD<f32>,
        sx: f32,
        sy: f32,
    ) -> GatherResult<Vec<Detection>> {
        let shape = output.shape();
        if shape.len() < 3 {
            return Err(GatherError::Detector(format!("unexpected output shape: {shape:?}")));
        }
        // V8 exports put the attribute axis first; it is always the smaller one.
        let layout = if shape[1] < shape[2] {
            OutputLayout::V8
        } else {
            OutputLayout::V5
        };
        let (num_attrs, num_preds) = match layout {
            OutputLayout::V8 => (shape[1], shape[2]),
            OutputLayout::V5 => (shape[2], shape[1]),
        };
        let class_offset = match layout {
            OutputLayout::V8 => 4,
            OutputLayout::V5 => 5,
        };
        if num_attrs <= class_offset {
            return Err(GatherError::Detector(format!("no class scores in output {shape:?}")));
        }

        let at = |attr: usize, pred: usize| match layout {
            OutputLayout::V8 => output[[0, attr, pred]],
            OutputLayout::V5 => output[[0, pred, attr]],
        };

        let mut detections = Vec::new();
        for i in 0..num_preds {
            let objectness = match layout {
                OutputLayout::V8 => 1.0,
                OutputLayout::V5 => at(4, i),
            };

            let mut max_score = 0.0f32;
            let mut max_class = 0usize;
            for c in class_offset..num_attrs {
                let s = at(c, i) * objectness;
                if s > max_score {
                    max_score = s;
                    max_class = c - class_offset;
                }
            }
            if max_score < self.conf_threshold {
                continue;
            }

            let (cx, cy, w, h) = (at(0, i), at(1, i), at(2, i), at(3, i));
            detections.push(Detection::new(
                BoundingBox::new(
                    (cx - w / 2.0) * sx,
                    (cy - h / 2.0) * sy,
                    (cx + w / 2.0) * sx,
                    (cy + h / 2.0) * sy,
                ),
                max_score,
                max_class as u32,
            ));
        }

        Ok(nms(detections, self.iou_threshold))
    }
}

impl Detector for YoloDetector {
    fn infer(&mut self, frame: &image::RgbImage) -> GatherResult<Vec<Detection>> {
        let (input_tensor, sx, sy) = self.preprocess(frame);

        let input_value = Tensor::from_array(input_tensor)
            .map_err(|e| GatherError::Detector(format!("ort tensor: {e}")))?;

        let output_owned = {
            let outputs = self
                .session
                .run(ort::inputs![input_value])
                .map_err(|e| GatherError::Detector(format!("ort run: {e}")))?;

            outputs[0]
                .try_extract_array::<f32>()
                .map_err(|e| GatherError::Detector(format!("extract tensor: {e}")))?
                .to_owned()
        };

        let detections = self.postprocess(&output_owned.view(), sx, sy)?;
        for det in &detections {
            tracing::trace!(
                label = self.label(det.class_id),
                conf = det.confidence,
                "detection"
            );
        }
        Ok(detections)
    }
}

/// Greedy per-class NMS, highest confidence first. Output keeps that order.
pub fn nms(mut dets: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    dets.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Detection> = Vec::with_capacity(dets.len());
    for det in dets {
        let suppressed = keep
            .iter()
            .any(|k| k.class_id == det.class_id && k.bbox.iou(&det.bbox) > iou_threshold);
        if !suppressed {
            keep.push(det);
        }
    }
    keep
}
