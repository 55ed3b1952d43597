//! Perception pipeline: capture → working frame → detector → confidence filter.
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::errors::{GatherError, GatherResult};
use crate::perception::traits::{CaptureSource, DetectionSource, Detector};
use crate::perception::types::{Detection, FrameDetections, FrameGeometry, FrameSize};

pub struct VisionPipeline {
    capture: Arc<dyn CaptureSource>,
    detector: Arc<Mutex<Box<dyn Detector>>>,
    frame: FrameSize,
    confidence: f32,
}

impl VisionPipeline {
    pub fn new(
        capture: Arc<dyn CaptureSource>,
        detector: Box<dyn Detector>,
        frame: FrameSize,
        confidence: f32,
    ) -> Self {
        Self {
            capture,
            detector: Arc::new(Mutex::new(detector)),
            frame,
            confidence,
        }
    }

    pub fn frame_size(&self) -> FrameSize {
        self.frame
    }

    /// Run one capture + inference pass.
    ///
    /// `Ok(None)` when the capture backend had no frame.
    pub async fn run(&self) -> GatherResult<Option<FrameDetections>> {
        let capture = Arc::clone(&self.capture);
        let detector = Arc::clone(&self.detector);
        let frame = self.frame;

        // Capture + inference are CPU-bound; keep them off the async workers.
        let detections = tokio::task::spawn_blocking(move || -> GatherResult<Option<Vec<Detection>>> {
            let Some(shot) = capture.screenshot()? else {
                return Ok(None);
            };
            let working = image::imageops::resize(
                &image::DynamicImage::ImageRgba8(shot).to_rgb8(),
                frame.width,
                frame.height,
                image::imageops::FilterType::Triangle,
            );
            let mut det = detector
                .lock()
                .map_err(|_| GatherError::Detector("detector mutex poisoned".into()))?;
            det.infer(&working).map(Some)
        })
        .await
        .map_err(|e| GatherError::Perception(format!("join: {e}")))??;

        let Some(detections) = detections else {
            tracing::debug!("capture returned no frame");
            return Ok(None);
        };

        let filtered = filter_confident(detections, self.confidence);
        tracing::debug!(count = filtered.len(), "detections");
        Ok(Some(FrameDetections {
            detections: filtered,
            geometry: FrameGeometry {
                frame: self.frame,
                window: self.capture.geometry(),
            },
        }))
    }
}

#[async_trait]
impl DetectionSource for VisionPipeline {
    async fn next_frame(&mut self) -> GatherResult<Option<FrameDetections>> {
        self.run().await
    }
}

/// Keep detections strictly above the confidence threshold, in order.
pub fn filter_confident(detections: Vec<Detection>, threshold: f32) -> Vec<Detection> {
    detections
        .into_iter()
        .filter(|d| d.confidence > threshold)
        .collect()
}
