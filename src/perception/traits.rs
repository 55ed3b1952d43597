use async_trait::async_trait;
use image::RgbaImage;

use crate::errors::GatherResult;
use crate::perception::types::{Detection, FrameDetections, WindowGeometry};

/// Object detector over a fixed-size working frame.
/// Boxes are returned in working-frame pixels.
pub trait Detector: Send {
    fn infer(&mut self, frame: &image::RgbImage) -> GatherResult<Vec<Detection>>;
}

/// Screen capture of the target application's window.
///
/// `Ok(None)` means "no frame this time" and is not an error.
pub trait CaptureSource: Send + Sync {
    fn name(&self) -> &str;
    fn screenshot(&self) -> GatherResult<Option<RgbaImage>>;
    /// Latest known window rectangle; refreshed by `screenshot`.
    fn geometry(&self) -> Option<WindowGeometry>;
}

/// Externally observed "an action is in progress" signal.
#[async_trait]
pub trait ConfirmationProbe: Send {
    async fn in_progress(&mut self) -> GatherResult<bool>;
}

/// One frame's detections, already filtered by confidence.
#[async_trait]
pub trait DetectionSource: Send {
    async fn next_frame(&mut self) -> GatherResult<Option<FrameDetections>>;
}
