/// "Is an action in progress?" probe based on a progress-bar template.
///
/// A fixed region of the working frame is compared against a reference
/// image with normalised cross-correlation; a best score above the
/// threshold means the bar is on screen.
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use image::GrayImage;

use crate::config::ConfirmationConfig;
use crate::errors::{GatherError, GatherResult};
use crate::perception::traits::{CaptureSource, ConfirmationProbe};
use crate::perception::types::FrameSize;

pub struct TemplateProbe {
    capture: Arc<dyn CaptureSource>,
    frame: FrameSize,
    region: [u32; 4],
    threshold: f32,
    reference: GrayImage,
}

impl TemplateProbe {
    pub fn new(
        capture: Arc<dyn CaptureSource>,
        frame: FrameSize,
        region: [u32; 4],
        threshold: f32,
        reference: GrayImage,
    ) -> Self {
        Self {
            capture,
            frame,
            region,
            threshold,
            reference,
        }
    }

    fn crop_region(&self, frame: &image::RgbaImage) -> GrayImage {
        let working = image::imageops::resize(
            frame,
            self.frame.width,
            self.frame.height,
            image::imageops::FilterType::Triangle,
        );
        let gray = image::DynamicImage::ImageRgba8(working).to_luma8();
        let [x1, y1, x2, y2] = self.region;
        image::imageops::crop_imm(&gray, x1, y1, x2 - x1, y2 - y1).to_image()
    }
}

#[async_trait]
impl ConfirmationProbe for TemplateProbe {
    async fn in_progress(&mut self) -> GatherResult<bool> {
        let capture = Arc::clone(&self.capture);
        let Some(frame) = tokio::task::spawn_blocking(move || capture.screenshot())
            .await
            .map_err(|e| GatherError::Perception(format!("join: {e}")))??
        else {
            return Ok(false);
        };

        let patch = self.crop_region(&frame);
        let score = best_match(&patch, &self.reference);
        tracing::trace!(score, "progress-bar match");
        Ok(score >= self.threshold)
    }
}

/// Stand-in used when the reference image is missing: always reports an
/// action in progress, so approaches confirm immediately and acting phases
/// run to their timeout.
pub struct AssumeInProgress;

#[async_trait]
impl ConfirmationProbe for AssumeInProgress {
    async fn in_progress(&mut self) -> GatherResult<bool> {
        Ok(true)
    }
}

/// Build the configured probe, falling back to `AssumeInProgress` when the
/// reference image cannot be read.
pub fn build_probe(
    cfg: &ConfirmationConfig,
    capture: Arc<dyn CaptureSource>,
    frame: FrameSize,
) -> Box<dyn ConfirmationProbe> {
    match load_reference(&cfg.reference_image) {
        Ok(reference) => Box::new(TemplateProbe::new(
            capture,
            frame,
            cfg.region,
            cfg.match_threshold,
            reference,
        )),
        Err(e) => {
            tracing::warn!(
                path = %cfg.reference_image,
                error = %e,
                "progress-bar reference unavailable; confirmation will be assumed"
            );
            Box::new(AssumeInProgress)
        }
    }
}

fn load_reference(path: &str) -> GatherResult<GrayImage> {
    if !Path::new(path).exists() {
        return Err(GatherError::Perception(format!("'{path}' not found")));
    }
    let img = image::open(path).map_err(|e| GatherError::Perception(format!("reference load: {e}")))?;
    Ok(img.to_luma8())
}

/// Best normalised cross-correlation of `template` over `haystack`
/// (mean-subtracted, range [-1, 1]). Returns 0.0 when the template does not
/// fit or either side has no variance.
pub fn best_match(haystack: &GrayImage, template: &GrayImage) -> f32 {
    let (hw, hh) = haystack.dimensions();
    let (tw, th) = template.dimensions();
    if tw == 0 || th == 0 || tw > hw || th > hh {
        return 0.0;
    }

    let n = (tw * th) as f64;
    let t_mean = template.pixels().map(|p| p[0] as f64).sum::<f64>() / n;
    let t_dev: Vec<f64> = template.pixels().map(|p| p[0] as f64 - t_mean).collect();
    let t_norm = t_dev.iter().map(|d| d * d).sum::<f64>().sqrt();
    if t_norm == 0.0 {
        return 0.0;
    }

    let mut best = f64::MIN;
    for oy in 0..=(hh - th) {
        for ox in 0..=(hw - tw) {
            let mut sum = 0.0;
            for ty in 0..th {
                for tx in 0..tw {
                    sum += haystack.get_pixel(ox + tx, oy + ty)[0] as f64;
                }
            }
            let mean = sum / n;

            let mut cross = 0.0;
            let mut var = 0.0;
            for ty in 0..th {
                for tx in 0..tw {
                    let d = haystack.get_pixel(ox + tx, oy + ty)[0] as f64 - mean;
                    cross += d * t_dev[(ty * tw + tx) as usize];
                    var += d * d;
                }
            }
            if var == 0.0 {
                continue;
            }
            best = best.max(cross / (var.sqrt() * t_norm));
        }
    }

    if best == f64::MIN {
        0.0
    } else {
        best as f32
    }
}
