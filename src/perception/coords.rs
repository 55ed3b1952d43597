// Working-frame → actuation-space mapping.
use serde::{Deserialize, Serialize};

use crate::perception::types::{Detection, FrameGeometry, Point};

/// How the vertical axis is carried into actuation space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisScaling {
    /// Both axes are scaled by window/frame ratio and offset by the window origin.
    #[default]
    Symmetric,
    /// X is scaled and offset; Y is passed through in frame pixels.
    /// Matches older builds that only ever scaled the horizontal axis.
    LegacyUnscaledY,
}

/// Maps a detection to its frame-space centre and its actuation point.
///
/// Without window geometry the frame coordinates are returned unchanged and a
/// degraded-mode warning is logged.
pub fn map(detection: &Detection, geometry: &FrameGeometry, scaling: AxisScaling) -> (Point, Point) {
    let center = detection.bbox.center();
    (center, frame_to_actuation(center, geometry, scaling))
}

pub fn frame_to_actuation(center: Point, geometry: &FrameGeometry, scaling: AxisScaling) -> Point {
    let Some(window) = geometry.window else {
        tracing::warn!(
            x = center.x,
            y = center.y,
            "window geometry unavailable; using unscaled frame coordinates"
        );
        return center;
    };

    let frame_w = geometry.frame.width.max(1) as f64;
    let frame_h = geometry.frame.height.max(1) as f64;

    let x = center.x * window.width as f64 / frame_w + window.left as f64;
    let y = match scaling {
        AxisScaling::Symmetric => center.y * window.height as f64 / frame_h + window.top as f64,
        AxisScaling::LegacyUnscaledY => center.y,
    };

    Point::new(x, y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::types::{BoundingBox, FrameSize, WindowGeometry};

    fn geometry(width: u32) -> FrameGeometry {
        FrameGeometry {
            frame: FrameSize::square(640),
            window: Some(WindowGeometry {
                top: 0,
                left: 100,
                width,
                height: 600,
            }),
        }
    }

    fn detection() -> Detection {
        Detection::new(BoundingBox::new(10.0, 10.0, 30.0, 30.0), 0.9, 0)
    }

    #[test]
    fn maps_reference_scenario() {
        let (center, act) = map(&detection(), &geometry(800), AxisScaling::Symmetric);
        assert_eq!(center, Point::new(20.0, 20.0));
        assert!((act.x - 125.0).abs() < 1e-9);
        assert!((act.y - 18.75).abs() < 1e-9);
    }

    #[test]
    fn legacy_mode_keeps_frame_y() {
        let (_, act) = map(&detection(), &geometry(800), AxisScaling::LegacyUnscaledY);
        assert!((act.x - 125.0).abs() < 1e-9);
        assert_eq!(act.y, 20.0);
    }

    #[test]
    fn mapping_is_deterministic() {
        let a = map(&detection(), &geometry(800), AxisScaling::Symmetric);
        let b = map(&detection(), &geometry(800), AxisScaling::Symmetric);
        assert_eq!(a, b);
    }

    #[test]
    fn x_offset_scales_with_window_width() {
        let (_, base) = map(&detection(), &geometry(800), AxisScaling::Symmetric);
        let (_, doubled) = map(&detection(), &geometry(1600), AxisScaling::Symmetric);
        assert!(((doubled.x - 100.0) - 2.0 * (base.x - 100.0)).abs() < 1e-9);
    }

    #[test]
    fn missing_window_falls_back_to_frame_coordinates() {
        let geo = FrameGeometry {
            frame: FrameSize::square(640),
            window: None,
        };
        let (center, act) = map(&detection(), &geo, AxisScaling::Symmetric);
        assert_eq!(center, act);
    }
}
