/// Per-frame target choice: nearest detection to the agent anchor.
use serde::{Deserialize, Serialize};

use crate::perception::coords::{self, AxisScaling};
use crate::perception::types::{AgentAnchor, Detection, FrameDetections, Point, Target};

/// Whether a target chosen in one cycle should be preferred in the next.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetPolicy {
    /// Memoryless: always the detection nearest the anchor.
    #[default]
    Nearest,
    /// Prefer the detection nearest the previously committed target when it
    /// lies within `radius` working-frame pixels of it.
    Sticky { radius: f64 },
}

/// Index of the detection whose centre is strictly nearest to `anchor`.
/// Ties keep the earliest index.
pub fn nearest_index(detections: &[Detection], anchor: Point) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, det) in detections.iter().enumerate() {
        let dist = det.bbox.center().distance_to(&anchor);
        match best {
            Some((_, best_dist)) if dist >= best_dist => {}
            _ => best = Some((i, dist)),
        }
    }
    best.map(|(i, _)| i)
}

/// Pick the detection nearest the anchor and map it into actuation space.
pub fn select(frame: &FrameDetections, anchor: AgentAnchor, scaling: AxisScaling) -> Option<Target> {
    let index = nearest_index(&frame.detections, anchor.point())?;
    Some(build_target(frame, index, scaling))
}

fn build_target(frame: &FrameDetections, index: usize, scaling: AxisScaling) -> Target {
    let det = &frame.detections[index];
    let (center, actuation) = coords::map(det, &frame.geometry, scaling);
    Target {
        center,
        class_id: det.class_id,
        actuation,
        index,
    }
}

/// Applies a `TargetPolicy` on top of the memoryless selector.
#[derive(Debug, Clone)]
pub struct TargetSelector {
    anchor: AgentAnchor,
    scaling: AxisScaling,
    policy: TargetPolicy,
    committed: Option<Point>,
}

impl TargetSelector {
    pub fn new(anchor: AgentAnchor, scaling: AxisScaling, policy: TargetPolicy) -> Self {
        Self {
            anchor,
            scaling,
            policy,
            committed: None,
        }
    }

    pub fn select(&mut self, frame: &FrameDetections) -> Option<Target> {
        let sticky = match (self.policy, self.committed) {
            (TargetPolicy::Sticky { radius }, Some(previous)) => {
                nearest_index(&frame.detections, previous).filter(|&i| {
                    frame.detections[i].bbox.center().distance_to(&previous) <= radius
                })
            }
            _ => None,
        };

        let target = match sticky {
            Some(index) => {
                tracing::debug!(index, "re-committing to previous target");
                Some(build_target(frame, index, self.scaling))
            }
            None => select(frame, self.anchor, self.scaling),
        };
        if let TargetPolicy::Sticky { .. } = self.policy {
            self.committed = target.map(|t| t.center);
        }
        target
    }

    /// Forget the committed target, e.g. after it was exhausted or abandoned.
    pub fn release(&mut self) {
        self.committed = None;
    }
}
