use serde::{Deserialize, Serialize};

/// A point in either working-frame or actuation space. Which one is implied
/// by where it came from; see `Target`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// Rounded to whole pixels for the input layer.
    pub fn to_pixels(self) -> (i32, i32) {
        (self.x.round() as i32, self.y.round() as i32)
    }
}

/// Axis-aligned box `[x1, y1, x2, y2]` in working-frame pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub const fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Arithmetic centre of the box.
    pub fn center(&self) -> Point {
        Point::new(
            (self.x1 as f64 + self.x2 as f64) / 2.0,
            (self.y1 as f64 + self.y2 as f64) / 2.0,
        )
    }

    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

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

/// One region reported by the detector for a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub class_id: u32,
}

impl Detection {
    pub fn new(bbox: BoundingBox, confidence: f32, class_id: u32) -> Self {
        Self {
            bbox,
            confidence,
            class_id,
        }
    }
}

/// Size of the fixed working frame the detector sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const fn square(side: u32) -> Self {
        Self {
            width: side,
            height: side,
        }
    }
}

impl Default for FrameSize {
    fn default() -> Self {
        Self::square(640)
    }
}

/// Captured window rectangle in actuation (screen) pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowGeometry {
    pub top: i32,
    pub left: i32,
    pub width: u32,
    pub height: u32,
}

/// Working-frame size plus the window it was captured from, if known.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameGeometry {
    pub frame: FrameSize,
    pub window: Option<WindowGeometry>,
}

/// Where the controlled agent is assumed to stand, in working-frame pixels.
/// Fixed for the whole session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgentAnchor(pub Point);

impl AgentAnchor {
    /// Centre of the frame, lifted slightly to sit on the character's feet.
    pub fn for_frame(frame: FrameSize) -> Self {
        Self(Point::new(
            frame.width as f64 / 2.0,
            frame.height as f64 / 2.0 - 60.0,
        ))
    }

    pub fn point(&self) -> Point {
        self.0
    }
}

/// The one detection chosen for this cycle, in both coordinate spaces.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub center: Point,
    pub class_id: u32,
    pub actuation: Point,
    /// Index of the source detection in the frame's detection list.
    pub index: usize,
}

/// Detections for one frame together with the geometry needed to map them.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameDetections {
    pub detections: Vec<Detection>,
    pub geometry: FrameGeometry,
}
