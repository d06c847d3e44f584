//! Axis-aligned box geometry.
//!
//! Boxes are expressed in frame pixel space as `(x1, y1, x2, y2)` with
//! `x2 >= x1` and `y2 >= y1`. Zero-area boxes are valid; they never overlap
//! anything and always score an IoU of 0.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in frame pixel coordinates.
///
/// Serialized as a `[x1, y1, x2, y2]` array so spot files stay compact.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f32; 4]", into = "[f32; 4]")]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    /// Build a box, rejecting inverted or non-finite coordinates.
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Result<Self> {
        if ![x1, y1, x2, y2].iter().all(|v| v.is_finite()) {
            return Err(anyhow!(
                "box coordinates must be finite: [{}, {}, {}, {}]",
                x1,
                y1,
                x2,
                y2
            ));
        }
        if x2 < x1 || y2 < y1 {
            return Err(anyhow!(
                "box corners inverted: [{}, {}, {}, {}] (need x2 >= x1 and y2 >= y1)",
                x1,
                y1,
                x2,
                y2
            ));
        }
        Ok(Self { x1, y1, x2, y2 })
    }

    /// Build a box from two arbitrary corner points (e.g. a mouse drag in any direction).
    pub fn from_corners(a: (f32, f32), b: (f32, f32)) -> Result<Self> {
        Self::new(a.0.min(b.0), a.1.min(b.1), a.0.max(b.0), a.1.max(b.1))
    }

    /// Build a box from a top-left corner plus width and height.
    pub fn from_xywh(x: f32, y: f32, w: f32, h: f32) -> Result<Self> {
        Self::new(x, y, x + w, y + h)
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn is_degenerate(&self) -> bool {
        self.area() <= 0.0
    }

    /// Clip the box to a `width` x `height` frame.
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        let (w, h) = (width as f32, height as f32);
        let x1 = self.x1.clamp(0.0, w);
        let y1 = self.y1.clamp(0.0, h);
        Self {
            x1,
            y1,
            x2: self.x2.clamp(x1, w),
            y2: self.y2.clamp(y1, h),
        }
    }
}

impl TryFrom<[f32; 4]> for BoundingBox {
    type Error = anyhow::Error;

    fn try_from(value: [f32; 4]) -> Result<Self> {
        Self::new(value[0], value[1], value[2], value[3])
    }
}

impl From<BoundingBox> for [f32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// Intersection over union of two boxes, in `[0, 1]`.
///
/// Returns exactly 0.0 when the boxes do not overlap, and also when the union
/// is empty (two degenerate boxes). Boxes built as struct literals skip the
/// finite check in [`BoundingBox::new`]; a non-finite ratio also scores 0.0.
pub fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let left = a.x1.max(b.x1);
    let top = a.y1.max(b.y1);
    let right = a.x2.min(b.x2);
    let bottom = a.y2.min(b.y2);

    if right < left || bottom < top {
        return 0.0;
    }

    let intersection = (right - left) * (bottom - top);
    let union = a.area() + b.area() - intersection;
    if union <= 0.0 {
        return 0.0;
    }
    let ratio = intersection / union;
    if !ratio.is_finite() {
        return 0.0;
    }
    ratio
}
