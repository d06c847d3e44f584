//! Greedy non-maximum suppression.

use std::cmp::Ordering;

use crate::detect::result::Detection;
use crate::geometry::iou;

/// Keep the most confident detection of every overlapping cluster.
///
/// Candidates are visited in descending confidence; a candidate is dropped
/// when its IoU with an already-kept box exceeds `iou_threshold`.
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });

    let mut keep: Vec<Detection> = Vec::with_capacity(detections.len());
    for det in detections {
        if keep
            .iter()
            .all(|kept| iou(&det.bbox, &kept.bbox) <= iou_threshold)
        {
            keep.push(det);
        }
    }
    keep
}
