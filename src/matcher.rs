//! Spot-to-detection matching.
//!
//! A spot is occupied when any detection overlaps it with an IoU strictly
//! greater than the threshold. Matching is many-to-one: one detection may
//! satisfy several spots and is never reserved by the first spot it matches.

use serde::{Deserialize, Serialize};

use crate::detect::Detection;
use crate::geometry::{iou, BoundingBox};
use crate::spots::SpotSet;

pub const DEFAULT_IOU_THRESHOLD: f32 = 0.4;

/// Per-spot occupancy, index-aligned with the spot sequence.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OccupancyVector(Vec<bool>);

impl OccupancyVector {
    pub fn new(occupied: Vec<bool>) -> Self {
        Self(occupied)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.0
    }

    pub fn get(&self, index: usize) -> Option<bool> {
        self.0.get(index).copied()
    }

    pub fn occupied_count(&self) -> usize {
        self.0.iter().filter(|occupied| **occupied).count()
    }

    /// Indices whose state differs from `previous`.
    ///
    /// Only meaningful when both vectors describe the same spot layout; with a
    /// length mismatch the indices present in just one of them are included.
    pub fn flipped_from(&self, previous: &OccupancyVector) -> Vec<usize> {
        let longest = self.len().max(previous.len());
        (0..longest)
            .filter(|&i| self.get(i) != previous.get(i))
            .collect()
    }
}

impl From<Vec<bool>> for OccupancyVector {
    fn from(occupied: Vec<bool>) -> Self {
        Self(occupied)
    }
}

/// Score every spot against every detection box.
pub fn match_boxes(
    spots: &[BoundingBox],
    detections: &[BoundingBox],
    threshold: f32,
) -> OccupancyVector {
    spots
        .iter()
        .map(|spot| detections.iter().any(|det| iou(spot, det) > threshold))
        .collect::<Vec<_>>()
        .into()
}

/// Occupancy of a monitored spot set for one detection cycle.
pub fn match_spots(spots: &SpotSet, detections: &[Detection], threshold: f32) -> OccupancyVector {
    let boxes: Vec<BoundingBox> = detections.iter().map(|d| d.bbox).collect();
    match_boxes(&spots.boxes(), &boxes, threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bb(x1: f32, y1: f32, x2: f32, y2: f32) -> BoundingBox {
        BoundingBox::new(x1, y1, x2, y2).unwrap()
    }

    #[test]
    fn exact_overlap_is_occupied() {
        let spots = [bb(0.0, 0.0, 10.0, 10.0)];
        let dets = [bb(0.0, 0.0, 10.0, 10.0)];
        let occ = match_boxes(&spots, &dets, DEFAULT_IOU_THRESHOLD);
        assert_eq!(occ.as_slice(), &[true]);
    }

    #[test]
    fn disjoint_detection_leaves_spot_vacant() {
        let spots = [bb(0.0, 0.0, 10.0, 10.0)];
        let dets = [bb(20.0, 20.0, 30.0, 30.0)];
        let occ = match_boxes(&spots, &dets, DEFAULT_IOU_THRESHOLD);
        assert_eq!(occ.as_slice(), &[false]);
    }

    #[test]
    fn only_overlapped_spot_is_occupied() {
        let spots = [bb(0.0, 0.0, 10.0, 10.0), bb(20.0, 0.0, 30.0, 10.0)];
        let dets = [bb(0.0, 0.0, 10.0, 10.0)];
        let occ = match_boxes(&spots, &dets, DEFAULT_IOU_THRESHOLD);
        assert_eq!(occ, OccupancyVector::from(vec![true, false]));
    }

    #[test]
    fn threshold_is_strict() {
        // 10x10 spot vs 10x5 detection inside it: iou = 50 / 100 = 0.5
        let spots = [bb(0.0, 0.0, 10.0, 10.0)];
        let dets = [bb(0.0, 0.0, 10.0, 5.0)];
        assert_eq!(match_boxes(&spots, &dets, 0.5).as_slice(), &[false]);
        assert_eq!(match_boxes(&spots, &dets, 0.49).as_slice(), &[true]);
    }

    #[test]
    fn one_detection_can_fill_overlapping_spots() {
        let spots = [bb(0.0, 0.0, 10.0, 10.0), bb(1.0, 0.0, 11.0, 10.0)];
        let dets = [bb(0.0, 0.0, 11.0, 10.0)];
        let occ = match_boxes(&spots, &dets, DEFAULT_IOU_THRESHOLD);
        assert_eq!(occ.as_slice(), &[true, true]);
    }

    #[test]
    fn lowering_threshold_never_reduces_occupancy() {
        let spots = [
            bb(0.0, 0.0, 10.0, 10.0),
            bb(20.0, 0.0, 30.0, 10.0),
            bb(40.0, 0.0, 50.0, 10.0),
        ];
        let dets = [
            bb(2.0, 2.0, 10.0, 10.0),
            bb(25.0, 0.0, 35.0, 10.0),
            bb(44.0, 4.0, 60.0, 20.0),
        ];
        let mut last = 0;
        for step in (0..=10).rev() {
            let threshold = step as f32 / 10.0;
            let count = match_boxes(&spots, &dets, threshold).occupied_count();
            assert!(count >= last, "threshold {} dropped count", threshold);
            last = count;
        }
    }

    #[test]
    fn detection_order_does_not_change_result() {
        let spots = [bb(0.0, 0.0, 10.0, 10.0), bb(20.0, 0.0, 30.0, 10.0)];
        let mut dets = vec![
            bb(50.0, 50.0, 60.0, 60.0),
            bb(20.0, 0.0, 30.0, 10.0),
            bb(1.0, 1.0, 9.0, 9.0),
        ];
        let forward = match_boxes(&spots, &dets, DEFAULT_IOU_THRESHOLD);
        dets.reverse();
        assert_eq!(forward, match_boxes(&spots, &dets, DEFAULT_IOU_THRESHOLD));
    }

    #[test]
    fn no_spots_yields_empty_vector() {
        let occ = match_boxes(&[], &[bb(0.0, 0.0, 1.0, 1.0)], DEFAULT_IOU_THRESHOLD);
        assert!(occ.is_empty());
    }

    #[test]
    fn flipped_indices_cover_changes_and_length_mismatch() {
        let before = OccupancyVector::from(vec![true, false, false]);
        let after = OccupancyVector::from(vec![false, false, true]);
        assert_eq!(after.flipped_from(&before), vec![0, 2]);

        let grown = OccupancyVector::from(vec![true, false, false, true]);
        assert_eq!(grown.flipped_from(&before), vec![3]);
    }
}
