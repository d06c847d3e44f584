//! Monitored parking spots.
//!
//! `SpotSet` is the ordered spot sequence for a session. A spot's identity is
//! its index. The set is only ever grown or shrunk through `push` and `pop`;
//! the interactive definition tool (`SpotDrawer`) owns the set while the user
//! is drawing and hands it back on `finish`.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::geometry::BoundingBox;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MonitoredSpot {
    pub index: usize,
    pub bbox: BoundingBox,
}

#[derive(Debug, Serialize, Deserialize)]
struct SpotsFile {
    spots: Vec<BoundingBox>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpotSet {
    boxes: Vec<BoundingBox>,
}

impl SpotSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_boxes(boxes: Vec<BoundingBox>) -> Self {
        Self { boxes }
    }

    /// Append a spot; returns its index.
    pub fn push(&mut self, bbox: BoundingBox) -> usize {
        self.boxes.push(bbox);
        self.boxes.len() - 1
    }

    /// Remove the most recently added spot.
    pub fn pop(&mut self) -> Option<MonitoredSpot> {
        let bbox = self.boxes.pop()?;
        Some(MonitoredSpot {
            index: self.boxes.len(),
            bbox,
        })
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<MonitoredSpot> {
        self.boxes
            .get(index)
            .map(|bbox| MonitoredSpot { index, bbox: *bbox })
    }

    pub fn iter(&self) -> impl Iterator<Item = MonitoredSpot> + '_ {
        self.boxes
            .iter()
            .enumerate()
            .map(|(index, bbox)| MonitoredSpot { index, bbox: *bbox })
    }

    pub fn boxes(&self) -> Vec<BoundingBox> {
        self.boxes.clone()
    }

    /// Load a spots file: `{"spots": [[x1, y1, x2, y2], ...]}`.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read spots file {}", path.display()))?;
        let file: SpotsFile = serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid spots file {}: {}", path.display(), e))?;
        Ok(Self::from_boxes(file.spots))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = SpotsFile {
            spots: self.boxes.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write spots file {}", path.display()))
    }
}

// ----------------------------------------------------------------------------
// SpotDrawer: press/release spot definition
// ----------------------------------------------------------------------------

/// Pointer input from whatever surface the user draws on.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PointerEvent {
    Press { x: f32, y: f32 },
    Release { x: f32, y: f32 },
}

/// Turns press/release pairs into spots appended to an owned `SpotSet`.
pub struct SpotDrawer {
    spots: SpotSet,
    anchor: Option<(f32, f32)>,
}

impl SpotDrawer {
    pub fn new(spots: SpotSet) -> Self {
        Self {
            spots,
            anchor: None,
        }
    }

    /// Feed one pointer event. Returns the index of a newly completed spot.
    ///
    /// A release without a press, or a drag that encloses no area, adds nothing.
    pub fn handle(&mut self, event: PointerEvent) -> Option<usize> {
        match event {
            PointerEvent::Press { x, y } => {
                self.anchor = Some((x, y));
                None
            }
            PointerEvent::Release { x, y } => {
                let anchor = self.anchor.take()?;
                match BoundingBox::from_corners(anchor, (x, y)) {
                    Ok(bbox) if !bbox.is_degenerate() => Some(self.spots.push(bbox)),
                    Ok(_) => {
                        log::warn!("ignoring zero-area spot at ({}, {})", x, y);
                        None
                    }
                    Err(e) => {
                        log::warn!("ignoring spot: {}", e);
                        None
                    }
                }
            }
        }
    }

    /// The in-progress drag, for preview rendering.
    pub fn pending(&self, cursor: (f32, f32)) -> Option<BoundingBox> {
        let anchor = self.anchor?;
        BoundingBox::from_corners(anchor, cursor).ok()
    }

    pub fn undo(&mut self) -> Option<MonitoredSpot> {
        self.anchor = None;
        self.spots.pop()
    }

    pub fn spots(&self) -> &SpotSet {
        &self.spots
    }

    pub fn finish(self) -> SpotSet {
        self.spots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drawer_appends_in_order() {
        let mut drawer = SpotDrawer::new(SpotSet::new());
        assert_eq!(drawer.handle(PointerEvent::Press { x: 10.0, y: 10.0 }), None);
        assert_eq!(
            drawer.handle(PointerEvent::Release { x: 50.0, y: 60.0 }),
            Some(0)
        );
        drawer.handle(PointerEvent::Press { x: 100.0, y: 80.0 });
        assert_eq!(
            drawer.handle(PointerEvent::Release { x: 60.0, y: 10.0 }),
            Some(1)
        );

        let spots = drawer.finish();
        assert_eq!(spots.len(), 2);
        let second = spots.get(1).unwrap();
        assert_eq!(second.index, 1);
        assert_eq!(
            second.bbox,
            BoundingBox::new(60.0, 10.0, 100.0, 80.0).unwrap()
        );
    }

    #[test]
    fn release_without_press_is_ignored() {
        let mut drawer = SpotDrawer::new(SpotSet::new());
        assert_eq!(drawer.handle(PointerEvent::Release { x: 1.0, y: 1.0 }), None);
        assert!(drawer.spots().is_empty());
    }

    #[test]
    fn click_without_drag_is_ignored() {
        let mut drawer = SpotDrawer::new(SpotSet::new());
        drawer.handle(PointerEvent::Press { x: 5.0, y: 5.0 });
        assert_eq!(drawer.handle(PointerEvent::Release { x: 5.0, y: 5.0 }), None);
        assert!(drawer.spots().is_empty());
    }

    #[test]
    fn pending_preview_follows_cursor() {
        let mut drawer = SpotDrawer::new(SpotSet::new());
        assert!(drawer.pending((3.0, 3.0)).is_none());
        drawer.handle(PointerEvent::Press { x: 10.0, y: 10.0 });
        let preview = drawer.pending((2.0, 20.0)).unwrap();
        assert_eq!(preview, BoundingBox::new(2.0, 10.0, 10.0, 20.0).unwrap());
    }

    #[test]
    fn undo_removes_last_spot() {
        let mut drawer = SpotDrawer::new(SpotSet::from_boxes(vec![
            BoundingBox::new(0.0, 0.0, 1.0, 1.0).unwrap(),
            BoundingBox::new(2.0, 2.0, 3.0, 3.0).unwrap(),
        ]));
        let removed = drawer.undo().unwrap();
        assert_eq!(removed.index, 1);
        assert_eq!(drawer.spots().len(), 1);
    }

    #[test]
    fn spots_file_round_trips_through_disk() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("spots.json");
        let spots = SpotSet::from_boxes(vec![
            BoundingBox::new(0.0, 0.0, 10.0, 10.0)?,
            BoundingBox::new(20.0, 0.0, 30.0, 10.0)?,
        ]);
        spots.save(&path)?;
        assert_eq!(SpotSet::load(&path)?, spots);
        Ok(())
    }

    #[test]
    fn spots_file_rejects_inverted_boxes() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("spots.json");
        std::fs::write(&path, r#"{"spots": [[10, 0, 0, 10]]}"#)?;
        assert!(SpotSet::load(&path).is_err());
        Ok(())
    }
}
