use anyhow::{anyhow, Result};
use std::collections::VecDeque;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::frame::Frame;
use crate::geometry::BoundingBox;

/// Replays a queued script of detector answers, one per `detect` call.
///
/// Once the script runs out the last successful answer is repeated (or an
/// empty scene if there never was one). Used by tests and the demo to drive
/// the pipeline without a model.
#[derive(Default)]
pub struct ScriptedBackend {
    script: VecDeque<Result<Vec<Detection>, String>>,
    last_ok: Vec<Detection>,
    calls: u64,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one cycle that reports `boxes` at full confidence.
    pub fn then_boxes(mut self, boxes: &[BoundingBox]) -> Self {
        let detections = boxes.iter().map(|b| Detection::new(*b, 1.0)).collect();
        self.script.push_back(Ok(detections));
        self
    }

    /// Queue one cycle that fails.
    pub fn then_failure(mut self, reason: &str) -> Self {
        self.script.push_back(Err(reason.to_string()));
        self
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        self.calls += 1;
        match self.script.pop_front() {
            Some(Ok(detections)) => {
                self.last_ok = detections.clone();
                Ok(detections)
            }
            Some(Err(reason)) => Err(anyhow!("scripted detector failure: {}", reason)),
            None => Ok(self.last_ok.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_script_then_repeats_last_answer() -> Result<()> {
        let frame = Frame::new(vec![0u8; 3], 1, 1, 1)?;
        let spot = BoundingBox::new(0.0, 0.0, 1.0, 1.0)?;
        let mut backend = ScriptedBackend::new()
            .then_boxes(&[spot])
            .then_failure("camera glare")
            .then_boxes(&[]);

        assert_eq!(backend.detect(&frame)?.len(), 1);
        assert!(backend.detect(&frame).is_err());
        assert!(backend.detect(&frame)?.is_empty());
        assert!(backend.detect(&frame)?.is_empty());
        assert_eq!(backend.calls(), 4);
        Ok(())
    }
}
