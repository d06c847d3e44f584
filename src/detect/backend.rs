use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Detector backend trait.
///
/// Implementations receive the whole frame and return boxes in the frame's
/// pixel space. Returned detections must already be confidence-filtered and
/// free of duplicates; the matcher trusts them as-is.
///
/// An `Err` means the detector could not produce a trustworthy answer for this
/// frame. It is distinct from `Ok(vec![])`, which asserts an empty scene.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Sees every captured frame, sampled or not. Backends that keep a scene
    /// model (e.g. a reference background) update it here.
    fn prime(&mut self, _frame: &Frame) -> Result<()> {
        Ok(())
    }

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
