//! Occupancy history and change detection.
//!
//! The tracker is the only place occupancy history lives. The first observation
//! establishes a baseline and is never itself reported as a change; after that,
//! any element-wise or length difference against the baseline is a change and
//! becomes the new baseline.

use crate::matcher::OccupancyVector;

#[derive(Clone, Debug, PartialEq, Eq)]
enum TrackerState {
    Uninitialized,
    Tracking { previous: OccupancyVector },
}

/// A transition between two different occupancy vectors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OccupancyChange {
    pub previous: OccupancyVector,
    pub current: OccupancyVector,
}

impl OccupancyChange {
    /// True when the spot layout itself changed between observations.
    pub fn layout_changed(&self) -> bool {
        self.previous.len() != self.current.len()
    }

    /// Spot indices whose state flipped.
    pub fn flipped(&self) -> Vec<usize> {
        self.current.flipped_from(&self.previous)
    }
}

#[derive(Clone, Debug)]
pub struct OccupancyTracker {
    state: TrackerState,
    current: Option<OccupancyVector>,
}

impl OccupancyTracker {
    pub fn new() -> Self {
        Self {
            state: TrackerState::Uninitialized,
            current: None,
        }
    }

    /// Record a new observation and report whether it is a change.
    pub fn update(&mut self, observed: OccupancyVector) -> bool {
        self.observe(observed).is_some()
    }

    /// Record a new observation, returning the before/after pair on change.
    pub fn observe(&mut self, observed: OccupancyVector) -> Option<OccupancyChange> {
        self.current = Some(observed.clone());
        if let TrackerState::Tracking { previous } = &mut self.state {
            if *previous == observed {
                return None;
            }
            let before = std::mem::replace(previous, observed.clone());
            return Some(OccupancyChange {
                previous: before,
                current: observed,
            });
        }

        log::debug!("occupancy baseline established: {:?}", observed.as_slice());
        self.state = TrackerState::Tracking { previous: observed };
        None
    }

    pub fn is_tracking(&self) -> bool {
        matches!(self.state, TrackerState::Tracking { .. })
    }

    /// The baseline that the next observation is compared against.
    pub fn previous(&self) -> Option<&OccupancyVector> {
        match &self.state {
            TrackerState::Uninitialized => None,
            TrackerState::Tracking { previous } => Some(previous),
        }
    }

    /// The most recent observation, changed or not.
    pub fn current(&self) -> Option<&OccupancyVector> {
        self.current.as_ref()
    }
}

impl Default for OccupancyTracker {
    fn default() -> Self {
        Self::new()
    }
}
