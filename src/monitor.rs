//! The occupancy pipeline loop.
//!
//! One thread owns capture, detection and notification. Every captured frame
//! is shown to the detector's `prime` hook; a detection cycle runs only when
//! the sampling interval has elapsed. A changed occupancy vector goes straight
//! to the notification trigger in the same step and is not retried, whether or
//! not delivery succeeds.

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::config::OccupancySettings;
use crate::detect::DetectorBackend;
use crate::frame::Frame;
use crate::ingest::{FrameSource, SourceStats};
use crate::matcher::{match_spots, OccupancyVector};
use crate::notify::{NotificationResult, NotificationTrigger};
use crate::scheduler::should_sample;
use crate::spots::SpotSet;
use crate::tracker::{OccupancyChange, OccupancyTracker};

/// What a single `step` did.
#[derive(Clone, Debug, PartialEq)]
pub enum StepOutcome {
    /// The source has no more frames.
    EndOfStream,
    /// A frame was captured but no detection cycle was due.
    Idle,
    /// The detector failed; occupancy state was left untouched.
    DetectorFault(String),
    /// A cycle ran and occupancy matched the last-known state (or set the baseline).
    Unchanged(OccupancyVector),
    /// A cycle ran, occupancy changed, and a notification was attempted.
    Changed {
        change: OccupancyChange,
        result: NotificationResult,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MonitorStats {
    pub frames: u64,
    pub cycles: u64,
    pub skipped_cycles: u64,
    pub changes: u64,
    pub notifications_delivered: u64,
    pub notifications_failed: u64,
}

pub struct Monitor {
    source: Box<dyn FrameSource>,
    detector: Box<dyn DetectorBackend>,
    spots: SpotSet,
    tracker: OccupancyTracker,
    trigger: NotificationTrigger,
    iou_threshold: f32,
    interval: Duration,
    frame_pacing: Duration,
    last_sample: Instant,
    stats: MonitorStats,
}

impl Monitor {
    /// `started_at` seeds the sample clock, so the first cycle runs one
    /// interval after start.
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: Box<dyn DetectorBackend>,
        spots: SpotSet,
        trigger: NotificationTrigger,
        occupancy: &OccupancySettings,
        started_at: Instant,
    ) -> Self {
        Self {
            source,
            detector,
            spots,
            tracker: OccupancyTracker::new(),
            trigger,
            iou_threshold: occupancy.iou_threshold,
            interval: occupancy.interval,
            frame_pacing: Duration::ZERO,
            last_sample: started_at,
            stats: MonitorStats::default(),
        }
    }

    /// Sleep between frames so the loop does not outrun `target_fps`.
    pub fn with_frame_pacing(mut self, target_fps: u32) -> Self {
        self.frame_pacing = crate::ingest::frame_interval(target_fps);
        self
    }

    pub fn spots(&self) -> &SpotSet {
        &self.spots
    }

    /// Swap in a new spot layout. The next cycle will report a change if
    /// the spot count differs.
    pub fn replace_spots(&mut self, spots: SpotSet) {
        log::info!(
            "spot layout replaced: {} -> {} spots",
            self.spots.len(),
            spots.len()
        );
        self.spots = spots;
    }

    pub fn tracker(&self) -> &OccupancyTracker {
        &self.tracker
    }

    pub fn stats(&self) -> &MonitorStats {
        &self.stats
    }

    pub fn source_stats(&self) -> SourceStats {
        self.source.stats()
    }

    pub fn connect(&mut self) -> Result<()> {
        self.source.connect()?;
        self.detector.warm_up()?;
        log::info!(
            "monitor connected: {} spots, detector {}, transport {}, interval {:?}, iou > {}",
            self.spots.len(),
            self.detector.name(),
            self.trigger.transport_name(),
            self.interval,
            self.iou_threshold
        );
        Ok(())
    }

    pub fn step(&mut self) -> Result<StepOutcome> {
        self.step_at(Instant::now())
    }

    /// Capture one frame and, if due at `now`, run a detection cycle on it.
    ///
    /// Capture errors propagate; detector and delivery errors do not.
    pub fn step_at(&mut self, now: Instant) -> Result<StepOutcome> {
        let Some(frame) = self.source.next_frame()? else {
            return Ok(StepOutcome::EndOfStream);
        };
        self.stats.frames += 1;

        if let Err(e) = self.detector.prime(&frame) {
            log::warn!("detector prime failed on frame #{}: {:#}", frame.sequence, e);
        }

        if !should_sample(now, self.last_sample, self.interval) {
            return Ok(StepOutcome::Idle);
        }
        let outcome = self.run_cycle(&frame);
        self.last_sample = now;
        Ok(outcome)
    }

    fn run_cycle(&mut self, frame: &Frame) -> StepOutcome {
        self.stats.cycles += 1;
        let detections = match self.detector.detect(frame) {
            Ok(detections) => detections,
            Err(e) => {
                self.stats.skipped_cycles += 1;
                log::warn!(
                    "cycle #{} skipped: detector {} failed on frame #{}: {:#}",
                    self.stats.cycles,
                    self.detector.name(),
                    frame.sequence,
                    e
                );
                return StepOutcome::DetectorFault(format!("{:#}", e));
            }
        };

        let occupancy = match_spots(&self.spots, &detections, self.iou_threshold);
        log::info!(
            "cycle #{}: frame #{}, {} detections, {}/{} spots occupied",
            self.stats.cycles,
            frame.sequence,
            detections.len(),
            occupancy.occupied_count(),
            occupancy.len()
        );

        let Some(change) = self.tracker.observe(occupancy.clone()) else {
            return StepOutcome::Unchanged(occupancy);
        };

        self.stats.changes += 1;
        log::info!(
            "occupancy changed: {:?} -> {:?}",
            change.previous.as_slice(),
            change.current.as_slice()
        );
        let result = self.trigger.on_change(&change, frame, &self.spots);
        if result.is_delivered() {
            self.stats.notifications_delivered += 1;
        } else {
            self.stats.notifications_failed += 1;
        }
        StepOutcome::Changed { change, result }
    }

    /// Run until end of stream, `max_frames`, or `shutdown` is set.
    ///
    /// The source and transport are closed on every exit path.
    pub fn run(&mut self, shutdown: &AtomicBool, max_frames: Option<u64>) -> Result<MonitorStats> {
        if let Err(e) = self.connect() {
            self.close();
            return Err(e);
        }

        loop {
            if shutdown.load(Ordering::SeqCst) {
                log::info!("shutdown requested, stopping monitor");
                break;
            }
            if max_frames.is_some_and(|max| self.stats.frames >= max) {
                log::info!("frame limit reached ({} frames)", self.stats.frames);
                break;
            }

            let tick = Instant::now();
            match self.step_at(tick) {
                Ok(StepOutcome::EndOfStream) => {
                    log::info!("frame source ended after {} frames", self.stats.frames);
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    log::error!("frame source lost: {:#}", e);
                    self.close();
                    return Err(e);
                }
            }

            let elapsed = tick.elapsed();
            if elapsed < self.frame_pacing {
                std::thread::sleep(self.frame_pacing - elapsed);
            }
        }

        self.close();
        Ok(self.stats.clone())
    }

    /// Release the source and transport; errors are logged.
    pub fn close(&mut self) {
        if let Err(e) = self.source.close() {
            log::warn!("frame source close failed: {:#}", e);
        }
        if let Err(e) = self.trigger.close() {
            log::warn!("notification transport close failed: {:#}", e);
        }
    }
}
