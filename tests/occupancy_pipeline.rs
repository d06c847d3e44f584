use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use parking_monitor::config::{NotifySettings, OccupancySettings};
use parking_monitor::detect::ScriptedBackend;
use parking_monitor::ingest::{FrameSource, SourceStats};
use parking_monitor::notify::{Notification, NotificationResult, NotificationTransport, NotificationTrigger};
use parking_monitor::{BoundingBox, Frame, Monitor, SpotSet, StepOutcome};

const INTERVAL: Duration = Duration::from_secs(10);

/// Gray frames until `limit`, then end of stream (or an error when `fail_at_end`).
struct FakeCamera {
    sent: u64,
    limit: u64,
    fail_at_end: bool,
    closed: Arc<AtomicBool>,
}

impl FrameSource for FakeCamera {
    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.sent >= self.limit {
            if self.fail_at_end {
                return Err(anyhow!("camera unplugged"));
            }
            return Ok(None);
        }
        self.sent += 1;
        Ok(Some(Frame::new(vec![80u8; 64 * 48 * 3], 64, 48, self.sent)?))
    }

    fn is_healthy(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.sent,
            source: "fake".to_string(),
        }
    }

    fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Clone, Default)]
struct Outbox {
    sent: Arc<Mutex<Vec<Notification>>>,
}

struct RecordingTransport {
    outbox: Outbox,
    fail: bool,
}

impl NotificationTransport for RecordingTransport {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn deliver(&mut self, notification: &Notification) -> Result<String> {
        if self.fail {
            return Err(anyhow!("smtp relay refused connection"));
        }
        let mut sent = self.outbox.sent.lock().unwrap();
        sent.push(notification.clone());
        Ok(format!("msg-{}", sent.len()))
    }
}

fn spot(x1: f32, y1: f32, x2: f32, y2: f32) -> BoundingBox {
    BoundingBox::new(x1, y1, x2, y2).unwrap()
}

fn two_spots() -> SpotSet {
    SpotSet::from_boxes(vec![spot(0.0, 0.0, 10.0, 10.0), spot(20.0, 0.0, 30.0, 10.0)])
}

struct Harness {
    monitor: Monitor,
    outbox: Outbox,
    closed: Arc<AtomicBool>,
    start: Instant,
}

impl Harness {
    fn new(detector: ScriptedBackend, fail_delivery: bool) -> Self {
        Self::with_camera(detector, fail_delivery, 1_000, false)
    }

    fn with_camera(detector: ScriptedBackend, fail_delivery: bool, limit: u64, fail_at_end: bool) -> Self {
        let outbox = Outbox::default();
        let closed = Arc::new(AtomicBool::new(false));
        let camera = FakeCamera {
            sent: 0,
            limit,
            fail_at_end,
            closed: Arc::clone(&closed),
        };
        let trigger = NotificationTrigger::new(
            NotifySettings {
                recipient: "ops@example.com".to_string(),
                snapshot_path: None,
                ..NotifySettings::default()
            },
            Box::new(RecordingTransport {
                outbox: outbox.clone(),
                fail: fail_delivery,
            }),
        );
        let start = Instant::now();
        let monitor = Monitor::new(
            Box::new(camera),
            Box::new(detector),
            two_spots(),
            trigger,
            &OccupancySettings {
                iou_threshold: 0.4,
                interval: INTERVAL,
            },
            start,
        );
        Self {
            monitor,
            outbox,
            closed,
            start,
        }
    }

    fn at(&mut self, secs: u64) -> StepOutcome {
        self.monitor
            .step_at(self.start + Duration::from_secs(secs))
            .expect("step")
    }

    fn delivered(&self) -> Vec<Notification> {
        self.outbox.sent.lock().unwrap().clone()
    }
}

#[test]
fn notifies_only_when_occupancy_changes() {
    let detector = ScriptedBackend::new()
        .then_boxes(&[])
        .then_boxes(&[])
        .then_boxes(&[spot(0.0, 0.0, 10.0, 10.0)]);
    let mut h = Harness::new(detector, false);

    assert!(matches!(h.at(10), StepOutcome::Unchanged(_)));
    assert!(matches!(h.at(20), StepOutcome::Unchanged(_)));
    match h.at(30) {
        StepOutcome::Changed { change, result } => {
            assert_eq!(change.previous.as_slice(), &[false, false]);
            assert_eq!(change.current.as_slice(), &[true, false]);
            assert_eq!(
                result,
                NotificationResult::Delivered {
                    transport: "recording".to_string(),
                    receipt: "msg-1".to_string(),
                }
            );
        }
        other => panic!("expected change, got {:?}", other),
    }

    let sent = h.delivered();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].flipped, vec![0]);
    assert_eq!(sent[0].recipient, "ops@example.com");
    assert!(sent[0].body.contains("Spot 0: vacant -> occupied"));
    assert_eq!(&sent[0].attachment.bytes[..2], &[0xFF, 0xD8]);
}

#[test]
fn first_observation_never_notifies() {
    let detector = ScriptedBackend::new().then_boxes(&[spot(0.0, 0.0, 10.0, 10.0)]);
    let mut h = Harness::new(detector, false);
    match h.at(10) {
        StepOutcome::Unchanged(occupancy) => assert_eq!(occupancy.as_slice(), &[true, false]),
        other => panic!("expected baseline, got {:?}", other),
    }
    assert!(h.delivered().is_empty());
}

#[test]
fn detector_fault_keeps_last_known_state() {
    let detector = ScriptedBackend::new()
        .then_boxes(&[spot(0.0, 0.0, 10.0, 10.0)])
        .then_failure("model crashed")
        .then_boxes(&[]);
    let mut h = Harness::new(detector, false);

    assert!(matches!(h.at(10), StepOutcome::Unchanged(_)));
    assert!(matches!(h.at(20), StepOutcome::DetectorFault(_)));
    assert_eq!(
        h.monitor.tracker().current().map(|v| v.as_slice().to_vec()),
        Some(vec![true, false])
    );
    // the failed cycle still advanced the sample clock
    assert_eq!(h.at(25), StepOutcome::Idle);
    match h.at(30) {
        StepOutcome::Changed { change, .. } => {
            assert_eq!(change.previous.as_slice(), &[true, false]);
            assert_eq!(change.current.as_slice(), &[false, false]);
        }
        other => panic!("expected change, got {:?}", other),
    }
    assert_eq!(h.monitor.stats().skipped_cycles, 1);
    assert_eq!(h.delivered().len(), 1);
}

#[test]
fn failed_delivery_still_consumes_the_change() {
    let occupied = [spot(20.0, 0.0, 30.0, 10.0)];
    let detector = ScriptedBackend::new()
        .then_boxes(&[])
        .then_boxes(&occupied)
        .then_boxes(&occupied);
    let mut h = Harness::new(detector, true);

    assert!(matches!(h.at(10), StepOutcome::Unchanged(_)));
    match h.at(20) {
        StepOutcome::Changed { result, .. } => match result {
            NotificationResult::Failed { reason, .. } => assert!(reason.contains("refused")),
            other => panic!("expected failure, got {:?}", other),
        },
        other => panic!("expected change, got {:?}", other),
    }
    assert!(matches!(h.at(30), StepOutcome::Unchanged(_)));

    let stats = h.monitor.stats();
    assert_eq!(stats.changes, 1);
    assert_eq!(stats.notifications_failed, 1);
    assert_eq!(stats.notifications_delivered, 0);
}

#[test]
fn replacing_spots_is_a_layout_change() {
    let mut h = Harness::new(ScriptedBackend::new().then_boxes(&[]), false);
    assert!(matches!(h.at(10), StepOutcome::Unchanged(_)));

    let mut spots = two_spots();
    spots.push(spot(40.0, 0.0, 50.0, 10.0));
    h.monitor.replace_spots(spots);

    match h.at(20) {
        StepOutcome::Changed { change, .. } => {
            assert!(change.layout_changed());
            assert_eq!(change.current.as_slice(), &[false, false, false]);
        }
        other => panic!("expected layout change, got {:?}", other),
    }
    let sent = h.delivered();
    assert!(sent[0].layout_changed);
    assert!(sent[0].body.contains("Spot layout changed: 2 -> 3 spots."));
}

#[test]
fn run_closes_source_at_end_of_stream() -> Result<()> {
    let mut h = Harness::with_camera(ScriptedBackend::new(), false, 4, false);
    let stats = h.monitor.run(&AtomicBool::new(false), None)?;
    assert_eq!(stats.frames, 4);
    assert!(h.closed.load(Ordering::SeqCst));
    Ok(())
}

#[test]
fn run_propagates_capture_errors_after_closing() {
    let mut h = Harness::with_camera(ScriptedBackend::new(), false, 2, true);
    let err = h
        .monitor
        .run(&AtomicBool::new(false), None)
        .expect_err("capture error");
    assert!(err.to_string().contains("unplugged"));
    assert!(h.closed.load(Ordering::SeqCst));
}
