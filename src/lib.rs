//! Parking spot occupancy monitor.
//!
//! Watches a fixed camera, periodically runs object detection, decides per-spot
//! occupancy by box overlap, and raises a notification exactly when the
//! occupancy pattern changes.
//!
//! # Pipeline
//!
//! `ingest` produces frames; `scheduler` gates which of them reach the
//! `detect` backend; `matcher` scores detections against the monitored
//! `spots` with `geometry::iou`; `tracker` compares the result with the
//! last-known state; on change, `notify` renders a snapshot (`annotate`) and
//! hands it to a transport. `monitor` owns the loop.
//!
//! # Module Structure
//!
//! - `geometry`: boxes and IoU
//! - `matcher`: occupancy vectors, spot matching
//! - `tracker`: change detection
//! - `scheduler`: fixed-interval sampling
//! - `spots`: the monitored spot set and its definition tool
//! - `frame`, `ingest`: frames and frame sources
//! - `detect`: detector backends and NMS
//! - `annotate`, `notify`: snapshots and delivery
//! - `config`: file + environment configuration
//! - `monitor`: the capture/detect/notify loop

pub mod annotate;
pub mod config;
pub mod detect;
pub mod frame;
pub mod geometry;
pub mod ingest;
pub mod matcher;
pub mod monitor;
pub mod notify;
pub mod scheduler;
pub mod spots;
pub mod tracker;

pub use config::MonitorConfig;
pub use detect::{Detection, DetectorBackend};
pub use frame::Frame;
pub use geometry::{iou, BoundingBox};
pub use ingest::FrameSource;
pub use matcher::{match_boxes, match_spots, OccupancyVector, DEFAULT_IOU_THRESHOLD};
pub use monitor::{Monitor, MonitorStats, StepOutcome};
pub use notify::{Notification, NotificationResult, NotificationTransport, NotificationTrigger};
pub use scheduler::{should_sample, DEFAULT_INTERVAL_SECS};
pub use spots::{MonitoredSpot, PointerEvent, SpotDrawer, SpotSet};
pub use tracker::{OccupancyChange, OccupancyTracker};
