//! demo - end-to-end synthetic run of the parking monitor
//!
//! Synthetic lot, background-subtraction detector, spool transport. Frames are
//! fed on a simulated clock so a multi-minute session runs in seconds.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use parking_monitor::config::{
    DetectorSettings, NotifySettings, OccupancySettings, SourceSettings,
};
use parking_monitor::detect::BackgroundBackend;
use parking_monitor::ingest::synthetic::default_slots;
use parking_monitor::ingest::{SyntheticConfig, SyntheticSource};
use parking_monitor::notify::{NotificationTrigger, SpoolTransport};
use parking_monitor::{Monitor, SpotSet, StepOutcome};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Number of synthetic frames to run.
    #[arg(long, default_value_t = 1200)]
    frames: u64,
    /// Simulated frames per second.
    #[arg(long, default_value_t = 10)]
    fps: u32,
    /// Seconds between detection cycles.
    #[arg(long, default_value_t = 10)]
    interval: u64,
    /// Frames between synthetic scene changes.
    #[arg(long, default_value_t = 50)]
    scene_period: u64,
    /// Seed for the synthetic scene.
    #[arg(long, default_value_t = 7)]
    seed: u64,
    /// Output directory for spooled notifications and the snapshot.
    #[arg(long, default_value = "demo_out")]
    out: PathBuf,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if args.fps == 0 {
        return Err(anyhow!("fps must be >= 1"));
    }
    if args.interval == 0 {
        return Err(anyhow!("interval must be >= 1"));
    }

    let source_settings = SourceSettings {
        url: format!("stub://demo?frames={}", args.frames),
        target_fps: args.fps,
        seed: args.seed,
        scene_period: args.scene_period,
        ..SourceSettings::default()
    };
    let source = SyntheticSource::new(SyntheticConfig::from_settings(&source_settings)?);
    let spots = SpotSet::from_boxes(default_slots(source_settings.width, source_settings.height)?);
    let detector = BackgroundBackend::from_settings(&DetectorSettings::default());

    let notify = NotifySettings {
        transport: "spool".to_string(),
        recipient: "demo@localhost".to_string(),
        snapshot_path: Some(args.out.join("parking_status.jpg")),
        spool_dir: args.out.join("outbox"),
        ..NotifySettings::default()
    };
    let transport = SpoolTransport::new(&notify.spool_dir)?;
    let trigger = NotificationTrigger::new(notify, Box::new(transport));

    let occupancy = OccupancySettings {
        interval: Duration::from_secs(args.interval),
        ..OccupancySettings::default()
    };
    let start = Instant::now();
    let mut monitor = Monitor::new(
        Box::new(source),
        Box::new(detector),
        spots,
        trigger,
        &occupancy,
        start,
    );
    monitor.connect()?;

    let frame_dt = Duration::from_secs(1) / args.fps;
    let mut tick = 0u32;
    loop {
        let now = start + frame_dt * tick;
        tick += 1;
        match monitor.step_at(now)? {
            StepOutcome::EndOfStream => break,
            StepOutcome::Changed { change, result } => {
                println!(
                    "t={:>6.1}s  {:?} -> {:?}  ({:?})",
                    (now - start).as_secs_f32(),
                    change.previous.as_slice(),
                    change.current.as_slice(),
                    result
                );
            }
            StepOutcome::DetectorFault(reason) => {
                println!("t={:>6.1}s  cycle skipped: {}", (now - start).as_secs_f32(), reason);
            }
            StepOutcome::Unchanged(_) | StepOutcome::Idle => {}
        }
    }
    monitor.close();

    let stats = monitor.stats();
    println!("demo complete");
    println!("  frames:        {}", stats.frames);
    println!("  cycles:        {} ({} skipped)", stats.cycles, stats.skipped_cycles);
    println!("  changes:       {}", stats.changes);
    println!(
        "  notifications: {} delivered, {} failed",
        stats.notifications_delivered, stats.notifications_failed
    );
    println!("  outbox:        {}", args.out.join("outbox").display());
    Ok(())
}
