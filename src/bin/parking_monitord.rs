//! parking_monitord - watch a camera and notify on parking occupancy changes

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_monitor::config::MonitorConfig;
use parking_monitor::detect::build_backend;
use parking_monitor::ingest::open_source;
use parking_monitor::notify::{build_transport, NotificationTrigger};
use parking_monitor::Monitor;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (JSON, or TOML by extension).
    #[arg(long, env = "PARKING_MONITOR_CONFIG")]
    config: Option<PathBuf>,
    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = MonitorConfig::load_from(args.config.as_deref())?;
    let spots = cfg.load_spots()?;
    if spots.is_empty() {
        return Err(anyhow!(
            "no parking spots configured (set spots.path or spots.boxes; see define_spots)"
        ));
    }

    let source = open_source(&cfg.source)?;
    let detector = build_backend(&cfg.detector)?;
    let transport = build_transport(&cfg.notify)?;
    let trigger = NotificationTrigger::new(cfg.notify.clone(), transport);

    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    })
    .context("error setting Ctrl-C handler")?;

    log::info!(
        "parking_monitord running. source {}, {} spots, sampling every {:?}",
        cfg.source.url,
        spots.len(),
        cfg.occupancy.interval
    );

    let mut monitor = Monitor::new(
        source,
        detector,
        spots,
        trigger,
        &cfg.occupancy,
        Instant::now(),
    )
    .with_frame_pacing(cfg.source.target_fps);
    let stats = monitor.run(&shutdown, args.max_frames)?;

    log::info!(
        "parking_monitord stopped: {} frames, {} cycles ({} skipped), {} changes, {} notifications delivered, {} failed",
        stats.frames,
        stats.cycles,
        stats.skipped_cycles,
        stats.changes,
        stats.notifications_delivered,
        stats.notifications_failed
    );
    Ok(())
}
