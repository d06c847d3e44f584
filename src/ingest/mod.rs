//! Frame sources.
//!
//! Sources produce `Frame`s on demand for the monitor loop:
//! - Synthetic parking-lot scene (`stub://`), for demos and tests
//! - Local image directories (one still per frame, name order)
//! - HTTP JPEG snapshot / MJPEG endpoints (feature: ingest-http)
//!
//! A source returning `Ok(None)` has reached end of stream. The monitor treats
//! that, and any capture error, as terminal; reconnect policy belongs to the
//! source itself.

use anyhow::Result;
use std::path::PathBuf;

use crate::config::SourceSettings;
use crate::frame::Frame;

pub mod dir;
#[cfg(feature = "ingest-http")]
pub mod http;
pub mod synthetic;

pub use dir::ImageDirSource;
#[cfg(feature = "ingest-http")]
pub use http::HttpSnapshotSource;
pub use synthetic::{SyntheticConfig, SyntheticSource};

/// Capture counters reported by every source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}

pub trait FrameSource {
    /// Open the underlying device or stream.
    fn connect(&mut self) -> Result<()>;

    /// Capture the next frame. `Ok(None)` means the stream has ended.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;

    /// Release the device. Called once when the monitor loop exits.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Build a source from its URL scheme.
pub fn open_source(settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    let url = settings.url.trim();
    if url.starts_with("stub://") {
        let config = SyntheticConfig::from_settings(settings)?;
        return Ok(Box::new(SyntheticSource::new(config)));
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        #[cfg(feature = "ingest-http")]
        {
            return Ok(Box::new(HttpSnapshotSource::new(
                url,
                settings.target_fps,
            )?));
        }
        #[cfg(not(feature = "ingest-http"))]
        {
            anyhow::bail!("http sources require the ingest-http feature");
        }
    }
    if url.contains("://") {
        anyhow::bail!("unsupported source url '{}'", url);
    }
    Ok(Box::new(ImageDirSource::new(PathBuf::from(url))))
}

pub(crate) fn frame_interval(target_fps: u32) -> std::time::Duration {
    if target_fps == 0 {
        std::time::Duration::from_millis(0)
    } else {
        std::time::Duration::from_millis((1000 / target_fps).max(1) as u64)
    }
}
