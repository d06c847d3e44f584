//! Local image-directory source.
//!
//! Plays back `.jpg`/`.jpeg`/`.png` stills from a directory in file-name order,
//! one still per frame. Useful for replaying captures from a camera that drops
//! snapshots to disk. The stream ends after the last file.

use anyhow::{anyhow, Context, Result};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use super::{FrameSource, SourceStats};
use crate::frame::Frame;

const EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

pub struct ImageDirSource {
    dir: PathBuf,
    pending: VecDeque<PathBuf>,
    connected: bool,
    frame_count: u64,
    skipped: u64,
}

impl ImageDirSource {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            pending: VecDeque::new(),
            connected: false,
            frame_count: 0,
            skipped: 0,
        }
    }

    /// Files that could not be decoded and were passed over.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl FrameSource for ImageDirSource {
    fn connect(&mut self) -> Result<()> {
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("failed to read image directory {}", self.dir.display()))?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && has_image_extension(&path) {
                files.push(path);
            }
        }
        if files.is_empty() {
            return Err(anyhow!("no images found in {}", self.dir.display()));
        }
        files.sort();
        log::info!(
            "ImageDirSource: {} frames queued from {}",
            files.len(),
            self.dir.display()
        );
        self.pending = files.into();
        self.connected = true;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.connected {
            return Err(anyhow!("image directory source not connected; call connect() first"));
        }
        while let Some(path) = self.pending.pop_front() {
            match image::open(&path) {
                Ok(image) => {
                    self.frame_count += 1;
                    return Ok(Some(Frame::from_image(image.into_rgb8(), self.frame_count)));
                }
                Err(e) => {
                    self.skipped += 1;
                    log::warn!("skipping undecodable frame {}: {}", path.display(), e);
                }
            }
        }
        Ok(None)
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.dir.display().to_string(),
        }
    }

    fn close(&mut self) -> Result<()> {
        self.pending.clear();
        self.connected = false;
        Ok(())
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn plays_images_in_name_order_then_ends() -> Result<()> {
        let dir = tempfile::tempdir()?;
        RgbImage::from_pixel(4, 2, Rgb([10, 10, 10])).save(dir.path().join("b.png"))?;
        RgbImage::from_pixel(4, 2, Rgb([200, 0, 0])).save(dir.path().join("a.png"))?;
        std::fs::write(dir.path().join("notes.txt"), "ignored")?;
        std::fs::write(dir.path().join("c.jpg"), "not a jpeg")?;

        let mut source = ImageDirSource::new(dir.path().to_path_buf());
        source.connect()?;

        let first = source.next_frame()?.expect("first frame");
        assert_eq!((first.width, first.height), (4, 2));
        assert_eq!(first.pixel(0, 0), [200, 0, 0]);
        let second = source.next_frame()?.expect("second frame");
        assert_eq!(second.pixel(0, 0), [10, 10, 10]);
        assert!(source.next_frame()?.is_none());
        assert_eq!(source.skipped(), 1);
        assert_eq!(source.stats().frames_captured, 2);
        Ok(())
    }

    #[test]
    fn empty_directory_fails_to_connect() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut source = ImageDirSource::new(dir.path().to_path_buf());
        assert!(source.connect().is_err());
        Ok(())
    }
}
