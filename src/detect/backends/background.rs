use anyhow::{anyhow, Result};

use crate::config::DetectorSettings;
use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::frame::Frame;
use crate::geometry::BoundingBox;

/// CPU backend: reference-background subtraction on a coarse grid.
///
/// The first frame seen becomes the empty-scene reference. Later frames are
/// split into `cell_size` cells; a cell is active when its mean absolute
/// channel difference from the reference exceeds `diff_threshold`. Active cells
/// are grouped by 4-connectivity and each group of at least `min_cells` cells
/// becomes one detection covering the group's cell bounds.
pub struct BackgroundBackend {
    cell_size: u32,
    diff_threshold: f32,
    min_cells: usize,
    reference: Option<Reference>,
}

struct Reference {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl BackgroundBackend {
    pub fn new(cell_size: u32, diff_threshold: f32, min_cells: usize) -> Self {
        Self {
            cell_size: cell_size.max(1),
            diff_threshold,
            min_cells: min_cells.max(1),
            reference: None,
        }
    }

    pub fn from_settings(settings: &DetectorSettings) -> Self {
        Self::new(
            settings.cell_size,
            settings.diff_threshold,
            settings.min_cells,
        )
    }

    pub fn has_reference(&self) -> bool {
        self.reference.is_some()
    }

    /// Forget the reference; the next frame becomes the new one.
    pub fn reset(&mut self) {
        self.reference = None;
    }

    fn learn(&mut self, frame: &Frame) {
        log::info!(
            "background reference learned from frame #{} ({}x{})",
            frame.sequence,
            frame.width,
            frame.height
        );
        self.reference = Some(Reference {
            width: frame.width,
            height: frame.height,
            pixels: frame.pixels().to_vec(),
        });
    }

    fn active_cells(&self, frame: &Frame, reference: &Reference) -> (Vec<bool>, usize, usize) {
        let cell = self.cell_size as usize;
        let (w, h) = (frame.width as usize, frame.height as usize);
        let cols = w.div_ceil(cell);
        let rows = h.div_ceil(cell);
        let current = frame.pixels();
        let mut active = vec![false; cols * rows];

        for row in 0..rows {
            for col in 0..cols {
                let (x0, y0) = (col * cell, row * cell);
                let (x1, y1) = ((x0 + cell).min(w), (y0 + cell).min(h));
                let mut total = 0u64;
                for y in y0..y1 {
                    let start = (y * w + x0) * 3;
                    let end = (y * w + x1) * 3;
                    total += current[start..end]
                        .iter()
                        .zip(&reference.pixels[start..end])
                        .map(|(a, b)| a.abs_diff(*b) as u64)
                        .sum::<u64>();
                }
                let samples = ((x1 - x0) * (y1 - y0) * 3) as f32;
                active[row * cols + col] = total as f32 / samples > self.diff_threshold;
            }
        }
        (active, cols, rows)
    }
}

impl DetectorBackend for BackgroundBackend {
    fn name(&self) -> &'static str {
        "background"
    }

    fn prime(&mut self, frame: &Frame) -> Result<()> {
        let stale = match &self.reference {
            Some(r) => r.width != frame.width || r.height != frame.height,
            None => true,
        };
        if stale {
            self.learn(frame);
        }
        Ok(())
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let Some(reference) = self.reference.as_ref() else {
            self.learn(frame);
            return Err(anyhow!("background reference not yet learned"));
        };
        if reference.width != frame.width || reference.height != frame.height {
            self.learn(frame);
            return Err(anyhow!("frame size changed; background reference reset"));
        }

        let (active, cols, rows) = self.active_cells(frame, reference);
        let cell = self.cell_size as f32;
        let mut visited = vec![false; active.len()];
        let mut detections = Vec::new();

        for start in 0..active.len() {
            if !active[start] || visited[start] {
                continue;
            }
            visited[start] = true;
            let mut stack = vec![start];
            let (mut cmin, mut cmax) = (usize::MAX, 0usize);
            let (mut rmin, mut rmax) = (usize::MAX, 0usize);
            let mut count = 0usize;

            while let Some(idx) = stack.pop() {
                let (r, c) = (idx / cols, idx % cols);
                count += 1;
                cmin = cmin.min(c);
                cmax = cmax.max(c);
                rmin = rmin.min(r);
                rmax = rmax.max(r);

                let mut neighbours = Vec::with_capacity(4);
                if c > 0 {
                    neighbours.push(idx - 1);
                }
                if c + 1 < cols {
                    neighbours.push(idx + 1);
                }
                if r > 0 {
                    neighbours.push(idx - cols);
                }
                if r + 1 < rows {
                    neighbours.push(idx + cols);
                }
                for n in neighbours {
                    if active[n] && !visited[n] {
                        visited[n] = true;
                        stack.push(n);
                    }
                }
            }

            if count < self.min_cells {
                continue;
            }
            let bbox = BoundingBox::new(
                cmin as f32 * cell,
                rmin as f32 * cell,
                (cmax + 1) as f32 * cell,
                (rmax + 1) as f32 * cell,
            )?
            .clamp_to(frame.width, frame.height);
            let span = (cmax - cmin + 1) * (rmax - rmin + 1);
            detections.push(Detection::new(bbox, count as f32 / span as f32));
        }

        log::debug!(
            "background backend: {} blobs on frame #{}",
            detections.len(),
            frame.sequence
        );
        Ok(detections)
    }
}
