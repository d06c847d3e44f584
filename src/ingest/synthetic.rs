//! Synthetic parking-lot source (`stub://`).
//!
//! Renders a static lot: textured asphalt with painted slot outlines. The scene
//! is re-rolled every `scene_period` frames; each slot independently holds a
//! solid-colored "vehicle" or stays empty. The first scene is always an empty
//! lot so background-subtraction detectors can learn the reference from it.
//!
//! `stub://name?frames=N` ends the stream after N frames.

use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{FrameSource, SourceStats};
use crate::config::SourceSettings;
use crate::frame::Frame;
use crate::geometry::BoundingBox;

const ASPHALT: u8 = 96;
const LINE: [u8; 3] = [235, 235, 235];
const VEHICLE_COLORS: [[u8; 3]; 4] = [[200, 40, 40], [40, 60, 200], [230, 200, 40], [30, 30, 30]];

#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub seed: u64,
    pub scene_period: u64,
    pub slots: Vec<BoundingBox>,
    pub max_frames: Option<u64>,
}

impl SyntheticConfig {
    pub fn from_settings(settings: &SourceSettings) -> Result<Self> {
        let max_frames = match settings.url.split_once("?frames=") {
            Some((_, n)) => Some(
                n.parse()
                    .map_err(|_| anyhow!("invalid frame limit in {}", settings.url))?,
            ),
            None => None,
        };
        let slots = match &settings.synthetic_slots {
            Some(slots) => slots.clone(),
            None => default_slots(settings.width, settings.height)?,
        };
        Ok(Self {
            url: settings.url.clone(),
            width: settings.width,
            height: settings.height,
            seed: settings.seed,
            scene_period: settings.scene_period.max(1),
            slots,
            max_frames,
        })
    }
}

/// Four side-by-side slots across the lower part of the frame.
pub fn default_slots(width: u32, height: u32) -> Result<Vec<BoundingBox>> {
    let (w, h) = (width as f32, height as f32);
    let margin = w / 32.0;
    let gap = w / 32.0;
    let slot_w = (w - 2.0 * margin - 3.0 * gap) / 4.0;
    let top = h * 0.6;
    let bottom = h - h / 24.0;
    (0..4)
        .map(|i| {
            let x1 = margin + i as f32 * (slot_w + gap);
            BoundingBox::new(x1, top, x1 + slot_w, bottom)
        })
        .collect()
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    rng: StdRng,
    background: Vec<u8>,
    occupancy: Vec<bool>,
    frame_count: u64,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        let background = render_background(&config);
        let occupancy = vec![false; config.slots.len()];
        Self {
            config,
            rng,
            background,
            occupancy,
            frame_count: 0,
        }
    }

    /// Which slots hold a vehicle in the most recently rendered frame.
    pub fn scene_occupancy(&self) -> &[bool] {
        &self.occupancy
    }

    pub fn slots(&self) -> &[BoundingBox] {
        &self.config.slots
    }

    fn roll_scene(&mut self) {
        for occupied in self.occupancy.iter_mut() {
            *occupied = self.rng.gen_bool(0.5);
        }
        log::debug!("synthetic scene rolled: {:?}", self.occupancy);
    }

    fn render(&self) -> Vec<u8> {
        let mut pixels = self.background.clone();
        let width = self.config.width as usize;
        for (i, slot) in self.config.slots.iter().enumerate() {
            if !self.occupancy[i] {
                continue;
            }
            let car = vehicle_box(slot).clamp_to(self.config.width, self.config.height);
            let color = VEHICLE_COLORS[i % VEHICLE_COLORS.len()];
            for y in car.y1 as usize..car.y2 as usize {
                for x in car.x1 as usize..car.x2 as usize {
                    let idx = (y * width + x) * 3;
                    pixels[idx..idx + 3].copy_from_slice(&color);
                }
            }
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn connect(&mut self) -> Result<()> {
        log::info!("SyntheticSource: connected to {} (synthetic)", self.config.url);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(limit) = self.config.max_frames {
            if self.frame_count >= limit {
                return Ok(None);
            }
        }
        self.frame_count += 1;
        if self.frame_count > 1 && (self.frame_count - 1) % self.config.scene_period == 0 {
            self.roll_scene();
        }
        let frame = Frame::new(
            self.render(),
            self.config.width,
            self.config.height,
            self.frame_count,
        )?;
        Ok(Some(frame))
    }

    fn is_healthy(&self) -> bool {
        true
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.url.clone(),
        }
    }
}

/// The painted vehicle sits inside its slot with a 10% inset on every side.
fn vehicle_box(slot: &BoundingBox) -> BoundingBox {
    let dx = slot.width() * 0.1;
    let dy = slot.height() * 0.1;
    BoundingBox {
        x1: slot.x1 + dx,
        y1: slot.y1 + dy,
        x2: slot.x2 - dx,
        y2: slot.y2 - dy,
    }
}

fn render_background(config: &SyntheticConfig) -> Vec<u8> {
    let (w, h) = (config.width as usize, config.height as usize);
    let mut pixels = vec![0u8; w * h * 3];
    for y in 0..h {
        for x in 0..w {
            let grain = ((x * 7 + y * 13) % 9) as u8;
            let idx = (y * w + x) * 3;
            pixels[idx..idx + 3].fill(ASPHALT + grain);
        }
    }
    for slot in &config.slots {
        let slot = slot.clamp_to(config.width, config.height);
        if slot.is_degenerate() {
            continue;
        }
        let (x1, y1) = (slot.x1 as usize, slot.y1 as usize);
        let (x2, y2) = (slot.x2 as usize, slot.y2 as usize);
        for y in y1..y2 {
            for x in [x1, x2.saturating_sub(1)] {
                let idx = (y * w + x) * 3;
                pixels[idx..idx + 3].copy_from_slice(&LINE);
            }
        }
    }
    pixels
}
