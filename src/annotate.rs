//! Snapshot rendering for notifications.

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};

use crate::frame::Frame;
use crate::matcher::OccupancyVector;
use crate::spots::SpotSet;

pub const OCCUPIED_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const VACANT_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const OUTLINE_THICKNESS: u32 = 2;

/// Copy the frame and outline every spot: red when occupied, green when vacant.
///
/// Spots beyond the occupancy vector's length are drawn as vacant.
pub fn annotate_frame(frame: &Frame, spots: &SpotSet, occupancy: &OccupancyVector) -> Result<RgbImage> {
    let mut image = frame.to_image()?;
    for spot in spots.iter() {
        let color = if occupancy.get(spot.index).unwrap_or(false) {
            OCCUPIED_COLOR
        } else {
            VACANT_COLOR
        };
        let clamped = spot.bbox.clamp_to(image.width(), image.height());
        draw_outline(
            &mut image,
            clamped.x1 as u32,
            clamped.y1 as u32,
            clamped.x2 as u32,
            clamped.y2 as u32,
            color,
        );
    }
    Ok(image)
}

fn draw_outline(image: &mut RgbImage, x1: u32, y1: u32, x2: u32, y2: u32, color: Rgb<u8>) {
    let (w, h) = image.dimensions();
    if x1 >= x2 || y1 >= y2 || w == 0 || h == 0 {
        return;
    }
    let x2 = x2.min(w);
    let y2 = y2.min(h);
    for t in 0..OUTLINE_THICKNESS {
        let top = y1 + t;
        let bottom = y2.saturating_sub(1 + t);
        for x in x1..x2 {
            if top < y2 {
                image.put_pixel(x, top, color);
            }
            if bottom >= y1 {
                image.put_pixel(x, bottom, color);
            }
        }
        let left = x1 + t;
        let right = x2.saturating_sub(1 + t);
        for y in y1..y2 {
            if left < x2 {
                image.put_pixel(left, y, color);
            }
            if right >= x1 {
                image.put_pixel(right, y, color);
            }
        }
    }
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100));
    encoder
        .encode_image(image)
        .context("failed to encode snapshot jpeg")?;
    Ok(bytes)
}
