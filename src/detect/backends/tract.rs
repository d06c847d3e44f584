#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use tract_onnx::prelude::*;

use crate::config::DetectorSettings;
use crate::detect::backend::DetectorBackend;
use crate::detect::nms::non_max_suppression;
use crate::detect::result::Detection;
use crate::frame::Frame;
use crate::geometry::BoundingBox;

/// Tract-based backend for YOLO-style ONNX detectors.
///
/// Expects a single output of shape `[1, N, 5 + C]` whose rows are
/// `cx, cy, w, h, objectness, class scores...` with box coordinates
/// normalized to the model input. Frames are resized to the model input,
/// boxes are scaled back to frame pixels, then confidence-filtered and
/// de-duplicated with NMS.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    input_width: u32,
    input_height: u32,
    confidence_threshold: f32,
    nms_threshold: f32,
    classes: Option<Vec<usize>>,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, settings: &DetectorSettings) -> Result<Self> {
        let model_path = model_path.as_ref();
        let (width, height) = (settings.input_width, settings.input_height);
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "tract backend loaded {} ({}x{} input)",
            model_path.display(),
            width,
            height
        );
        Ok(Self {
            model,
            input_width: width,
            input_height: height,
            confidence_threshold: settings.confidence_threshold,
            nms_threshold: settings.nms_threshold,
            classes: settings.classes.clone(),
        })
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let image = frame.to_image()?;
        let resized = imageops::resize(
            &image,
            self.input_width,
            self.input_height,
            FilterType::Triangle,
        );
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.input_height as usize, self.input_width as usize),
            |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        );
        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>, frame: &Frame) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        if shape.len() != 3 || shape[2] < 6 {
            return Err(anyhow!("unexpected detector output shape {:?}", shape));
        }
        let cols = shape[2];
        let values: Vec<f32> = view.iter().copied().collect();
        let rows = decode_rows(
            &values,
            cols,
            frame.width,
            frame.height,
            self.confidence_threshold,
            self.classes.as_deref(),
        );
        Ok(non_max_suppression(rows, self.nms_threshold))
    }
}

/// Turn raw `[cx, cy, w, h, objectness, scores...]` rows into pixel-space detections.
fn decode_rows(
    values: &[f32],
    cols: usize,
    frame_width: u32,
    frame_height: u32,
    confidence_threshold: f32,
    classes: Option<&[usize]>,
) -> Vec<Detection> {
    let (fw, fh) = (frame_width as f32, frame_height as f32);
    let mut detections = Vec::new();
    for row in values.chunks_exact(cols) {
        let scores = &row[5..];
        let Some((class_id, &score)) = scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        else {
            continue;
        };
        if score <= confidence_threshold {
            continue;
        }
        if let Some(allowed) = classes {
            if !allowed.contains(&class_id) {
                continue;
            }
        }
        let (cx, cy, w, h) = (row[0] * fw, row[1] * fh, row[2] * fw, row[3] * fh);
        let Ok(bbox) = BoundingBox::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
        else {
            continue;
        };
        detections.push(Detection::new(bbox.clamp_to(frame_width, frame_height), score).with_class(class_id));
    }
    detections
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, frame)
    }
}
