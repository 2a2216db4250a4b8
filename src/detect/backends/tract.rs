#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::{DetectionKind, DetectorBackend};
use crate::detect::types::{BBox, Detection, Skeleton, NUM_KEYPOINTS};

/// Tract-based backend for YOLO-style ONNX models.
///
/// Supports two export layouts:
/// - person detection: `[1, N, 6]` rows of `x1, y1, x2, y2, conf, class`
/// - pose estimation: `[1, 56, N]` or `[1, N, 56]` rows of
///   `cx, cy, w, h, conf` followed by 17 x `(x, y, visibility)`
///
/// The backend loads a local model file only; it performs no network I/O.
pub struct TractBackend {
    model: TypedSimplePlan<TypedModel>,
    width: u32,
    height: u32,
    kind: DetectionKind,
    confidence_threshold: f32,
    classes: Vec<i64>,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    ///
    /// The confidence threshold and accepted class ids come straight from
    /// the detection settings; the class filter applies to the
    /// person-detection layout only.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        width: u32,
        height: u32,
        kind: DetectionKind,
        confidence_threshold: f32,
        classes: Vec<i64>,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
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

        Ok(Self {
            model,
            width,
            height,
            kind,
            confidence_threshold,
            classes,
        })
    }

    fn build_input(&self, pixels: &[u8], width: u32, height: u32) -> Result<Tensor> {
        if width != self.width || height != self.height {
            return Err(anyhow!(
                "frame size {}x{} does not match model input {}x{}",
                width,
                height,
                self.width,
                self.height
            ));
        }
        let expected_len = width as usize * height as usize * 3;
        if pixels.len() != expected_len {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                expected_len,
                pixels.len()
            ));
        }

        let width = width as usize;
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, height as usize, width),
            |(_, channel, y, x)| {
                let idx = (y * width + x) * 3 + channel;
                pixels[idx] as f32 / 255.0
            },
        );
        Ok(input.into_tensor())
    }

    fn parse_person_rows(&self, output: &Tensor) -> Result<Vec<(f32, Detection)>> {
        let shape = output.shape().to_vec();
        let data = output
            .to_array_view::<f32>()
            .context("detection output was not f32")?
            .as_slice()
            .ok_or_else(|| anyhow!("detection output is not contiguous"))?
            .to_vec();
        let rows = match shape.as_slice() {
            [1, n, 6] => *n,
            [n, 6] => *n,
            _ => {
                return Err(anyhow!(
                    "detection output must have shape [N,6] or [1,N,6], got {:?}",
                    shape
                ))
            }
        };
        if data.len() != rows * 6 {
            return Err(anyhow!(
                "detection output has {} values, expected {}",
                data.len(),
                rows * 6
            ));
        }

        let mut out = Vec::new();
        for chunk in data.chunks(6) {
            let confidence = chunk[4];
            if !confidence.is_finite() || confidence < self.confidence_threshold {
                continue;
            }
            let class_id = chunk[5].round() as i64;
            if !self.classes.is_empty() && !self.classes.contains(&class_id) {
                continue;
            }
            let (x1, y1, x2, y2) = (chunk[0], chunk[1], chunk[2], chunk[3]);
            if x2 <= x1 || y2 <= y1 {
                continue;
            }
            out.push((
                confidence,
                Detection::BBox(BBox {
                    x: x1 as i64,
                    y: y1 as i64,
                    width: (x2 - x1) as u32,
                    height: (y2 - y1) as u32,
                }),
            ));
        }
        Ok(out)
    }

    fn parse_pose_rows(&self, output: &Tensor) -> Result<Vec<(f32, Detection)>> {
        const ROW: usize = 5 + NUM_KEYPOINTS * 3;
        let shape = output.shape().to_vec();
        let data = output
            .to_array_view::<f32>()
            .context("pose output was not f32")?
            .as_slice()
            .ok_or_else(|| anyhow!("pose output is not contiguous"))?
            .to_vec();

        // [1, 56, N] is channel-major (YOLO pose export); [1, N, 56] row-major.
        let (rows, row_of): (usize, Box<dyn Fn(usize, usize) -> f32>) = match shape.as_slice() {
            [1, r, n] if *r == ROW => {
                let n = *n;
                (n, Box::new(move |i, f| data[f * n + i]))
            }
            [1, n, r] if *r == ROW => {
                let n = *n;
                (n, Box::new(move |i, f| data[i * ROW + f]))
            }
            _ => {
                return Err(anyhow!(
                    "pose output must have shape [1,{ROW},N] or [1,N,{ROW}], got {:?}",
                    shape
                ))
            }
        };

        let mut out = Vec::new();
        for i in 0..rows {
            let confidence = row_of(i, 4);
            if !confidence.is_finite() || confidence < self.confidence_threshold {
                continue;
            }
            let mut keypoints = [[0.0f64; 3]; NUM_KEYPOINTS];
            for (k, kp) in keypoints.iter_mut().enumerate() {
                kp[0] = row_of(i, 5 + k * 3) as f64;
                kp[1] = row_of(i, 5 + k * 3 + 1) as f64;
                kp[2] = row_of(i, 5 + k * 3 + 2).clamp(0.0, 1.0) as f64;
            }
            out.push((confidence, Detection::Skeleton(Skeleton { keypoints })));
        }
        Ok(out)
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn supports(&self, kind: DetectionKind) -> bool {
        kind == self.kind
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<Detection>> {
        let input = self.build_input(pixels, width, height)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        if outputs.is_empty() {
            return Err(anyhow!("model produced no outputs"));
        }

        let mut scored = match self.kind {
            DetectionKind::Person => self.parse_person_rows(&outputs[0])?,
            DetectionKind::Pose => self.parse_pose_rows(&outputs[0])?,
        };
        // Most salient first.
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        Ok(scored.into_iter().map(|(_, d)| d).collect())
    }
}
