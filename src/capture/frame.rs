use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::detect::types::BBox;

/// An owned RGB24 image, row-major, no padding between rows.
#[derive(Clone, Debug)]
pub struct FrameImage {
    pub width: u32,
    pub height: u32,
    data: Vec<u8>,
}

impl FrameImage {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(anyhow!(
                "frame data has {} bytes, expected {} for {}x{} RGB",
                data.len(),
                expected,
                width,
                height
            ));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Solid-colour image, used by the synthetic source and tests.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize * 3);
        for _ in 0..(width as usize * height as usize) {
            data.extend_from_slice(&rgb);
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
    }

    /// Paint an axis-aligned rectangle, clipped to the image bounds.
    pub fn fill_rect(&mut self, x: i64, y: i64, w: u32, h: u32, rgb: [u8; 3]) {
        let x0 = x.max(0) as u32;
        let y0 = y.max(0) as u32;
        let x1 = ((x + w as i64).max(0) as u32).min(self.width);
        let y1 = ((y + h as i64).max(0) as u32).min(self.height);
        for py in y0..y1 {
            for px in x0..x1 {
                let idx = (py as usize * self.width as usize + px as usize) * 3;
                self.data[idx..idx + 3].copy_from_slice(&rgb);
            }
        }
    }
}

/// One buffered frame: capture timestamp, shared pixels, and the bbox the
/// detector saw on it (kept for downstream visualisation, not consumed by
/// the detection path).
#[derive(Clone, Debug)]
pub struct FrameData {
    pub timestamp: f64,
    pub image: Arc<FrameImage>,
    pub bbox: Option<BBox>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_buffer_length() {
        assert!(FrameImage::new(4, 4, vec![0u8; 10]).is_err());
        assert!(FrameImage::new(4, 4, vec![0u8; 48]).is_ok());
    }

    #[test]
    fn fill_rect_clips_to_bounds() {
        let mut img = FrameImage::filled(8, 8, [0, 0, 0]);
        img.fill_rect(-2, -2, 4, 4, [200, 200, 200]);
        assert_eq!(img.pixel(0, 0), [200, 200, 200]);
        assert_eq!(img.pixel(2, 2), [0, 0, 0]);
        img.fill_rect(6, 6, 10, 10, [50, 50, 50]);
        assert_eq!(img.pixel(7, 7), [50, 50, 50]);
    }
}
