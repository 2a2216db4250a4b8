use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::capture::frame::FrameImage;

/// How many consecutive dropped reads a source tolerates before it
/// surfaces a fatal error to the capture loop.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// A camera-like producer of RGB frames.
///
/// `read` returns `Ok(None)` on a transient failure (the loop skips the
/// frame and continues) and `Err` once the source's own
/// consecutive-failure threshold is crossed, which ends the pipeline.
/// Real drivers (V4L2, RTSP) implement this trait outside the crate.
pub trait FrameSource: Send {
    fn read(&mut self) -> Result<Option<FrameImage>>;

    /// Release driver resources. Default is a no-op.
    fn release(&mut self) {}
}

/// A scripted scene rendered by [`SyntheticCamera`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scene {
    /// Upright figure: tall narrow rectangle.
    Standing,
    /// Fallen figure: wide flat rectangle.
    Fallen,
    /// No person in frame.
    Empty,
    /// Simulated read failure (produces `None`).
    Dropout,
}

/// Deterministic frame source for tests and the demo daemon.
///
/// Renders a bright figure on a dark background according to a script of
/// `(scene, frame_count)` steps. With `looped`, the script repeats
/// forever; otherwise an exhausted script keeps yielding empty frames.
pub struct SyntheticCamera {
    width: u32,
    height: u32,
    frame_interval: Option<Duration>,
    script: Vec<(Scene, u32)>,
    cursor: usize,
    emitted_in_step: u32,
    looped: bool,
    consecutive_failures: u32,
}

const BACKGROUND: [u8; 3] = [16, 16, 16];
const FIGURE: [u8; 3] = [220, 220, 220];

impl SyntheticCamera {
    pub fn new(width: u32, height: u32, script: Vec<(Scene, u32)>) -> Self {
        Self {
            width,
            height,
            frame_interval: None,
            script,
            cursor: 0,
            emitted_in_step: 0,
            looped: false,
            consecutive_failures: 0,
        }
    }

    /// Pace reads at `fps`, blocking like a real camera would.
    pub fn with_fps(mut self, fps: u32) -> Self {
        if fps > 0 {
            self.frame_interval = Some(Duration::from_secs_f64(1.0 / fps as f64));
        }
        self
    }

    pub fn looped(mut self) -> Self {
        self.looped = true;
        self
    }

    fn next_scene(&mut self) -> Option<Scene> {
        loop {
            let (scene, count) = *self.script.get(self.cursor)?;
            if self.emitted_in_step < count {
                self.emitted_in_step += 1;
                return Some(scene);
            }
            self.cursor += 1;
            self.emitted_in_step = 0;
            if self.cursor >= self.script.len() {
                if self.looped {
                    self.cursor = 0;
                } else {
                    return None;
                }
            }
        }
    }

    fn render(&self, scene: Scene) -> FrameImage {
        let mut img = FrameImage::filled(self.width, self.height, BACKGROUND);
        let (w, h) = (self.width as i64, self.height as i64);
        match scene {
            Scene::Standing => {
                let fw = (w as f64 * 0.15) as u32;
                let fh = (h as f64 * 0.6) as u32;
                img.fill_rect(w / 2 - fw as i64 / 2, h / 5, fw, fh, FIGURE);
            }
            Scene::Fallen => {
                let fw = (w as f64 * 0.6) as u32;
                let fh = (h as f64 * 0.15) as u32;
                img.fill_rect(w / 5, h * 7 / 10, fw, fh, FIGURE);
            }
            Scene::Empty | Scene::Dropout => {}
        }
        img
    }
}

impl FrameSource for SyntheticCamera {
    fn read(&mut self) -> Result<Option<FrameImage>> {
        if let Some(interval) = self.frame_interval {
            std::thread::sleep(interval);
        }
        let scene = match self.next_scene() {
            Some(scene) => scene,
            None => Scene::Empty,
        };
        if scene == Scene::Dropout {
            self.consecutive_failures += 1;
            if self.consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                return Err(anyhow!(
                    "synthetic camera: {} consecutive read failures",
                    self.consecutive_failures
                ));
            }
            return Ok(None);
        }
        self.consecutive_failures = 0;
        Ok(Some(self.render(scene)))
    }
}
