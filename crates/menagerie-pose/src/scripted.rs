//! Deterministic camera and detector stand-ins for headless runs and tests.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use menagerie_core::{CameraFacing, Pose};
use tokio::time::Instant;

use crate::{CameraFrame, CameraSource, PoseError, PoseEstimator};

/// Replays recorded detector output, one frame of poses per call, looping forever.
#[derive(Debug, Clone, Default)]
pub struct ScriptedEstimator {
    frames: Vec<Vec<Pose>>,
    cursor: usize,
}

impl ScriptedEstimator {
    #[must_use]
    pub fn new(frames: Vec<Vec<Pose>>) -> Self {
        Self { frames, cursor: 0 }
    }

    /// Parse JSON lines where each non-blank line is an array of poses.
    pub fn from_json_lines(reader: impl BufRead) -> Result<Self, PoseError> {
        let mut frames = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let poses: Vec<Pose> =
                serde_json::from_str(trimmed).map_err(|source| PoseError::Script {
                    line: index + 1,
                    source,
                })?;
            frames.push(poses);
        }
        Ok(Self::new(frames))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, PoseError> {
        let file = File::open(path)?;
        Self::from_json_lines(BufReader::new(file))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    fn next_frame(&mut self) -> Vec<Pose> {
        if self.frames.is_empty() {
            return Vec::new();
        }
        let poses = self.frames[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.frames.len();
        poses
    }
}

impl PoseEstimator for ScriptedEstimator {
    async fn estimate(&mut self, _frame: &CameraFrame) -> Result<Vec<Pose>, PoseError> {
        Ok(self.next_frame())
    }
}

/// A camera that always has a blank frame of fixed size ready.
#[derive(Debug, Clone)]
pub struct SyntheticCamera {
    width: u32,
    height: u32,
    facing: CameraFacing,
    origin: Instant,
}

impl SyntheticCamera {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_origin(width, height, Instant::now())
    }

    /// Timestamps are reported as seconds since `origin`.
    #[must_use]
    pub fn with_origin(width: u32, height: u32, origin: Instant) -> Self {
        Self {
            width,
            height,
            facing: CameraFacing::default(),
            origin,
        }
    }

    #[must_use]
    pub fn facing(&self) -> CameraFacing {
        self.facing
    }
}

impl CameraSource for SyntheticCamera {
    fn capture(&mut self) -> Option<CameraFrame> {
        Some(CameraFrame {
            width: self.width,
            height: self.height,
            captured_at: self.origin.elapsed().as_secs_f64(),
            facing: self.facing,
            pixels: Vec::new(),
        })
    }

    fn set_facing(&mut self, facing: CameraFacing) {
        self.facing = facing;
    }
}
