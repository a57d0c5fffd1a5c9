//! Pose data model, display scaling and the polling throttle shared by every host.

use serde::{Deserialize, Serialize};

use crate::{ConfigError, FrameBounds, Position};

/// The 17 COCO body keypoints emitted by single-person and multi-person detectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeypointKind {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

impl KeypointKind {
    pub const ALL: [Self; 17] = [
        Self::Nose,
        Self::LeftEye,
        Self::RightEye,
        Self::LeftEar,
        Self::RightEar,
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::LeftElbow,
        Self::RightElbow,
        Self::LeftWrist,
        Self::RightWrist,
        Self::LeftHip,
        Self::RightHip,
        Self::LeftKnee,
        Self::RightKnee,
        Self::LeftAnkle,
        Self::RightAnkle,
    ];

    /// Wire name used by pose detectors.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Nose => "nose",
            Self::LeftEye => "left_eye",
            Self::RightEye => "right_eye",
            Self::LeftEar => "left_ear",
            Self::RightEar => "right_ear",
            Self::LeftShoulder => "left_shoulder",
            Self::RightShoulder => "right_shoulder",
            Self::LeftElbow => "left_elbow",
            Self::RightElbow => "right_elbow",
            Self::LeftWrist => "left_wrist",
            Self::RightWrist => "right_wrist",
            Self::LeftHip => "left_hip",
            Self::RightHip => "right_hip",
            Self::LeftKnee => "left_knee",
            Self::RightKnee => "right_knee",
            Self::LeftAnkle => "left_ankle",
            Self::RightAnkle => "right_ankle",
        }
    }

    /// Parse a detector name; unknown names yield `None`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

/// One detected body landmark in source-video pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub name: KeypointKind,
    pub x: f32,
    pub y: f32,
    pub score: f32,
}

impl Keypoint {
    #[must_use]
    pub const fn new(name: KeypointKind, x: f32, y: f32, score: f32) -> Self {
        Self { name, x, y, score }
    }

    #[must_use]
    pub fn position(&self) -> Position {
        Position::new(self.x, self.y)
    }
}

/// A detected person.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub score: f32,
    pub keypoints: Vec<Keypoint>,
}

impl Pose {
    #[must_use]
    pub fn new(score: f32, keypoints: Vec<Keypoint>) -> Self {
        Self { score, keypoints }
    }

    #[must_use]
    pub fn keypoint(&self, kind: KeypointKind) -> Option<&Keypoint> {
        self.keypoints.iter().find(|keypoint| keypoint.name == kind)
    }

    /// The keypoint, if present with a score strictly above `threshold`.
    #[must_use]
    pub fn confident(&self, kind: KeypointKind, threshold: f32) -> Option<&Keypoint> {
        self.keypoint(kind)
            .filter(|keypoint| keypoint.score > threshold && keypoint.position().is_finite())
    }

    /// The wrist of a raised hand, left side first.
    ///
    /// A hand is raised when its wrist is at or above its elbow (image y grows downward).
    #[must_use]
    pub fn raised_palm(&self, threshold: f32) -> Option<&Keypoint> {
        let sides = [
            (KeypointKind::LeftWrist, KeypointKind::LeftElbow),
            (KeypointKind::RightWrist, KeypointKind::RightElbow),
        ];
        sides.into_iter().find_map(|(wrist, elbow)| {
            let wrist = self.confident(wrist, threshold)?;
            let elbow = self.confident(elbow, threshold)?;
            (wrist.y <= elbow.y).then_some(wrist)
        })
    }
}

/// Scaling from source-video pixels into display coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayScale {
    pub scale_x: f32,
    pub scale_y: f32,
    pub offset: Position,
}

impl DisplayScale {
    #[must_use]
    pub fn apply(&self, point: Position) -> Position {
        Position::new(
            self.offset.x + point.x * self.scale_x,
            self.offset.y + point.y * self.scale_y,
        )
    }
}

/// Latest output of the pose detector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoseSnapshot {
    /// Native width of the frame the poses were measured on.
    pub source_width: f32,
    /// Native height of the frame the poses were measured on.
    pub source_height: f32,
    /// Host timestamp (seconds) at which the frame was captured.
    pub captured_at: f64,
    pub poses: Vec<Pose>,
}

impl PoseSnapshot {
    #[must_use]
    pub fn new(source_width: f32, source_height: f32, captured_at: f64, poses: Vec<Pose>) -> Self {
        Self {
            source_width,
            source_height,
            captured_at,
            poses,
        }
    }

    /// A snapshot with no people, used when the detector is missing or failed.
    #[must_use]
    pub fn empty(captured_at: f64) -> Self {
        Self {
            captured_at,
            ..Self::default()
        }
    }

    /// The first detected pose; the only one used for tracking.
    #[must_use]
    pub fn primary(&self) -> Option<&Pose> {
        self.poses.first()
    }

    /// Scale factors into `bounds`, or `None` when the source size is unusable.
    #[must_use]
    pub fn display_scale(&self, bounds: &FrameBounds) -> Option<DisplayScale> {
        let usable = |value: f32| value.is_finite() && value > 0.0;
        if !usable(self.source_width) || !usable(self.source_height) {
            return None;
        }
        Some(DisplayScale {
            scale_x: bounds.width / self.source_width,
            scale_y: bounds.height / self.source_height,
            offset: Position::new(bounds.left, bounds.top),
        })
    }
}

/// Pose polling configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PoseConfig {
    /// Minimum time between detector calls.
    pub poll_interval_ms: u64,
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
        }
    }
}

impl PoseConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be positive"));
        }
        Ok(())
    }

    #[must_use]
    pub fn poll_interval_seconds(&self) -> f64 {
        self.poll_interval_ms as f64 / 1_000.0
    }
}

/// Skip-not-queue gate for detector calls.
#[derive(Debug, Clone)]
pub struct PoseThrottle {
    min_interval: f64,
    last_poll: Option<f64>,
}

impl PoseThrottle {
    #[must_use]
    pub fn new(config: &PoseConfig) -> Self {
        Self {
            min_interval: config.poll_interval_seconds(),
            last_poll: None,
        }
    }

    /// True when a poll is due at `now` (seconds). A `true` result records the poll.
    pub fn ready(&mut self, now: f64) -> bool {
        let due = self
            .last_poll
            .is_none_or(|last| now - last >= self.min_interval || now < last);
        if due {
            self.last_poll = Some(now);
        }
        due
    }

    pub fn reset(&mut self) {
        self.last_poll = None;
    }
}
