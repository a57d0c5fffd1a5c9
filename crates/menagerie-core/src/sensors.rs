//! Device tilt, shake detection and session-wide state.

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Device tilt in degrees, last sample wins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorState {
    /// Left/right tilt (orientation gamma).
    pub tilt_x: f32,
    /// Front/back tilt (orientation beta).
    pub tilt_y: f32,
}

/// Raw orientation reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrientationSample {
    pub gamma: f32,
    pub beta: f32,
}

/// Raw acceleration reading including gravity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl MotionSample {
    /// Magnitude of the acceleration vector, `None` when any axis is missing.
    #[must_use]
    pub fn magnitude(&self) -> Option<f32> {
        if self.x.is_finite() && self.y.is_finite() && self.z.is_finite() {
            Some((self.x * self.x + self.y * self.y + self.z * self.z).sqrt())
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SensorConfig {
    /// Acceleration magnitude above which a sample counts as a shake.
    pub shake_threshold: f32,
    /// Minimum time between accepted shakes.
    pub shake_cooldown_ms: u32,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            shake_threshold: 15.0,
            shake_cooldown_ms: 1_000,
        }
    }
}

impl SensorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.shake_threshold.is_finite() && self.shake_threshold > 0.0) {
            return Err(ConfigError::Invalid("shake_threshold must be positive"));
        }
        Ok(())
    }
}

/// Fires at most once per cooldown window.
#[derive(Debug, Clone)]
pub struct ShakeDetector {
    threshold: f32,
    cooldown: f64,
    last_shake: Option<f64>,
}

impl ShakeDetector {
    #[must_use]
    pub fn new(config: &SensorConfig) -> Self {
        Self {
            threshold: config.shake_threshold,
            cooldown: f64::from(config.shake_cooldown_ms) / 1_000.0,
            last_shake: None,
        }
    }

    /// Feed one sample taken at `now` seconds; returns `true` when a shake fires.
    pub fn observe(&mut self, sample: MotionSample, now: f64) -> bool {
        let Some(magnitude) = sample.magnitude() else {
            return false;
        };
        if magnitude <= self.threshold {
            return false;
        }
        if self
            .last_shake
            .is_some_and(|last| now - last < self.cooldown)
        {
            return false;
        }
        self.last_shake = Some(now);
        true
    }

    #[must_use]
    pub fn last_shake(&self) -> Option<f64> {
        self.last_shake
    }
}

/// Turns raw device samples into tilt state and shake events.
#[derive(Debug, Clone)]
pub struct SensorAdapter {
    state: SensorState,
    shake: ShakeDetector,
}

impl SensorAdapter {
    #[must_use]
    pub fn new(config: &SensorConfig) -> Self {
        Self {
            state: SensorState::default(),
            shake: ShakeDetector::new(config),
        }
    }

    /// Non-finite angles leave the previous tilt in place.
    pub fn on_orientation(&mut self, sample: OrientationSample) {
        if sample.gamma.is_finite() {
            self.state.tilt_x = sample.gamma;
        }
        if sample.beta.is_finite() {
            self.state.tilt_y = sample.beta;
        }
    }

    /// Returns `true` when this sample is an accepted shake.
    pub fn on_motion(&mut self, sample: MotionSample, now: f64) -> bool {
        self.shake.observe(sample, now)
    }

    #[must_use]
    pub fn state(&self) -> SensorState {
        self.state
    }

    #[must_use]
    pub fn last_shake(&self) -> Option<f64> {
        self.shake.last_shake()
    }
}

/// Which physical camera feeds the overlay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraFacing {
    User,
    #[default]
    Environment,
}

impl CameraFacing {
    #[must_use]
    pub const fn toggle(self) -> Self {
        match self {
            Self::User => Self::Environment,
            Self::Environment => Self::User,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Environment => "environment",
        }
    }
}

/// Mutable state shared across frames that is not owned by any sprite.
#[derive(Debug, Clone)]
pub struct Session {
    pub facing: CameraFacing,
    pub sensors: SensorAdapter,
}

impl Session {
    #[must_use]
    pub fn new(config: &SensorConfig) -> Self {
        Self {
            facing: CameraFacing::default(),
            sensors: SensorAdapter::new(config),
        }
    }

    /// Flip the camera and return the new facing.
    pub fn toggle_camera(&mut self) -> CameraFacing {
        self.facing = self.facing.toggle();
        self.facing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HARD: MotionSample = MotionSample {
        x: 12.0,
        y: 12.0,
        z: 0.0,
    };

    #[test]
    fn orientation_last_sample_wins() {
        let mut adapter = SensorAdapter::new(&SensorConfig::default());
        adapter.on_orientation(OrientationSample {
            gamma: 10.0,
            beta: -4.0,
        });
        adapter.on_orientation(OrientationSample {
            gamma: -30.0,
            beta: f32::NAN,
        });
        assert_eq!(
            adapter.state(),
            SensorState {
                tilt_x: -30.0,
                tilt_y: -4.0
            }
        );
    }

    #[test]
    fn shake_respects_threshold_and_cooldown() {
        let mut detector = ShakeDetector::new(&SensorConfig::default());
        let gentle = MotionSample {
            x: 0.0,
            y: 9.8,
            z: 0.0,
        };
        assert!(!detector.observe(gentle, 0.0));
        assert!(detector.observe(HARD, 0.5));
        assert!(!detector.observe(HARD, 1.2));
        assert!(detector.observe(HARD, 1.5));
        assert_eq!(detector.last_shake(), Some(1.5));
    }

    #[test]
    fn incomplete_motion_samples_are_ignored() {
        let mut detector = ShakeDetector::new(&SensorConfig::default());
        let partial = MotionSample {
            x: 40.0,
            y: f32::NAN,
            z: 0.0,
        };
        assert!(!detector.observe(partial, 0.0));
        assert!(detector.last_shake().is_none());
    }

    #[test]
    fn camera_toggle_flips_facing() {
        let mut session = Session::new(&SensorConfig::default());
        assert_eq!(session.facing, CameraFacing::Environment);
        assert_eq!(session.toggle_camera(), CameraFacing::User);
        assert_eq!(session.toggle_camera(), CameraFacing::Environment);
    }
}
